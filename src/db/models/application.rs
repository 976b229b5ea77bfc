//! Grant application models.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Statuses an application can move through. Transitions are unrestricted;
/// concurrent admin updates resolve last-write-wins.
pub const APPLICATION_STATUSES: &[&str] = &["pending", "under_review", "approved", "rejected"];

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct GrantApplication {
    pub id: String,
    #[serde(rename = "userId")]
    pub user_id: String,
    #[serde(rename = "fullName")]
    pub full_name: String,
    pub email: String,
    #[serde(rename = "phoneNumber")]
    pub phone_number: String,
    pub address: String,
    #[serde(rename = "projectTitle")]
    pub project_title: String,
    #[serde(rename = "projectDescription")]
    pub project_description: String,
    #[serde(rename = "grantType")]
    pub grant_type: String,
    #[serde(rename = "requestedAmount")]
    pub requested_amount: i64,
    pub status: String,
    #[serde(rename = "adminNotes")]
    pub admin_notes: String,
    #[serde(rename = "createdAt")]
    pub created_at: String,
    #[serde(rename = "updatedAt")]
    pub updated_at: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateApplicationRequest {
    #[serde(rename = "userId")]
    pub user_id: String,
    #[serde(rename = "fullName")]
    pub full_name: String,
    pub email: String,
    #[serde(rename = "phoneNumber", default)]
    pub phone_number: String,
    #[serde(default)]
    pub address: String,
    #[serde(rename = "projectTitle")]
    pub project_title: String,
    #[serde(rename = "projectDescription")]
    pub project_description: String,
    #[serde(rename = "grantType")]
    pub grant_type: String,
    #[serde(rename = "requestedAmount")]
    pub requested_amount: i64,
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: String,
    #[serde(rename = "adminNotes", default)]
    pub admin_notes: Option<String>,
}
