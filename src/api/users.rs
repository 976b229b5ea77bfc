//! Admin user management endpoints.

use axum::{
    extract::{Path, State},
    Json,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;

use crate::db::UserResponse;
use crate::AppState;

use super::auth::AuthUser;
use super::error::ApiError;

/// List all users, password hashes stripped
///
/// GET /api/users (admin)
pub async fn list_users(
    State(state): State<Arc<AppState>>,
    caller: AuthUser,
) -> Result<Json<Vec<UserResponse>>, ApiError> {
    caller.require_admin()?;
    let users = state.store.get_all_users().await?;
    Ok(Json(users.into_iter().map(UserResponse::from).collect()))
}

#[derive(Debug, Deserialize)]
pub struct SetSuspendedRequest {
    pub suspended: bool,
}

/// Suspend or reinstate an account
///
/// PATCH /api/users/:id/suspended (admin)
pub async fn set_user_suspended(
    State(state): State<Arc<AppState>>,
    caller: AuthUser,
    Path(id): Path<String>,
    Json(request): Json<SetSuspendedRequest>,
) -> Result<Json<UserResponse>, ApiError> {
    caller.require_admin()?;

    let user = state
        .store
        .set_user_suspended(&id, request.suspended)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    info!(user_id = %id, suspended = request.suspended, "User suspension updated");
    Ok(Json(UserResponse::from(user)))
}
