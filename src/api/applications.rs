//! Grant application endpoints.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;
use tracing::info;

use crate::db::{
    CreateApplicationRequest, GrantApplication, UpdateStatusRequest, APPLICATION_STATUSES,
};
use crate::AppState;

use super::auth::AuthUser;
use super::error::{ApiError, ValidationErrorBuilder};

/// List every application, newest first
///
/// GET /api/applications (admin)
pub async fn list_applications(
    State(state): State<Arc<AppState>>,
    caller: AuthUser,
) -> Result<Json<Vec<GrantApplication>>, ApiError> {
    caller.require_admin()?;
    Ok(Json(state.store.get_all_applications().await?))
}

/// List one user's applications
///
/// GET /api/applications/user/:user_id
///
/// Users can only view their own applications; admins can view any.
pub async fn list_applications_by_user(
    State(state): State<Arc<AppState>>,
    caller: AuthUser,
    Path(user_id): Path<String>,
) -> Result<Json<Vec<GrantApplication>>, ApiError> {
    if !caller.0.is_admin() && caller.0.id != user_id {
        return Err(ApiError::forbidden("Access denied"));
    }
    Ok(Json(state.store.get_applications_by_user(&user_id).await?))
}

fn validate_application(req: &CreateApplicationRequest) -> Result<(), ApiError> {
    let mut errors = ValidationErrorBuilder::new();
    if req.full_name.trim().is_empty() {
        errors.add("fullName", "Full name is required");
    }
    if req.email.is_empty() || !req.email.contains('@') {
        errors.add("email", "Invalid email address");
    }
    if req.project_title.trim().is_empty() {
        errors.add("projectTitle", "Project title is required");
    }
    if req.project_description.trim().is_empty() {
        errors.add("projectDescription", "Project description is required");
    }
    if req.grant_type.trim().is_empty() {
        errors.add("grantType", "Grant type is required");
    }
    if req.requested_amount <= 0 {
        errors.add("requestedAmount", "Requested amount must be positive");
    }
    errors.finish()
}

/// Submit an application
///
/// POST /api/applications
pub async fn create_application(
    State(state): State<Arc<AppState>>,
    caller: AuthUser,
    Json(request): Json<CreateApplicationRequest>,
) -> Result<(StatusCode, Json<GrantApplication>), ApiError> {
    validate_application(&request)?;

    // Non-admins may only file for themselves.
    if !caller.0.is_admin() && request.user_id != caller.0.id {
        return Err(ApiError::forbidden(
            "Cannot create application for another user",
        ));
    }

    let application = state.store.create_application(request).await?;
    info!(application_id = %application.id, user_id = %application.user_id, "Application submitted");
    Ok((StatusCode::CREATED, Json(application)))
}

/// Update an application's status
///
/// PATCH /api/applications/:id/status (admin)
pub async fn update_application_status(
    State(state): State<Arc<AppState>>,
    caller: AuthUser,
    Path(id): Path<String>,
    Json(request): Json<UpdateStatusRequest>,
) -> Result<Json<GrantApplication>, ApiError> {
    caller.require_admin()?;

    if !APPLICATION_STATUSES.contains(&request.status.as_str()) {
        return Err(ApiError::validation_field(
            "status",
            format!("Status must be one of: {}", APPLICATION_STATUSES.join(", ")),
        ));
    }

    let application = state
        .store
        .update_application_status(&id, &request.status, request.admin_notes.as_deref())
        .await?
        .ok_or_else(|| ApiError::not_found("Application not found"))?;

    info!(application_id = %id, status = %request.status, "Application status updated");
    Ok(Json(application))
}
