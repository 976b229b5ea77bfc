mod applications;
pub mod auth;
mod error;
pub mod rate_limit;
mod users;
mod ws;

pub use error::{ApiError, ErrorCode, ErrorResponse, ValidationErrorBuilder};

use axum::{
    middleware,
    routing::{get, patch, post},
    Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    // Auth routes (public, tight rate limit)
    let auth_routes = Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit::rate_limit_auth,
        ));

    // Protected API routes
    let api_routes = Router::new()
        // Applications
        .route("/applications", get(applications::list_applications))
        .route("/applications", post(applications::create_application))
        .route(
            "/applications/user/:user_id",
            get(applications::list_applications_by_user),
        )
        .route(
            "/applications/:id/status",
            patch(applications::update_application_status),
        )
        // Users (admin)
        .route("/users", get(users::list_users))
        .route("/users/:id/suspended", patch(users::set_user_suspended))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::auth_middleware,
        ))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit::rate_limit_api,
        ));

    Router::new()
        .route("/health", get(health_check))
        // Chat channel; authentication happens in-band via the auth frame
        .route("/ws", get(ws::chat_ws))
        .nest("/api/auth", auth_routes)
        .nest("/api", api_routes)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_check() -> &'static str {
    "OK"
}
