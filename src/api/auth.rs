//! Registration, login and the bearer-token authorization layer.
//!
//! The HTTP surface and the chat channel share the same token service and
//! store, so the trust model is identical on both transports: the token
//! proves identity, the store is the authority on role and suspension.

use axum::{
    async_trait,
    body::Body,
    extract::{FromRequestParts, State},
    http::{request::Parts, HeaderMap, Request, StatusCode},
    middleware::Next,
    response::Response,
    Json,
};
use std::sync::Arc;
use tracing::info;

use crate::auth::{hash_password, verify_password};
use crate::db::{AuthResponse, LoginRequest, NewUser, RegisterRequest, Store, User, UserResponse};
use crate::AppState;

use super::error::{ApiError, ValidationErrorBuilder};

/// The authenticated caller, attached to the request by `auth_middleware`.
#[derive(Debug, Clone)]
pub struct AuthUser(pub User);

impl AuthUser {
    /// 403 unless the caller holds the admin role.
    pub fn require_admin(&self) -> Result<(), ApiError> {
        if self.0.is_admin() {
            Ok(())
        } else {
            Err(ApiError::forbidden("Admin access required"))
        }
    }
}

fn validate_registration(request: &RegisterRequest) -> Result<(), ApiError> {
    let mut errors = ValidationErrorBuilder::new();
    if request.email.is_empty() || !request.email.contains('@') {
        errors.add("email", "Invalid email address");
    }
    if request.password.len() < 8 {
        errors.add("password", "Password must be at least 8 characters");
    }
    if request.full_name.trim().is_empty() {
        errors.add("fullName", "Full name is required");
    }
    errors.finish()
}

/// Register endpoint
///
/// POST /api/auth/register
///
/// The role is never taken from the request body: public registration
/// always produces a "user". Admins are seeded from configuration.
pub async fn register(
    State(state): State<Arc<AppState>>,
    Json(request): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<AuthResponse>), ApiError> {
    validate_registration(&request)?;

    if state
        .store
        .get_user_by_email(&request.email)
        .await?
        .is_some()
    {
        return Err(ApiError::validation_field("email", "Email already registered"));
    }

    let password_hash = hash_password(&request.password)
        .map_err(|e| ApiError::internal(format!("Failed to hash password: {}", e)))?;

    let user = state
        .store
        .create_user(NewUser {
            email: request.email,
            password_hash,
            full_name: request.full_name,
            phone_number: request.phone_number,
            role: "user".to_string(),
        })
        .await?;

    let token = state
        .tokens
        .issue(&user.id, &user.email, &user.role)
        .map_err(|e| ApiError::internal(e.to_string()))?;

    info!(user_id = %user.id, "New user registered");

    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            token,
            user: UserResponse::from(user),
        }),
    ))
}

/// Login endpoint
///
/// POST /api/auth/login
pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, ApiError> {
    let user = state
        .store
        .get_user_by_email(&request.email)
        .await?
        .ok_or_else(|| ApiError::unauthorized("Invalid credentials"))?;

    if !verify_password(&request.password, &user.password_hash) {
        return Err(ApiError::unauthorized("Invalid credentials"));
    }

    if user.suspended {
        return Err(ApiError::forbidden("Account suspended"));
    }

    let token = state
        .tokens
        .issue(&user.id, &user.email, &user.role)
        .map_err(|e| ApiError::internal(e.to_string()))?;

    Ok(Json(AuthResponse {
        token,
        user: UserResponse::from(user),
    }))
}

/// Extract the bearer token from request headers
fn extract_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
}

/// Resolve a bearer token to the account it belongs to. The token's role
/// claim is deliberately not used; the store decides.
pub async fn resolve_token(state: &AppState, headers: &HeaderMap) -> Result<User, ApiError> {
    let token = extract_token(headers).ok_or_else(|| ApiError::unauthorized("Access token required"))?;

    let claims = state.tokens.verify(token)?;

    let user = state
        .store
        .get_user(&claims.sub)
        .await?
        .ok_or_else(|| ApiError::unauthorized("Invalid or expired token"))?;

    if user.suspended {
        return Err(ApiError::unauthorized("Account suspended"));
    }

    Ok(user)
}

/// Auth middleware: attaches the verified caller to the request or fails
/// with 401.
pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let user = resolve_token(&state, request.headers()).await?;
    request.extensions_mut().insert(AuthUser(user));
    Ok(next.run(request).await)
}

/// Extractor for the authenticated caller on routes behind `auth_middleware`.
#[async_trait]
impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthUser>()
            .cloned()
            .ok_or_else(|| ApiError::unauthorized("Access token required"))
    }
}

/// Seed the configured admin account at startup if it does not exist yet.
pub async fn ensure_admin_user(store: &Store, email: &str, password: &str) -> anyhow::Result<()> {
    if store.get_user_by_email(email).await?.is_some() {
        return Ok(());
    }

    let password_hash =
        hash_password(password).map_err(|e| anyhow::anyhow!("Failed to hash password: {}", e))?;
    let admin = store
        .create_user(NewUser {
            email: email.to_string(),
            password_hash,
            full_name: "Administrator".to_string(),
            phone_number: String::new(),
            role: "admin".to_string(),
        })
        .await?;

    info!(user_id = %admin.id, email = %email, "Seeded admin user");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::db;
    use axum::http::HeaderValue;

    async fn test_state() -> Arc<AppState> {
        let mut config = Config::default();
        config.auth.jwt_secret = "test-secret".to_string();
        Arc::new(AppState::new(config, db::init_test().await))
    }

    fn bearer(token: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            "Authorization",
            HeaderValue::from_str(&format!("Bearer {token}")).unwrap(),
        );
        headers
    }

    #[tokio::test]
    async fn test_register_defaults_role_to_user() {
        let state = test_state().await;
        let (status, Json(response)) = register(
            State(state.clone()),
            Json(RegisterRequest {
                email: "new@example.com".to_string(),
                password: "long enough password".to_string(),
                full_name: "New User".to_string(),
                phone_number: String::new(),
            }),
        )
        .await
        .unwrap();

        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(response.user.role, "user");

        // Token is immediately valid for the new identity.
        let claims = state.tokens.verify(&response.token).unwrap();
        assert_eq!(claims.sub, response.user.id);
    }

    #[tokio::test]
    async fn test_register_rejects_duplicate_email_case_insensitively() {
        let state = test_state().await;
        let request = RegisterRequest {
            email: "dup@example.com".to_string(),
            password: "long enough password".to_string(),
            full_name: "First".to_string(),
            phone_number: String::new(),
        };
        register(State(state.clone()), Json(request)).await.unwrap();

        let err = register(
            State(state),
            Json(RegisterRequest {
                email: "DUP@example.com".to_string(),
                password: "long enough password".to_string(),
                full_name: "Second".to_string(),
                phone_number: String::new(),
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_register_validates_input() {
        let state = test_state().await;
        let err = register(
            State(state),
            Json(RegisterRequest {
                email: "not-an-email".to_string(),
                password: "short".to_string(),
                full_name: String::new(),
                phone_number: String::new(),
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_login_roundtrip_and_bad_password() {
        let state = test_state().await;
        register(
            State(state.clone()),
            Json(RegisterRequest {
                email: "login@example.com".to_string(),
                password: "correct password".to_string(),
                full_name: "Login User".to_string(),
                phone_number: String::new(),
            }),
        )
        .await
        .unwrap();

        let Json(response) = login(
            State(state.clone()),
            Json(LoginRequest {
                email: "login@example.com".to_string(),
                password: "correct password".to_string(),
            }),
        )
        .await
        .unwrap();
        assert_eq!(response.user.email, "login@example.com");

        let err = login(
            State(state),
            Json(LoginRequest {
                email: "login@example.com".to_string(),
                password: "wrong password".to_string(),
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_suspended_account_cannot_login() {
        let state = test_state().await;
        let (_, Json(response)) = register(
            State(state.clone()),
            Json(RegisterRequest {
                email: "susp@example.com".to_string(),
                password: "correct password".to_string(),
                full_name: "Suspended".to_string(),
                phone_number: String::new(),
            }),
        )
        .await
        .unwrap();
        state
            .store
            .set_user_suspended(&response.user.id, true)
            .await
            .unwrap();

        let err = login(
            State(state),
            Json(LoginRequest {
                email: "susp@example.com".to_string(),
                password: "correct password".to_string(),
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_resolve_token_happy_path_and_failures() {
        let state = test_state().await;
        let (_, Json(response)) = register(
            State(state.clone()),
            Json(RegisterRequest {
                email: "t@example.com".to_string(),
                password: "correct password".to_string(),
                full_name: "Token User".to_string(),
                phone_number: String::new(),
            }),
        )
        .await
        .unwrap();

        let user = resolve_token(&state, &bearer(&response.token)).await.unwrap();
        assert_eq!(user.id, response.user.id);

        // Missing header.
        let err = resolve_token(&state, &HeaderMap::new()).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);

        // Token signed with a different secret.
        let forged = crate::auth::TokenService::new("other", 7)
            .issue(&user.id, &user.email, "admin")
            .unwrap();
        let err = resolve_token(&state, &bearer(&forged)).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);

        // Valid token for a deleted-or-unknown identity.
        let ghost = state.tokens.issue("no-such-id", "g@example.com", "user").unwrap();
        let err = resolve_token(&state, &bearer(&ghost)).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_require_admin_gates_by_store_role() {
        let state = test_state().await;
        ensure_admin_user(&state.store, "admin@example.com", "seed password")
            .await
            .unwrap();
        let admin = state
            .store
            .get_user_by_email("admin@example.com")
            .await
            .unwrap()
            .unwrap();
        assert!(AuthUser(admin).require_admin().is_ok());

        let (_, Json(response)) = register(
            State(state.clone()),
            Json(RegisterRequest {
                email: "plain@example.com".to_string(),
                password: "correct password".to_string(),
                full_name: "Plain".to_string(),
                phone_number: String::new(),
            }),
        )
        .await
        .unwrap();
        let plain = state.store.get_user(&response.user.id).await.unwrap().unwrap();
        let err = AuthUser(plain).require_admin().unwrap_err();
        assert_eq!(err.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_ensure_admin_user_is_idempotent() {
        let state = test_state().await;
        ensure_admin_user(&state.store, "admin@example.com", "seed password")
            .await
            .unwrap();
        ensure_admin_user(&state.store, "admin@example.com", "seed password")
            .await
            .unwrap();
        let admins = state.store.admin_ids().await.unwrap();
        assert_eq!(admins.len(), 1);
    }
}
