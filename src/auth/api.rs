//! Authentication API endpoints
//!
//! Registration and authentication-token issuance.

use crate::api::ApiError;
use crate::auth::{
    models::{LoginRequest, RegisterRequest, UserResponse},
    permissions::PermissionRepository,
    tokens::{TokenScope, TokenStore},
    user_store::{validate_email, validate_password_plaintext, validate_registration, UserRepository},
};
use crate::store::StoreError;
use crate::validation::Validator;
use axum::{extract::rejection::JsonRejection, extract::State, http::StatusCode, Json};
use chrono::Duration;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Shared auth state
#[derive(Clone)]
pub struct AuthState {
    pub users: UserRepository,
    pub tokens: TokenStore,
    pub permissions: PermissionRepository,
    pub token_ttl: Duration,
    /// Codes granted to every new account.
    pub default_permissions: Arc<Vec<String>>,
}

/// Register endpoint - POST /v1/users
pub async fn register_user(
    State(auth): State<AuthState>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let Json(input) = payload?;

    let mut v = Validator::new();
    validate_registration(&mut v, &input.name, &input.email, &input.password);
    v.finish()?;

    let user = auth.users.new_user(&input.name, &input.email, &input.password)?;
    auth.users.insert(&user)?;
    if let Err(err) = auth.permissions.grant(&user.email, &auth.default_permissions) {
        // Without its grants the account is unusable; drop it so the caller
        // can register again.
        warn!(email = %user.email, error = %err, "Permission grant failed, removing account");
        if let Err(cleanup) = auth.users.delete(&user.email) {
            error!(email = %user.email, error = %cleanup, "Failed to remove account");
        }
        return Err(err.into());
    }

    Ok((
        StatusCode::CREATED,
        Json(json!({ "user": UserResponse::from_user(&user) })),
    ))
}

/// Login endpoint - POST /v1/tokens/authentication
pub async fn create_authentication_token(
    State(auth): State<AuthState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let Json(input) = payload?;

    let mut v = Validator::new();
    validate_email(&mut v, &input.email);
    validate_password_plaintext(&mut v, &input.password);
    v.finish()?;

    let user = match auth.users.get_by_email(&input.email) {
        Ok(user) => user,
        Err(StoreError::NotFound) => {
            warn!(email = %input.email, "Login attempt for unknown account");
            return Err(ApiError::InvalidCredentials);
        }
        Err(err) => return Err(err.into()),
    };

    if !auth.users.password_matches(&user, &input.password)? {
        warn!(email = %user.email, "Failed login attempt");
        return Err(ApiError::InvalidCredentials);
    }

    let token = auth
        .tokens
        .issue(&user.email, auth.token_ttl, TokenScope::Authentication)?;
    info!(email = %user.email, "Login successful");

    Ok((
        StatusCode::CREATED,
        Json(json!({ "authentication_token": token })),
    ))
}
