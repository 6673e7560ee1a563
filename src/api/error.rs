//! HTTP error envelope shared by handlers and middleware.

use crate::store::StoreError;
use axum::{
    extract::rejection::JsonRejection,
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Json, Response},
};
use serde_json::json;
use std::collections::BTreeMap;

#[derive(Debug)]
pub enum ApiError {
    NotFound,
    MethodNotAllowed,
    BadRequest(String),
    FailedValidation(BTreeMap<String, String>),
    EditConflict,
    RateLimited,
    InvalidCredentials,
    InvalidToken,
    AuthenticationRequired,
    InactiveAccount,
    NotPermitted,
    Internal(anyhow::Error),
}

impl ApiError {
    pub fn internal(err: impl Into<anyhow::Error>) -> Self {
        ApiError::Internal(err.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::FailedValidation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::EditConflict => StatusCode::CONFLICT,
            ApiError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ApiError::InvalidCredentials
            | ApiError::InvalidToken
            | ApiError::AuthenticationRequired => StatusCode::UNAUTHORIZED,
            ApiError::InactiveAccount | ApiError::NotPermitted => StatusCode::FORBIDDEN,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn message(&self) -> &'static str {
        match self {
            ApiError::NotFound => "the requested resource could not be found",
            ApiError::MethodNotAllowed => "the method is not supported for this resource",
            ApiError::BadRequest(_) | ApiError::FailedValidation(_) => "bad request",
            ApiError::EditConflict => {
                "unable to update the record due to an edit conflict, please try again"
            }
            ApiError::RateLimited => "rate limit exceeded",
            ApiError::InvalidCredentials => "invalid authentication credentials",
            ApiError::InvalidToken => "invalid or missing authentication token",
            ApiError::AuthenticationRequired => "you must be authenticated to access this resource",
            ApiError::InactiveAccount => {
                "your user account must be activated to access this resource"
            }
            ApiError::NotPermitted => {
                "your user account doesn't have the necessary permissions to access this resource"
            }
            ApiError::Internal(_) => {
                "the server encountered a problem and could not process your request"
            }
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => ApiError::NotFound,
            StoreError::ConditionFailed => ApiError::EditConflict,
            other => ApiError::Internal(other.into()),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            ApiError::Internal(err) => {
                tracing::error!(error = ?err, "Server error");
                json!({ "error": self.message() })
            }
            ApiError::BadRequest(detail) => json!({ "error": detail }),
            ApiError::FailedValidation(errors) => json!({ "error": errors }),
            _ => json!({ "error": self.message() }),
        };

        let mut response = (status, Json(body)).into_response();
        if matches!(self, ApiError::InvalidToken) {
            response
                .headers_mut()
                .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_error_mapping() {
        let not_found: ApiError = StoreError::NotFound.into();
        assert_eq!(not_found.status(), StatusCode::NOT_FOUND);

        let conflict: ApiError = StoreError::ConditionFailed.into();
        assert_eq!(conflict.status(), StatusCode::CONFLICT);

        let broken: ApiError = StoreError::Serialization("bad".into()).into();
        assert!(matches!(broken, ApiError::Internal(_)));
    }

    #[test]
    fn test_error_responses() {
        let invalid_token = ApiError::InvalidToken.into_response();
        assert_eq!(invalid_token.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(invalid_token.headers()[header::WWW_AUTHENTICATE], "Bearer");

        assert_eq!(
            ApiError::RateLimited.into_response().status(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            ApiError::InactiveAccount.into_response().status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            ApiError::FailedValidation(BTreeMap::new()).into_response().status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
    }
}
