//! Errors returned by the auth service

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use exam_common::error::DatabaseError;
use serde_json::json;
use thiserror::Error;
use tracing::error;

/// Custom error type for authentication errors
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("{0}")]
    Validation(String),

    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("User already exists")]
    UserAlreadyExists,

    #[error("Email not verified")]
    EmailNotVerified,

    #[error("Invalid or expired token")]
    InvalidToken,

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Forbidden")]
    Forbidden,

    #[error("User not found")]
    UserNotFound,

    #[error("Too many requests")]
    RateLimited,

    #[error("Invalid callback URL")]
    UntrustedRedirect,

    #[error("Provider not found: {0}")]
    ProviderNotFound(String),

    #[error("OAuth sign-in failed: {0}")]
    OAuth(String),

    #[error(transparent)]
    Database(#[from] DatabaseError),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl AuthError {
    /// Stable machine-readable code sent to clients
    pub fn code(&self) -> &'static str {
        match self {
            AuthError::Validation(_) => "VALIDATION_ERROR",
            AuthError::InvalidCredentials => "INVALID_EMAIL_OR_PASSWORD",
            AuthError::UserAlreadyExists => "USER_ALREADY_EXISTS",
            AuthError::EmailNotVerified => "EMAIL_NOT_VERIFIED",
            AuthError::InvalidToken => "INVALID_TOKEN",
            AuthError::Unauthorized => "UNAUTHORIZED",
            AuthError::Forbidden => "FORBIDDEN",
            AuthError::UserNotFound => "USER_NOT_FOUND",
            AuthError::RateLimited => "TOO_MANY_REQUESTS",
            AuthError::UntrustedRedirect => "INVALID_CALLBACK_URL",
            AuthError::ProviderNotFound(_) => "PROVIDER_NOT_FOUND",
            AuthError::OAuth(_) => "OAUTH_FAILED",
            AuthError::Database(_) | AuthError::Internal(_) => "INTERNAL_SERVER_ERROR",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AuthError::Validation(_) | AuthError::InvalidToken | AuthError::OAuth(_) => {
                StatusCode::BAD_REQUEST
            }
            AuthError::InvalidCredentials | AuthError::Unauthorized => StatusCode::UNAUTHORIZED,
            AuthError::EmailNotVerified | AuthError::Forbidden | AuthError::UntrustedRedirect => {
                StatusCode::FORBIDDEN
            }
            AuthError::UserNotFound | AuthError::ProviderNotFound(_) => StatusCode::NOT_FOUND,
            AuthError::UserAlreadyExists => StatusCode::UNPROCESSABLE_ENTITY,
            AuthError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            AuthError::Database(_) | AuthError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            AuthError::Database(e) => {
                error!("Auth storage failure: {}", e);
                "Internal server error".to_string()
            }
            AuthError::Internal(e) => {
                error!("Auth internal failure: {:#}", e);
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };

        let body = Json(json!({
            "error": message,
            "code": self.code(),
        }));

        (status, body).into_response()
    }
}

/// Type alias for auth results
pub type AuthResult<T> = Result<T, AuthError>;
