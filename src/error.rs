use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Stable, machine-readable codes for the subset of `BadRequest`s that
/// clients are expected to branch on (form validation mostly). Anything
/// that doesn't need a stable code stays a plain `AppError::BadRequest(String)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    UsernameRequired,
    PasswordTooWeak,
    InvalidJoinCode,
    InvalidAmount,
    EmptySplit,
    UnknownShareMode,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::UsernameRequired => "username_required",
            ErrorCode::PasswordTooWeak => "password_too_weak",
            ErrorCode::InvalidJoinCode => "invalid_join_code",
            ErrorCode::InvalidAmount => "invalid_amount",
            ErrorCode::EmptySplit => "empty_split",
            ErrorCode::UnknownShareMode => "unknown_share_mode",
        }
    }
}

/// Reasons a login/registration attempt was rejected, logged but never sent
/// back to the client verbatim (the response stays a generic 401/400 so we
/// don't help an attacker distinguish "no such user" from "wrong password").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthFailureReason {
    InvalidInput,
    PasswordTooWeak,
    UsernameExists,
    InvalidCredentials,
    AccountRevoked,
    TokenInvalidated,
    AccountPendingApproval,
}

impl AuthFailureReason {
    pub fn as_code(&self) -> &'static str {
        match self {
            AuthFailureReason::InvalidInput => "invalid_input",
            AuthFailureReason::PasswordTooWeak => "password_too_weak",
            AuthFailureReason::UsernameExists => "username_exists",
            AuthFailureReason::InvalidCredentials => "invalid_credentials",
            AuthFailureReason::AccountRevoked => "account_revoked",
            AuthFailureReason::TokenInvalidated => "token_invalidated",
            AuthFailureReason::AccountPendingApproval => "account_pending_approval",
        }
    }
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Authentication required")]
    Unauthorized,

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Token has been invalidated")]
    TokenInvalidated,

    #[error("Account is pending approval")]
    AccountPendingApproval,

    #[error("Account has been revoked")]
    AccountRevoked,

    #[error("User already exists")]
    UserExists,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Currency mismatch: expected {expected}, got {actual}")]
    CurrencyMismatch { expected: String, actual: String },

    #[error("Invalid state transition: {0}")]
    InvalidTransition(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("JWT error: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn bad_request(code: ErrorCode) -> Self {
        AppError::BadRequest(code.as_str().to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, self.to_string()),
            AppError::InvalidCredentials => (StatusCode::UNAUTHORIZED, self.to_string()),
            AppError::TokenInvalidated => (StatusCode::UNAUTHORIZED, self.to_string()),
            AppError::AccountPendingApproval => (StatusCode::FORBIDDEN, self.to_string()),
            AppError::AccountRevoked => (StatusCode::FORBIDDEN, self.to_string()),
            AppError::UserExists => (StatusCode::CONFLICT, self.to_string()),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg.clone()),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg.clone()),
            AppError::CurrencyMismatch { .. } => (StatusCode::UNPROCESSABLE_ENTITY, self.to_string()),
            AppError::InvalidTransition(msg) => (StatusCode::CONFLICT, msg.clone()),
            AppError::Database(e) => {
                tracing::error!("Database error: {:?}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Database error".to_string())
            }
            AppError::Jwt(e) => {
                tracing::error!("JWT error: {:?}", e);
                (StatusCode::UNAUTHORIZED, "Invalid token".to_string())
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal error".to_string())
            }
        };

        let body = Json(json!({ "error": message }));
        (status, body).into_response()
    }
}

impl From<crate::money::MoneyError> for AppError {
    fn from(e: crate::money::MoneyError) -> Self {
        match e {
            crate::money::MoneyError::CurrencyMismatch(expected, actual) => {
                AppError::CurrencyMismatch { expected, actual }
            }
            other => AppError::BadRequest(other.to_string()),
        }
    }
}

pub type AppResult<T> = Result<T, AppError>;
