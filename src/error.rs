use thiserror::Error;
use actix_web::{ResponseError, HttpResponse, http::StatusCode};
use serde_json::json;
use tracing::error;

use crate::auth::TokenError;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Authentication error: {0}")]
    AuthError(#[from] AuthError),

    #[error("Store error: {0}")]
    StoreError(#[from] StoreError),

    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Internal server error: {0}")]
    InternalError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),
}

impl From<TokenError> for AppError {
    fn from(err: TokenError) -> Self {
        AppError::AuthError(AuthError::Token(err))
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::ConfigError(err.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::InternalError(err.to_string())
    }
}

impl AppError {
    /// Message returned to the caller. Only the coarse category is exposed;
    /// the detailed variant goes to the log.
    pub fn public_message(&self) -> String {
        match self {
            AppError::AuthError(AuthError::DuplicateCredential) => {
                "username or email already exists".to_string()
            }
            AppError::AuthError(AuthError::InvalidCredentials) => "invalid credentials".to_string(),
            AppError::AuthError(AuthError::Token(TokenError::Signing(_))) => {
                "internal server error".to_string()
            }
            AppError::AuthError(AuthError::Token(_)) => "unauthorized".to_string(),
            AppError::AuthError(AuthError::Hashing(_)) => "internal server error".to_string(),
            AppError::StoreError(StoreError::Duplicate) => {
                "username or email already exists".to_string()
            }
            AppError::StoreError(_) => "service unavailable".to_string(),
            AppError::RateLimitExceeded => "too many requests".to_string(),
            AppError::ValidationError(msg) => msg.clone(),
            AppError::ConfigError(_) | AppError::InternalError(_) => {
                "internal server error".to_string()
            }
        }
    }
}

impl ResponseError for AppError {
    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        if status.is_server_error() {
            error!("Request failed: {}", self);
        }
        let response = json!({
            "error": {
                "status": status.as_u16(),
                "message": self.public_message()
            }
        });
        HttpResponse::build(status).json(response)
    }

    fn status_code(&self) -> StatusCode {
        match self {
            AppError::AuthError(e) => match e {
                AuthError::DuplicateCredential => StatusCode::CONFLICT,
                AuthError::InvalidCredentials => StatusCode::UNAUTHORIZED,
                AuthError::Hashing(_) => StatusCode::INTERNAL_SERVER_ERROR,
                AuthError::Token(TokenError::Signing(_)) => StatusCode::INTERNAL_SERVER_ERROR,
                AuthError::Token(_) => StatusCode::UNAUTHORIZED,
            },
            AppError::StoreError(StoreError::Duplicate) => StatusCode::CONFLICT,
            AppError::StoreError(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::RateLimitExceeded => StatusCode::TOO_MANY_REQUESTS,
            AppError::ValidationError(_) => StatusCode::BAD_REQUEST,
            AppError::ConfigError(_) | AppError::InternalError(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Duplicate credential")]
    DuplicateCredential,

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Hashing failed: {0}")]
    Hashing(String),

    #[error("Token rejected: {0}")]
    Token(#[from] TokenError),
}

/// Failures of the backing credential or counter store.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Duplicate record")]
    Duplicate,

    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Store call timed out")]
    Timeout,
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db_err)
                if db_err.is_unique_violation() || db_err.is_check_violation() =>
            {
                StoreError::Duplicate
            }
            _ => StoreError::Unavailable(err.to_string()),
        }
    }
}
