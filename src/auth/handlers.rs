use actix_web::{web, HttpResponse};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use tracing::{info, warn};
use uuid::Uuid;

use crate::auth::middleware::AuthenticatedUser;
use crate::error::AppError;
use crate::AppState;

const MIN_USERNAME_LENGTH: usize = 3;
const MAX_USERNAME_LENGTH: usize = 50;
const MIN_PASSWORD_LENGTH: usize = 8;
const MAX_EMAIL_LENGTH: usize = 254; // RFC 5321 SMTP limit

static EMAIL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").expect("email pattern is valid")
});

#[derive(Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}

impl RegisterRequest {
    pub fn validate(&self) -> Result<(), AppError> {
        let username_len = self.username.chars().count();
        if !(MIN_USERNAME_LENGTH..=MAX_USERNAME_LENGTH).contains(&username_len) {
            return Err(AppError::ValidationError(format!(
                "username must be between {} and {} characters",
                MIN_USERNAME_LENGTH, MAX_USERNAME_LENGTH
            )));
        }
        // Usernames and emails share the login identifier namespace
        if self.username.contains('@') {
            return Err(AppError::ValidationError("username must not contain '@'".into()));
        }
        if self.email.len() > MAX_EMAIL_LENGTH || !EMAIL_REGEX.is_match(&self.email) {
            return Err(AppError::ValidationError("email is not a valid address".into()));
        }
        if self.password.chars().count() < MIN_PASSWORD_LENGTH {
            return Err(AppError::ValidationError(format!(
                "password must be at least {} characters",
                MIN_PASSWORD_LENGTH
            )));
        }
        Ok(())
    }
}

#[derive(Deserialize)]
pub struct LoginRequest {
    pub identifier: String,
    pub password: String,
}

impl LoginRequest {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.identifier.is_empty() || self.password.is_empty() {
            return Err(AppError::ValidationError("identifier and password are required".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Serialize)]
pub struct MeResponse {
    pub user_id: Uuid,
}

pub async fn register(
    req: web::Json<RegisterRequest>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    req.validate()?;

    state
        .auth_service
        .register(&req.username, &req.email, &req.password)
        .await
        .inspect_err(|e| warn!("Registration rejected: {}", e))?;

    Ok(HttpResponse::Created().finish())
}

pub async fn login(
    req: web::Json<LoginRequest>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    req.validate()?;

    let tokens = state
        .auth_service
        .login(&req.identifier, &req.password)
        .await
        .inspect_err(|e| warn!("Login rejected: {}", e))?;

    Ok(HttpResponse::Ok().json(tokens))
}

pub async fn me(user: AuthenticatedUser) -> HttpResponse {
    info!("Token accepted for user {}", user.user_id);
    HttpResponse::Ok().json(MeResponse { user_id: user.user_id })
}
