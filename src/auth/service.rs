use chrono::Duration;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use tokio::time::timeout;
use tracing::{error, info};
use uuid::Uuid;

use crate::auth::password::PasswordHasher;
use crate::auth::token::TokenIssuer;
use crate::config::AuthConfig;
use crate::db::{CredentialStore, NewUser};
use crate::error::{AppError, AuthError, StoreError};

/// Password checked against when the identifier does not exist, so that the
/// "unknown user" path costs one argon2 verification like the "wrong password" path.
const TIMING_DUMMY_PASSWORD: &str = "authgate-timing-equaliser";

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in_seconds: i64,
}

#[derive(Clone)]
pub struct AuthService {
    store: Arc<dyn CredentialStore>,
    hasher: PasswordHasher,
    issuer: TokenIssuer,
    access_lifetime: Duration,
    refresh_lifetime: Duration,
    store_timeout: std::time::Duration,
    dummy_hash: Arc<str>,
}

impl AuthService {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        hasher: PasswordHasher,
        issuer: TokenIssuer,
        access_lifetime: Duration,
        refresh_lifetime: Duration,
        store_timeout: std::time::Duration,
    ) -> Result<Self, AuthError> {
        let dummy_hash = hasher.hash(TIMING_DUMMY_PASSWORD)?;
        Ok(Self {
            store,
            hasher,
            issuer,
            access_lifetime,
            refresh_lifetime,
            store_timeout,
            dummy_hash: Arc::from(dummy_hash),
        })
    }

    pub fn from_config(
        store: Arc<dyn CredentialStore>,
        config: &AuthConfig,
        store_timeout: std::time::Duration,
    ) -> Result<Self, AuthError> {
        Self::new(
            store,
            PasswordHasher::from_config(config)?,
            TokenIssuer::new(&config.jwt_secret),
            config.access_token_lifetime(),
            config.refresh_token_lifetime(),
            store_timeout,
        )
    }

    pub fn store(&self) -> &Arc<dyn CredentialStore> {
        &self.store
    }

    /// Register a new identity. Input shape is checked at the HTTP boundary.
    /// No token is issued; the caller logs in separately.
    pub async fn register(&self, username: &str, email: &str, password: &str) -> Result<Uuid, AppError> {
        let password_hash = self.hash_blocking(password.to_string()).await?;
        let new_user = NewUser::new(username.to_string(), email.to_string(), password_hash);

        match self.with_deadline(self.store.insert(&new_user)).await {
            Ok(user) => {
                info!("Registered user {}", user.id);
                Ok(user.id)
            }
            Err(StoreError::Duplicate) => Err(AuthError::DuplicateCredential.into()),
            Err(e) => {
                error!("Credential store insert failed: {}", e);
                Err(e.into())
            }
        }
    }

    /// Check credentials and mint an access/refresh token pair.
    ///
    /// Unknown identifier and wrong password produce the same error after the
    /// same amount of hashing work.
    pub async fn login(&self, identifier: &str, password: &str) -> Result<TokenPair, AppError> {
        let user = self
            .with_deadline(self.store.find_by_identifier(identifier))
            .await
            .map_err(|e| {
                error!("Credential store lookup failed: {}", e);
                AppError::from(e)
            })?;

        let (user_id, stored_hash) = match user {
            Some(user) => (Some(user.id), user.password_hash),
            None => (None, self.dummy_hash.to_string()),
        };

        let verified = self.verify_blocking(password.to_string(), stored_hash).await?;
        let user_id = match (user_id, verified) {
            (Some(id), true) => id,
            _ => return Err(AuthError::InvalidCredentials.into()),
        };

        let access_token = self.issuer.issue(user_id, self.access_lifetime)?;
        let refresh_token = self.issuer.issue(user_id, self.refresh_lifetime)?;
        info!("User {} logged in", user_id);

        Ok(TokenPair {
            access_token,
            refresh_token,
            expires_in_seconds: self.access_lifetime.num_seconds(),
        })
    }

    async fn with_deadline<T, F>(&self, fut: F) -> Result<T, StoreError>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        timeout(self.store_timeout, fut)
            .await
            .map_err(|_| StoreError::Timeout)?
    }

    async fn hash_blocking(&self, password: String) -> Result<String, AuthError> {
        let hasher = self.hasher.clone();
        tokio::task::spawn_blocking(move || hasher.hash(&password))
            .await
            .map_err(|e| AuthError::Hashing(e.to_string()))?
    }

    async fn verify_blocking(&self, password: String, hash: String) -> Result<bool, AuthError> {
        let hasher = self.hasher.clone();
        tokio::task::spawn_blocking(move || hasher.verify(&password, &hash))
            .await
            .map_err(|e| AuthError::Hashing(e.to_string()))
    }
}
