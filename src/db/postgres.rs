use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;

use crate::db::models::{NewUser, UserIdentity};
use crate::db::CredentialStore;
use crate::error::StoreError;

pub struct PgCredentialStore {
    pool: Arc<PgPool>,
}

impl PgCredentialStore {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    pub async fn connect(
        url: &str,
        max_connections: u32,
        acquire_timeout: Duration,
    ) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(acquire_timeout)
            .connect(url)
            .await?;

        Ok(Self { pool: Arc::new(pool) })
    }

    pub fn pool(&self) -> Arc<PgPool> {
        Arc::clone(&self.pool)
    }

    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations")
            .run(self.pool.as_ref())
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))
    }
}

#[async_trait]
impl CredentialStore for PgCredentialStore {
    async fn insert(&self, user: &NewUser) -> Result<UserIdentity, StoreError> {
        // No row comes back when either identifier is already taken in either
        // column. The CHECK constraints on `users` close the race between two
        // concurrent inserts.
        let identity = sqlx::query_as::<_, UserIdentity>(
            r#"
            INSERT INTO users (id, username, email, password_hash)
            SELECT $1::uuid, $2::varchar, $3::varchar, $4::text
            WHERE NOT EXISTS (
                SELECT 1 FROM users
                WHERE username IN ($2, $3) OR email IN ($2, $3)
            )
            RETURNING id, username, email, password_hash, created_at
            "#,
        )
        .bind(user.id)
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.password_hash)
        .fetch_optional(self.pool.as_ref())
        .await?;

        identity.ok_or(StoreError::Duplicate)
    }

    async fn find_by_identifier(&self, identifier: &str) -> Result<Option<UserIdentity>, StoreError> {
        let identity = sqlx::query_as::<_, UserIdentity>(
            "SELECT id, username, email, password_hash, created_at FROM users WHERE username = $1 OR email = $1",
        )
        .bind(identifier)
        .fetch_optional(self.pool.as_ref())
        .await?;

        Ok(identity)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1")
            .execute(self.pool.as_ref())
            .await?;
        Ok(())
    }
}
