//! Credential storage for the authentication service.
//!
//! The core only needs a lookup-by-identifier and an insert that enforces
//! username/email uniqueness; both backends implement [`CredentialStore`].

pub mod memory;
pub mod models;
pub mod postgres;

use async_trait::async_trait;

use crate::error::StoreError;

pub use memory::MemoryCredentialStore;
pub use models::{NewUser, UserIdentity};
pub use postgres::PgCredentialStore;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Insert a new identity. Returns [`StoreError::Duplicate`] when either the
    /// username or the email is already taken.
    async fn insert(&self, user: &NewUser) -> Result<UserIdentity, StoreError>;

    /// Look up an identity by username or email.
    async fn find_by_identifier(&self, identifier: &str) -> Result<Option<UserIdentity>, StoreError>;

    async fn ping(&self) -> Result<(), StoreError>;
}
