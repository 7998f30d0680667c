use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::db::models::{NewUser, UserIdentity};
use crate::db::CredentialStore;
use crate::error::StoreError;

#[derive(Default)]
struct Tables {
    users: HashMap<Uuid, UserIdentity>,
    by_username: HashMap<String, Uuid>,
    by_email: HashMap<String, Uuid>,
}

/// Process-local credential store, used by tests and the `memory` backend.
#[derive(Default)]
pub struct MemoryCredentialStore {
    tables: RwLock<Tables>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.tables.read().await.users.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn insert(&self, user: &NewUser) -> Result<UserIdentity, StoreError> {
        // Uniqueness check and insert happen under the same write guard.
        // Usernames and emails are one login namespace, so each new identifier
        // is checked against both indexes.
        let mut tables = self.tables.write().await;
        let taken = |identifier: &str| {
            tables.by_username.contains_key(identifier) || tables.by_email.contains_key(identifier)
        };
        if taken(&user.username) || taken(&user.email) {
            return Err(StoreError::Duplicate);
        }

        let identity = user.clone().into_identity(Utc::now());
        tables.by_username.insert(identity.username.clone(), identity.id);
        tables.by_email.insert(identity.email.clone(), identity.id);
        tables.users.insert(identity.id, identity.clone());
        Ok(identity)
    }

    async fn find_by_identifier(&self, identifier: &str) -> Result<Option<UserIdentity>, StoreError> {
        let tables = self.tables.read().await;
        let id = tables
            .by_username
            .get(identifier)
            .or_else(|| tables.by_email.get(identifier));
        Ok(id.and_then(|id| tables.users.get(id)).cloned())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
