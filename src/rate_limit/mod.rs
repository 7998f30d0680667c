//! Request admission by fixed-window counting.
//!
//! A window opens on the first request for a key and lasts `window`; within
//! it at most `limit` requests are admitted. The counter store is consulted
//! with one atomic increment per request, and any store failure rejects the
//! request (fail-closed).

pub mod middleware;
pub mod store;

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{error, warn};

use crate::config::{RateLimitKey, RateLimitSettings};
use crate::error::{AppError, StoreError};

pub use middleware::RateLimit;
pub use store::{CounterStore, MemoryCounterStore, PgCounterStore, RateLimitCounter};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    LimitExceeded,
    StoreUnavailable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Admit,
    Reject(RejectReason),
}

impl Decision {
    pub fn is_admitted(&self) -> bool {
        matches!(self, Decision::Admit)
    }
}

impl From<RejectReason> for AppError {
    fn from(reason: RejectReason) -> Self {
        match reason {
            RejectReason::LimitExceeded => AppError::RateLimitExceeded,
            RejectReason::StoreUnavailable => {
                AppError::StoreError(StoreError::Unavailable("rate limit counter store".into()))
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyStrategy {
    /// One counter for the whole category.
    Global,
    /// One counter per category and caller address.
    PerIp,
}

impl From<RateLimitKey> for KeyStrategy {
    fn from(key: RateLimitKey) -> Self {
        match key {
            RateLimitKey::Global => KeyStrategy::Global,
            RateLimitKey::PerIp => KeyStrategy::PerIp,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RateLimitPolicy {
    pub category: String,
    pub limit: u64,
    pub window: Duration,
    pub key: KeyStrategy,
}

impl RateLimitPolicy {
    pub fn new(category: impl Into<String>, limit: u64, window: Duration, key: KeyStrategy) -> Self {
        Self {
            category: category.into(),
            limit,
            window,
            key,
        }
    }

    /// Policy applied to every route.
    pub fn api(settings: &RateLimitSettings) -> Self {
        Self::new(
            "api",
            settings.requests,
            Duration::from_secs(settings.window_secs),
            settings.key.into(),
        )
    }

    /// Stricter per-caller policy for the credential endpoints.
    pub fn credentials(settings: &RateLimitSettings) -> Self {
        Self::new(
            "auth",
            settings.auth_requests,
            Duration::from_secs(settings.window_secs),
            KeyStrategy::PerIp,
        )
    }

    pub fn key_for(&self, caller: Option<IpAddr>) -> String {
        match self.key {
            KeyStrategy::Global => self.category.clone(),
            KeyStrategy::PerIp => match caller {
                Some(ip) => format!("{}:{}", self.category, ip),
                None => format!("{}:unknown", self.category),
            },
        }
    }
}

pub struct RateLimiter {
    store: Arc<dyn CounterStore>,
    store_timeout: Duration,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn CounterStore>, store_timeout: Duration) -> Self {
        Self { store, store_timeout }
    }

    pub async fn allow(&self, key: &str, limit: u64, window: Duration) -> Decision {
        let count = match timeout(self.store_timeout, self.store.increment(key, window)).await {
            Ok(Ok(count)) => count,
            Ok(Err(e)) => {
                error!("Rate limit counter store failed for {}: {}", key, e);
                return Decision::Reject(RejectReason::StoreUnavailable);
            }
            Err(_) => {
                error!("Rate limit counter store timed out for {}", key);
                return Decision::Reject(RejectReason::StoreUnavailable);
            }
        };

        if count <= limit {
            Decision::Admit
        } else {
            warn!("Rate limit exceeded for {} ({} > {})", key, count, limit);
            Decision::Reject(RejectReason::LimitExceeded)
        }
    }

    pub async fn check(&self, policy: &RateLimitPolicy, caller: Option<IpAddr>) -> Decision {
        let key = policy.key_for(caller);
        self.allow(&key, policy.limit, policy.window).await
    }
}
