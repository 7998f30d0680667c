use async_trait::async_trait;
use sqlx::PgPool;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::error::StoreError;

/// Stale counters are swept after this many increments.
pub const SWEEP_INTERVAL: u64 = 1024;

/// Upper bound on rows removed by one Postgres sweep.
const SWEEP_BATCH: i64 = 1000;

/// Shared counter backend for the rate limiter.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Atomically increments `key` and returns the count within its current
    /// window. A key whose window has elapsed starts over at 1.
    async fn increment(&self, key: &str, window: Duration) -> Result<u64, StoreError>;
}

#[derive(Debug, Clone)]
pub struct RateLimitCounter {
    pub count: u64,
    pub window_start: Instant,
    pub window_size: Duration,
}

impl RateLimitCounter {
    fn new(now: Instant, window_size: Duration) -> Self {
        Self {
            count: 0,
            window_start: now,
            window_size,
        }
    }

    fn is_expired(&self, now: Instant) -> bool {
        now.duration_since(self.window_start) > self.window_size
    }
}

fn sweep(counters: &mut HashMap<String, RateLimitCounter>, now: Instant) -> usize {
    let before = counters.len();
    counters.retain(|_, counter| !counter.is_expired(now));
    before - counters.len()
}

/// Returns true on every `interval`-th call.
fn sweep_due(increments: &AtomicU64, interval: u64) -> bool {
    let n = increments.fetch_add(1, Ordering::Relaxed) + 1;
    interval > 0 && n % interval == 0
}

pub struct MemoryCounterStore {
    counters: RwLock<HashMap<String, RateLimitCounter>>,
    sweep_interval: u64,
    increments: AtomicU64,
}

impl Default for MemoryCounterStore {
    fn default() -> Self {
        Self::with_sweep_interval(SWEEP_INTERVAL)
    }
}

impl MemoryCounterStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sweep_interval(sweep_interval: u64) -> Self {
        Self {
            counters: RwLock::new(HashMap::new()),
            sweep_interval,
            increments: AtomicU64::new(0),
        }
    }

    /// Drops counters whose window has elapsed.
    pub async fn purge_expired(&self) -> usize {
        let mut counters = self.counters.write().await;
        sweep(&mut counters, Instant::now())
    }

    pub async fn len(&self) -> usize {
        self.counters.read().await.len()
    }
}

#[async_trait]
impl CounterStore for MemoryCounterStore {
    async fn increment(&self, key: &str, window: Duration) -> Result<u64, StoreError> {
        let now = Instant::now();
        let mut counters = self.counters.write().await;

        if sweep_due(&self.increments, self.sweep_interval) {
            let removed = sweep(&mut counters, now);
            debug!("Swept {} expired rate limit counters", removed);
        }

        let counter = counters
            .entry(key.to_string())
            .or_insert_with(|| RateLimitCounter::new(now, window));
        if counter.is_expired(now) {
            *counter = RateLimitCounter::new(now, window);
        }

        counter.count += 1;
        Ok(counter.count)
    }
}

/// Counter table in Postgres; one upsert statement per increment.
pub struct PgCounterStore {
    pool: Arc<PgPool>,
    sweep_interval: u64,
    increments: AtomicU64,
}

impl PgCounterStore {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self::with_sweep_interval(pool, SWEEP_INTERVAL)
    }

    pub fn with_sweep_interval(pool: Arc<PgPool>, sweep_interval: u64) -> Self {
        Self {
            pool,
            sweep_interval,
            increments: AtomicU64::new(0),
        }
    }

    /// Deletes up to `limit` counters whose window has elapsed.
    pub async fn purge_expired(&self, limit: i64) -> Result<u64, StoreError> {
        // The outer expiry test is re-evaluated against rows a concurrent
        // increment has just reset.
        let result = sqlx::query(
            r#"
            DELETE FROM rate_limit_counters
            WHERE key IN (
                SELECT key FROM rate_limit_counters
                WHERE window_start + make_interval(secs => window_secs) < now()
                LIMIT $1
            )
            AND window_start + make_interval(secs => window_secs) < now()
            "#,
        )
        .bind(limit)
        .execute(self.pool.as_ref())
        .await?;

        Ok(result.rows_affected())
    }
}

#[async_trait]
impl CounterStore for PgCounterStore {
    async fn increment(&self, key: &str, window: Duration) -> Result<u64, StoreError> {
        let count = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO rate_limit_counters AS c (key, count, window_start, window_secs)
            VALUES ($1, 1, now(), $2)
            ON CONFLICT (key) DO UPDATE SET
                count = CASE
                    WHEN c.window_start + make_interval(secs => $2) < now() THEN 1
                    ELSE c.count + 1
                END,
                window_start = CASE
                    WHEN c.window_start + make_interval(secs => $2) < now() THEN now()
                    ELSE c.window_start
                END,
                window_secs = $2
            RETURNING count
            "#,
        )
        .bind(key)
        .bind(window.as_secs_f64())
        .fetch_one(self.pool.as_ref())
        .await?;

        if sweep_due(&self.increments, self.sweep_interval) {
            // A failed sweep leaves stale rows behind but the count is still valid
            match self.purge_expired(SWEEP_BATCH).await {
                Ok(removed) => debug!("Swept {} expired rate limit counters", removed),
                Err(e) => warn!("Rate limit counter sweep failed: {}", e),
            }
        }

        Ok(count.max(0) as u64)
    }
}
