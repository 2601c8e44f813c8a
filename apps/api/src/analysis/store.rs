//! Key-value backends for the analysis cache.
//!
//! A store only moves strings with an expiry. Serialization, namespacing,
//! timeouts and failure absorption live one layer up in `AnalysisCache`.

use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use redis::aio::MultiplexedConnection;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Cache operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("Cache value codec error: {0}")]
    Codec(#[from] serde_json::Error),
}

/// A shared string store with per-key expiry.
/// Implementations must be safe for concurrent use from every request task.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Returns the live value for `key`, or `None` if absent or expired.
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    /// Stores `value` under `key`, replacing any prior value, expiring after `ttl`.
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError>;

    /// Short name used in log lines.
    fn backend(&self) -> &'static str;
}

// ────────────────────────────────────────────────────────────────────────────
// Redis
// ────────────────────────────────────────────────────────────────────────────

/// Redis-backed store. Expiry is enforced by Redis itself (`SET .. EX`).
///
/// One multiplexed connection is shared by all requests. It is opened lazily
/// and discarded after any command error so the next call reconnects.
pub struct RedisStore {
    client: redis::Client,
    connection: Mutex<Option<MultiplexedConnection>>,
}

impl RedisStore {
    pub fn from_url(url: &str) -> Result<Self, CacheError> {
        let client = redis::Client::open(url)?;
        Ok(Self {
            client,
            connection: Mutex::new(None),
        })
    }

    async fn connection(&self) -> Result<MultiplexedConnection, CacheError> {
        let mut slot = self.connection.lock().await;
        if let Some(con) = slot.as_ref() {
            return Ok(con.clone());
        }
        let con = self.client.get_multiplexed_async_connection().await?;
        info!("Redis connection established");
        *slot = Some(con.clone());
        Ok(con)
    }

    async fn reset_connection(&self) {
        self.connection.lock().await.take();
    }
}

#[async_trait]
impl CacheStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut con = self.connection().await?;
        let result = redis::cmd("GET")
            .arg(key)
            .query_async::<_, Option<String>>(&mut con)
            .await;
        if result.is_err() {
            self.reset_connection().await;
        }
        Ok(result?)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError> {
        // Redis rejects EX 0
        let ttl_secs = ttl.as_secs().max(1);
        let mut con = self.connection().await?;
        let result = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("EX")
            .arg(ttl_secs)
            .query_async::<_, ()>(&mut con)
            .await;
        if result.is_err() {
            self.reset_connection().await;
        }
        Ok(result?)
    }

    fn backend(&self) -> &'static str {
        "redis"
    }
}

// ────────────────────────────────────────────────────────────────────────────
// In-process
// ────────────────────────────────────────────────────────────────────────────

struct MemoryEntry {
    value: String,
    expires_at: Instant,
}

/// Minimum time between full sweeps of expired in-process entries.
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// In-process store used when no Redis URL is configured.
///
/// Deadlines use `tokio::time::Instant`, so a paused test runtime controls expiry.
/// An expired entry is dropped when it is read, and writes sweep the whole map
/// at most once per `SWEEP_INTERVAL`, so keys that are never read again do not
/// accumulate.
pub struct MemoryStore {
    entries: DashMap<String, MemoryEntry>,
    last_sweep: std::sync::Mutex<Instant>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self {
            entries: DashMap::new(),
            last_sweep: std::sync::Mutex::new(Instant::now()),
        }
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn sweep_if_due(&self, now: Instant) {
        // Another writer holds the sweep
        let Ok(mut last_sweep) = self.last_sweep.try_lock() else {
            return;
        };
        if now.duration_since(*last_sweep) < SWEEP_INTERVAL {
            return;
        }
        *last_sweep = now;
        drop(last_sweep);

        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.expires_at > now);
        let swept = before.saturating_sub(self.entries.len());
        if swept > 0 {
            debug!("Swept {swept} expired in-process cache entries");
        }
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        if let Some(entry) = self.entries.get(key) {
            if entry.expires_at > Instant::now() {
                return Ok(Some(entry.value.clone()));
            }
            drop(entry);
            self.entries
                .remove_if(key, |_, entry| entry.expires_at <= Instant::now());
        }
        Ok(None)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError> {
        let now = Instant::now();
        self.entries.insert(
            key.to_string(),
            MemoryEntry {
                value: value.to_string(),
                expires_at: now + ttl,
            },
        );
        self.sweep_if_due(now);
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}
