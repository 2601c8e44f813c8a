//! Analysis cache: fingerprint → serialized analysis, with TTL.
//!
//! Every store failure (connection, command, timeout, bad payload) is logged
//! and absorbed here. Reads degrade to a miss, writes are dropped. Callers
//! never see a cache error.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, warn};

use crate::analysis::fingerprint::Fingerprint;
use crate::analysis::store::{CacheError, CacheStore};

/// Namespace for analyses produced by the real model.
pub const DEFAULT_NAMESPACE: &str = "analysis";

#[derive(Clone)]
pub struct AnalysisCache {
    store: Arc<dyn CacheStore>,
    default_ttl: Duration,
    op_timeout: Duration,
    prefix: String,
}

impl AnalysisCache {
    pub fn new(store: Arc<dyn CacheStore>, default_ttl: Duration, op_timeout: Duration) -> Self {
        Self {
            store,
            default_ttl,
            op_timeout,
            prefix: key_prefix(DEFAULT_NAMESPACE),
        }
    }

    /// Moves every key under `resume:{namespace}:`. Placeholder results use
    /// their own namespace so they are never served as real analyses.
    pub fn with_namespace(mut self, namespace: &str) -> Self {
        self.prefix = key_prefix(namespace);
        self
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    pub fn backend(&self) -> &'static str {
        self.store.backend()
    }

    fn key(&self, fingerprint: &Fingerprint) -> String {
        format!("{}{fingerprint}", self.prefix)
    }

    /// Looks up a live entry. Absent, expired and unreadable all return `None`.
    pub async fn get<T: DeserializeOwned>(&self, fingerprint: &Fingerprint) -> Option<T> {
        let key = self.key(fingerprint);
        let raw = match self.bounded(self.store.get(&key)).await {
            Ok(raw) => raw?,
            Err(e) => {
                warn!(
                    "Cache read failed on {} store, treating as miss: {e}",
                    self.backend()
                );
                return None;
            }
        };

        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!("Discarding undecodable cache entry {fingerprint}: {}", CacheError::from(e));
                None
            }
        }
    }

    /// Stores `value` for `ttl`, overwriting any prior entry. Failures are logged and dropped.
    pub async fn put<T: Serialize>(&self, fingerprint: &Fingerprint, value: &T, ttl: Duration) {
        let raw = match serde_json::to_string(value) {
            Ok(raw) => raw,
            Err(e) => {
                warn!("Skipping cache write for {fingerprint}: {}", CacheError::from(e));
                return;
            }
        };

        let key = self.key(fingerprint);
        match self.bounded(self.store.set(&key, &raw, ttl)).await {
            Ok(()) => debug!("Cached analysis {fingerprint} for {}s", ttl.as_secs()),
            Err(e) => warn!(
                "Cache write failed on {} store, entry dropped: {e}",
                self.backend()
            ),
        }
    }

    async fn bounded<T>(
        &self,
        op: impl Future<Output = Result<T, CacheError>>,
    ) -> Result<T, CacheError> {
        tokio::time::timeout(self.op_timeout, op)
            .await
            .map_err(|_| CacheError::Timeout(self.op_timeout))?
    }
}

fn key_prefix(namespace: &str) -> String {
    format!("resume:{namespace}:")
}
