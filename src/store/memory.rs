//! In-memory TTL store backed by a `DashMap`.
//!
//! Expired entries are evicted lazily on access and swept periodically by a
//! background reaper task ([`spawn_reaper`]).

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::debug;

use super::TtlStore;
use crate::Result;

struct Entry {
    value: serde_json::Value,
    expires_at: Instant,
}

impl Entry {
    fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

/// In-memory [`TtlStore`] implementation.
#[derive(Default)]
pub struct InMemoryTtlStore {
    entries: DashMap<String, Entry>,
}

impl InMemoryTtlStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Remove all expired entries. Called periodically by the reaper.
    pub fn reap_expired(&self) -> usize {
        let expired: Vec<String> = self
            .entries
            .iter()
            .filter(|e| e.value().is_expired())
            .map(|e| e.key().clone())
            .collect();

        let count = expired.len();
        for key in expired {
            if self.entries.remove(&key).is_some() {
                debug!(key = %key, "Reaped expired entry");
            }
        }
        count
    }
}

#[async_trait]
impl TtlStore for InMemoryTtlStore {
    async fn put(&self, key: &str, value: serde_json::Value, ttl: Duration) -> Result<()> {
        self.entries.insert(
            key.to_string(),
            Entry {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<serde_json::Value>> {
        let Some(entry) = self.entries.get(key) else {
            return Ok(None);
        };

        if entry.is_expired() {
            drop(entry);
            // Lazy eviction: remove on access
            self.entries.remove(key);
            debug!(key = %key, "Lazy-evicted expired entry");
            return Ok(None);
        }

        Ok(Some(entry.value.clone()))
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        match self.entries.remove(key) {
            Some((_, entry)) => Ok(!entry.is_expired()),
            None => Ok(false),
        }
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<usize> {
        let keys: Vec<String> = self
            .entries
            .iter()
            .filter(|e| e.key().starts_with(prefix))
            .map(|e| e.key().clone())
            .collect();

        let mut count = 0;
        for key in keys {
            if self.entries.remove(&key).is_some() {
                count += 1;
            }
        }
        Ok(count)
    }

    async fn list_prefix(&self, prefix: &str) -> Result<Vec<serde_json::Value>> {
        Ok(self
            .entries
            .iter()
            .filter(|e| e.key().starts_with(prefix) && !e.value().is_expired())
            .map(|e| e.value().value.clone())
            .collect())
    }
}

/// Spawn a background task that reaps expired entries every `interval`.
///
/// The task exits when the `shutdown` receiver fires.
pub fn spawn_reaper(
    store: Arc<InMemoryTtlStore>,
    interval: Duration,
    mut shutdown: tokio::sync::broadcast::Receiver<()>,
) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let reaped = store.reap_expired();
                    if reaped > 0 {
                        debug!(count = reaped, "Reaped expired store entries");
                    }
                }
                _ = shutdown.recv() => {
                    debug!("Store reaper shutting down");
                    break;
                }
            }
        }
    });
}
