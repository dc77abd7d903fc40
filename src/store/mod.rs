//! Keyed TTL store — persistence layer for all shared state.
//!
//! The [`TtlStore`] trait abstracts over storage backends holding serialized
//! records under string keys with a per-entry expiration. The only current
//! implementation is [`memory::InMemoryTtlStore`], backed by a `DashMap` with
//! a background reaper; a Redis-class backend would map the same operations
//! onto native `SET ... EX` / `GET` / `DEL` / `SCAN`.
//!
//! On top of the raw store, [`TtlRepository`] gives each entity type a typed
//! view: one generic component parameterized by the serialized type and a
//! keyspace name, reused for every keyspace instead of hand-duplicated
//! repositories. Keys are laid out as `<keyspace>:<key>`.

pub mod memory;

use std::{marker::PhantomData, sync::Arc, time::Duration};

use async_trait::async_trait;
use serde::{Serialize, de::DeserializeOwned};

use crate::Result;

pub use memory::{InMemoryTtlStore, spawn_reaper};

/// Trait abstracting the keyed TTL storage backend.
///
/// Implementations must be `Send + Sync` because the store is shared across
/// async tasks, and each per-key operation must be atomic.
#[async_trait]
pub trait TtlStore: Send + Sync + 'static {
    /// Store `value` under `key`, replacing any previous entry, expiring
    /// after `ttl`.
    async fn put(&self, key: &str, value: serde_json::Value, ttl: Duration) -> Result<()>;

    /// Look up a live (non-expired) entry.
    async fn get(&self, key: &str) -> Result<Option<serde_json::Value>>;

    /// Delete an entry. Returns `true` if it existed and was live.
    async fn delete(&self, key: &str) -> Result<bool>;

    /// Delete every entry whose key starts with `prefix`. Returns the number
    /// of entries removed.
    async fn delete_prefix(&self, prefix: &str) -> Result<usize>;

    /// All live values whose key starts with `prefix`, in
    /// implementation-defined order.
    async fn list_prefix(&self, prefix: &str) -> Result<Vec<serde_json::Value>>;
}

/// Entities that know their own primary key within a keyspace.
pub trait Keyed {
    /// The key this entity is stored under (without the keyspace prefix).
    fn store_key(&self) -> String;
}

/// Typed view over one keyspace of a [`TtlStore`].
///
/// All entries saved through a repository share its keyspace prefix and TTL.
pub struct TtlRepository<V> {
    store: Arc<dyn TtlStore>,
    keyspace: &'static str,
    ttl: Duration,
    _marker: PhantomData<fn() -> V>,
}

impl<V> Clone for TtlRepository<V> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            keyspace: self.keyspace,
            ttl: self.ttl,
            _marker: PhantomData,
        }
    }
}

impl<V: Serialize + DeserializeOwned + Keyed> TtlRepository<V> {
    /// Create a repository bound to `keyspace` with a fixed per-entry TTL.
    #[must_use]
    pub fn new(store: Arc<dyn TtlStore>, keyspace: &'static str, ttl: Duration) -> Self {
        Self {
            store,
            keyspace,
            ttl,
            _marker: PhantomData,
        }
    }

    fn full_key(&self, key: &str) -> String {
        format!("{}:{}", self.keyspace, key)
    }

    /// Persist `value` under its own key with the repository TTL.
    pub async fn save(&self, value: &V) -> Result<()> {
        let key = self.full_key(&value.store_key());
        self.store.put(&key, serde_json::to_value(value)?, self.ttl).await
    }

    /// Look up an entity by its key (without the keyspace prefix).
    pub async fn find_by_id(&self, key: &str) -> Result<Option<V>> {
        match self.store.get(&self.full_key(key)).await? {
            Some(raw) => Ok(Some(serde_json::from_value(raw)?)),
            None => Ok(None),
        }
    }

    /// Delete an entity by key. Returns `true` if it existed.
    pub async fn delete(&self, key: &str) -> Result<bool> {
        self.store.delete(&self.full_key(key)).await
    }

    /// Delete every entity in this keyspace. Returns the number removed.
    pub async fn delete_all(&self) -> Result<usize> {
        self.store.delete_prefix(&format!("{}:", self.keyspace)).await
    }

    /// All live entities in this keyspace, in implementation-defined order.
    pub async fn list_all(&self) -> Result<Vec<V>> {
        let raw = self.store.list_prefix(&format!("{}:", self.keyspace)).await?;
        raw.into_iter()
            .map(|v| serde_json::from_value(v).map_err(Into::into))
            .collect()
    }
}
