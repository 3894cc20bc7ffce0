//! # Query cache
//!
//! Last known value of each read query, keyed by [`QueryKey`]. The cache is an explicit object
//! handed to whoever needs it. [`QueryCache::invalidate`] drops a key and tells subscribers
//! (the refresh scheduler) to fetch it again.

use shared::models::{ModelDescriptor, SessionIdentity, ThreadRecord, ThreadSummary};
use std::{
    collections::HashMap,
    sync::{Arc, PoisonError, RwLock},
};
use tokio::sync::broadcast;
use tracing::trace;

const INVALIDATION_CAPACITY: usize = 32;

/// Identifies a read query.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum QueryKey {
    /// The thread list of one owner.
    Sessions(String),
    /// One thread's record.
    Session(SessionIdentity),
    /// The model inventory.
    Models,
}

/// A cached query result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CachedValue {
    /// Answer to [`QueryKey::Sessions`], already reconciled.
    Threads(Arc<[ThreadSummary]>),
    /// Answer to [`QueryKey::Session`].
    Thread(Arc<ThreadRecord>),
    /// Answer to [`QueryKey::Models`].
    Models(Arc<[ModelDescriptor]>),
}

/// Shared store of read results plus an invalidation feed.
#[derive(Debug)]
pub struct QueryCache {
    entries: RwLock<HashMap<QueryKey, CachedValue>>,
    invalidations: broadcast::Sender<QueryKey>,
}

impl Default for QueryCache {
    fn default() -> Self {
        Self::new()
    }
}

impl QueryCache {
    /// An empty cache with no subscribers.
    #[must_use]
    pub fn new() -> Self {
        let (invalidations, _) = broadcast::channel(INVALIDATION_CAPACITY);
        Self {
            entries: RwLock::new(HashMap::new()),
            invalidations,
        }
    }

    /// The value cached under `key`, if any.
    #[must_use]
    pub fn get(&self, key: &QueryKey) -> Option<CachedValue> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    /// Stores `value` under `key`, replacing any earlier value. Subscribers are not told.
    pub fn insert(&self, key: QueryKey, value: CachedValue) {
        trace!(?key, "caching query result");
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, value);
    }

    /// Drops `key` and notifies subscribers. Returns whether a value was cached.
    pub fn invalidate(&self, key: &QueryKey) -> bool {
        let removed = self
            .entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key)
            .is_some();
        trace!(?key, removed, "invalidating query");
        // No subscribers is fine.
        let _ = self.invalidations.send(key.clone());
        removed
    }

    /// Receives every key passed to [`QueryCache::invalidate`] from now on.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<QueryKey> {
        self.invalidations.subscribe()
    }

    /// The cached thread list of `owner`.
    #[must_use]
    pub fn threads(&self, owner: &str) -> Option<Arc<[ThreadSummary]>> {
        match self.get(&QueryKey::Sessions(owner.to_string()))? {
            CachedValue::Threads(threads) => Some(threads),
            _ => None,
        }
    }

    /// The cached record of thread `id`.
    #[must_use]
    pub fn thread(&self, id: SessionIdentity) -> Option<Arc<ThreadRecord>> {
        match self.get(&QueryKey::Session(id))? {
            CachedValue::Thread(record) => Some(record),
            _ => None,
        }
    }

    /// The cached model inventory.
    #[must_use]
    pub fn models(&self) -> Option<Arc<[ModelDescriptor]>> {
        match self.get(&QueryKey::Models)? {
            CachedValue::Models(models) => Some(models),
            _ => None,
        }
    }
}
