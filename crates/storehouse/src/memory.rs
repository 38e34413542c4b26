//! Volatile tier bounded by entry count and total cost

use crate::config::InMemoryConfig;
use crate::entry::{CacheEntry, CacheStats};
use crate::error::{Result, StorehouseError};
use crate::expiry::Expiry;
use crate::index::LruIndex;
use crate::storage::Storehouse;
use crate::transformer::SharedTransformer;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tracing::debug;

/// Entries plus hit/miss counters, guarded by a store's lock.
///
/// Shared by the in-memory and auto-purging tiers.
pub(crate) struct MemoryState<T> {
    pub(crate) index: LruIndex<CacheEntry<T>>,
    hits: u64,
    misses: u64,
}

impl<T: Clone> MemoryState<T> {
    pub(crate) fn new() -> Self {
        Self {
            index: LruIndex::new(),
            hits: 0,
            misses: 0,
        }
    }

    /// Lazy expiry: an expired entry is reported missing but left in place
    pub(crate) fn read(&mut self, key: &str, now: DateTime<Utc>) -> Result<CacheEntry<T>> {
        let live = self
            .index
            .get(key)
            .is_some_and(|entry| !entry.is_expired_at(now));
        if !live {
            self.misses += 1;
            debug!(key, "Memory miss");
            return Err(StorehouseError::NotFound);
        }

        self.hits += 1;
        let entry = self.index.touch(key).ok_or(StorehouseError::NotFound)?;
        entry.last_accessed_at = now;
        Ok(entry.clone())
    }

    pub(crate) fn remove_if_expired(&mut self, key: &str, now: DateTime<Utc>) -> bool {
        let expired = self
            .index
            .get(key)
            .is_some_and(|entry| entry.is_expired_at(now));
        if expired {
            self.index.remove(key);
        }
        expired
    }

    /// Remove every entry matching `predicate`, returning the removed keys
    pub(crate) fn remove_where(
        &mut self,
        predicate: impl Fn(&CacheEntry<T>) -> bool,
    ) -> Vec<String> {
        let keys = self.index.keys_where(predicate);
        for key in &keys {
            self.index.remove(key);
        }
        keys
    }

    pub(crate) fn stats(&self, capacity: u64) -> CacheStats {
        CacheStats {
            entries: self.index.len(),
            total_size: self.index.total_cost(),
            capacity,
            hits: self.hits,
            misses: self.misses,
        }
    }
}

/// In-memory store evicting least recently used entries once either the
/// count limit or the total cost limit is exceeded
pub struct InMemoryStore<T> {
    config: InMemoryConfig,
    transformer: SharedTransformer<T>,
    state: Mutex<MemoryState<T>>,
}

impl<T: Clone> InMemoryStore<T> {
    /// Create an empty store; `transformer` prices values on insert
    pub fn new(config: InMemoryConfig, transformer: SharedTransformer<T>) -> Self {
        Self {
            config,
            transformer,
            state: Mutex::new(MemoryState::new()),
        }
    }

    pub fn config(&self) -> &InMemoryConfig {
        &self.config
    }

    /// Number of stored entries, expired ones included
    pub fn len(&self) -> usize {
        self.state.lock().index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn over_limits(&self, state: &MemoryState<T>) -> bool {
        let count_limit = self.config.count_limit;
        let cost_limit = self.config.total_cost_limit;
        (count_limit > 0 && state.index.len() > count_limit)
            || (cost_limit > 0 && state.index.total_cost() > cost_limit)
    }
}

impl<T> Storehouse<T> for InMemoryStore<T>
where
    T: Clone + Send,
{
    fn set(&self, key: &str, value: T, expiry: Option<Expiry>) -> Result<()> {
        let cost = self.transformer.cost(&value)?;
        let now = Utc::now();
        let expires_at = expiry.unwrap_or(self.config.default_expiry).resolve(now);

        let mut state = self.state.lock();
        state.index.insert(
            key.to_string(),
            CacheEntry {
                value,
                cost,
                expires_at,
                created_at: now,
                last_accessed_at: now,
            },
        );
        debug!(key, cost, "Stored entry in memory");

        while self.over_limits(&state) {
            match state.index.pop_lru() {
                Some((evicted, _)) => debug!(key = %evicted, "Evicted least recently used entry"),
                None => break,
            }
        }

        Ok(())
    }

    fn get(&self, key: &str) -> Result<CacheEntry<T>> {
        self.state.lock().read(key, Utc::now())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.state.lock().index.remove(key);
        Ok(())
    }

    fn remove_all(&self) -> Result<()> {
        self.state.lock().index.drain();
        Ok(())
    }

    fn remove_if_expired(&self, key: &str) -> Result<()> {
        self.state.lock().remove_if_expired(key, Utc::now());
        Ok(())
    }

    fn remove_expired(&self) -> Result<()> {
        let now = Utc::now();
        let removed = self
            .state
            .lock()
            .remove_where(|entry| entry.is_expired_at(now));
        debug!(count = removed.len(), "Swept expired entries from memory");
        Ok(())
    }

    fn remove_since(&self, since: DateTime<Utc>) -> Result<()> {
        self.state
            .lock()
            .remove_where(|entry| entry.created_at >= since);
        Ok(())
    }

    fn current_usage(&self) -> u64 {
        self.state.lock().index.total_cost()
    }

    fn capacity(&self) -> u64 {
        self.config.total_cost_limit
    }

    fn stats(&self) -> CacheStats {
        self.state.lock().stats(self.config.total_cost_limit)
    }
}
