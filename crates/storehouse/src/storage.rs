//! Operation surface shared by every tier

use crate::entry::{CacheEntry, CacheStats};
use crate::error::{Result, StorehouseError};
use crate::expiry::Expiry;
use chrono::{DateTime, Utc};

/// A keyed, capacity-bounded store of `T` values.
///
/// Every operation is synchronous and serialized against every other
/// operation on the same instance. `expiry: None` applies the store's default.
pub trait Storehouse<T>: Send + Sync {
    fn set(&self, key: &str, value: T, expiry: Option<Expiry>) -> Result<()>;

    /// Fails with `NotFound` when the key is absent or its entry has expired
    fn get(&self, key: &str) -> Result<CacheEntry<T>>;

    /// Succeeds whether or not the key was present
    fn remove(&self, key: &str) -> Result<()>;

    fn remove_all(&self) -> Result<()>;

    fn remove_if_expired(&self, key: &str) -> Result<()>;

    fn remove_expired(&self) -> Result<()>;

    fn remove_since(&self, since: DateTime<Utc>) -> Result<()>;

    fn current_usage(&self) -> u64;

    fn capacity(&self) -> u64;

    fn stats(&self) -> CacheStats;

    fn object(&self, key: &str) -> Result<T> {
        self.get(key).map(|entry| entry.value)
    }

    /// Like [`object`](Storehouse::object), with `NotFound` mapped to `None`
    fn lookup(&self, key: &str) -> Result<Option<T>> {
        match self.object(key) {
            Ok(value) => Ok(Some(value)),
            Err(StorehouseError::NotFound) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Counts as an access when the entry is present
    fn contains(&self, key: &str) -> bool {
        self.get(key).is_ok()
    }
}
