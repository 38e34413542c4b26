//! Cache entry and metadata types

use crate::expiry;
use crate::index::Weighted;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A stored value with its bookkeeping
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry<T> {
    pub value: T,
    /// Encoded size charged against the tier's capacity
    pub cost: u64,
    /// `None` means the entry never expires
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    /// Refreshed on every successful read
    pub last_accessed_at: DateTime<Utc>,
}

impl<T> CacheEntry<T> {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        expiry::is_expired(self.expires_at, now)
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }
}

impl<T> Weighted for CacheEntry<T> {
    fn cost(&self) -> u64 {
        self.cost
    }
}

/// Metadata for a disk-resident entry, persisted in its sidecar file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryMeta {
    /// Original key; its SHA-256 must match the file name
    pub key: String,
    /// Payload size in bytes
    pub cost: u64,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub last_accessed_at: DateTime<Utc>,
}

impl EntryMeta {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        expiry::is_expired(self.expires_at, now)
    }

    pub(crate) fn into_entry<T>(self, value: T) -> CacheEntry<T> {
        CacheEntry {
            value,
            cost: self.cost,
            expires_at: self.expires_at,
            created_at: self.created_at,
            last_accessed_at: self.last_accessed_at,
        }
    }
}

impl Weighted for EntryMeta {
    fn cost(&self) -> u64 {
        self.cost
    }
}

/// Statistics about a store
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheStats {
    pub entries: usize,
    pub total_size: u64,
    /// `0` when the store is unbounded
    pub capacity: u64,
    pub hits: u64,
    pub misses: u64,
}
