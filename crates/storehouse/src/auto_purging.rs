//! Memory tier with a hard capacity and a two-threshold LRU purge
//!
//! Once a `set` pushes usage above the capacity `C`, least recently used
//! entries are purged until usage is at or below the preferred level `P`.
//! Purging to `P` rather than `C` leaves headroom so the next insert does not
//! immediately purge again.
//!
//! Optionally fronts an [`OnDiskStore`]: writes go to both tiers, memory misses
//! fall through to disk and disk hits are promoted back into memory.

use crate::config::AutoPurgingConfig;
use crate::disk::OnDiskStore;
use crate::entry::{CacheEntry, CacheStats};
use crate::error::{Result, StorehouseError};
use crate::expiry::Expiry;
use crate::memory::MemoryState;
use crate::storage::Storehouse;
use crate::transformer::SharedTransformer;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

/// Memory store purged from capacity `C` down to the preferred usage `P`,
/// optionally backed by a disk tier
pub struct AutoPurgingStore<T> {
    config: AutoPurgingConfig,
    /// Prices entries, and encodes them for the disk tier when present
    transformer: SharedTransformer<T>,
    state: Mutex<MemoryState<T>>,
    /// Write-through backing tier
    disk: Option<OnDiskStore<T>>,
}

impl<T: Clone + Send> AutoPurgingStore<T> {
    /// Memory-only store
    pub fn new(config: AutoPurgingConfig, transformer: SharedTransformer<T>) -> Self {
        Self {
            config,
            transformer,
            state: Mutex::new(MemoryState::new()),
            disk: None,
        }
    }

    /// Hybrid store: memory in front of `disk`, sharing its transformer
    pub fn with_disk(config: AutoPurgingConfig, disk: OnDiskStore<T>) -> Self {
        Self {
            config,
            transformer: disk.transformer(),
            state: Mutex::new(MemoryState::new()),
            disk: Some(disk),
        }
    }

    /// Hard capacity `C`
    pub fn memory_capacity(&self) -> u64 {
        self.config.memory_capacity()
    }

    /// Usage a purge brings the store down to (`P`)
    pub fn preferred_usage_after_purge(&self) -> u64 {
        self.config.preferred_usage_after_purge()
    }

    /// Backing disk tier, if any
    pub fn disk(&self) -> Option<&OnDiskStore<T>> {
        self.disk.as_ref()
    }

    /// Payload bytes held by the disk tier
    pub fn disk_usage(&self) -> Option<u64> {
        self.disk.as_ref().map(|disk| disk.current_usage())
    }

    /// Insert into memory, purging if the capacity is exceeded
    fn admit(&self, state: &mut MemoryState<T>, key: &str, entry: CacheEntry<T>) {
        let cost = entry.cost;
        state.index.insert(key.to_string(), entry);

        if state.index.total_cost() > self.config.memory_capacity() {
            self.purge(state);
        }
        if cost > self.config.memory_capacity() {
            warn!(
                key,
                cost,
                capacity = self.config.memory_capacity(),
                "Value larger than memory capacity was purged on insert"
            );
        }
    }

    fn purge(&self, state: &mut MemoryState<T>) {
        let before = state.index.total_cost();
        let evicted = state
            .index
            .purge_to(self.config.preferred_usage_after_purge());
        for (key, _) in &evicted {
            debug!(key = %key, "Purged least recently used entry");
        }
        info!(
            evicted = evicted.len(),
            before,
            after = state.index.total_cost(),
            "Purged memory"
        );
    }
}

impl<T> Storehouse<T> for AutoPurgingStore<T>
where
    T: Clone + Send,
{
    fn set(&self, key: &str, value: T, expiry: Option<Expiry>) -> Result<()> {
        let now = Utc::now();
        let expires_at = expiry
            .unwrap_or(self.config.default_expiry())
            .resolve(now);

        let mut state = self.state.lock();
        let cost = match &self.disk {
            Some(disk) => {
                let bytes = self.transformer.encode(&value)?;
                disk.put_encoded(key, &bytes, expires_at, now)?;
                bytes.len() as u64
            }
            None => self.transformer.cost(&value)?,
        };

        self.admit(
            &mut state,
            key,
            CacheEntry {
                value,
                cost,
                expires_at,
                created_at: now,
                last_accessed_at: now,
            },
        );
        Ok(())
    }

    fn get(&self, key: &str) -> Result<CacheEntry<T>> {
        let now = Utc::now();
        let mut state = self.state.lock();

        match state.read(key, now) {
            Err(StorehouseError::NotFound) => {}
            found => {
                if let (Ok(_), Some(disk)) = (&found, &self.disk) {
                    disk.record_access(key, now);
                }
                return found;
            }
        }

        let disk = self.disk.as_ref().ok_or(StorehouseError::NotFound)?;
        let entry = disk.get(key)?;
        debug!(key, "Promoting disk hit into memory");
        self.admit(&mut state, key, entry.clone());
        Ok(entry)
    }

    fn remove(&self, key: &str) -> Result<()> {
        let mut state = self.state.lock();
        if let Some(disk) = &self.disk {
            disk.remove(key)?;
        }
        state.index.remove(key);
        Ok(())
    }

    fn remove_all(&self) -> Result<()> {
        let mut state = self.state.lock();
        state.index.drain();
        match &self.disk {
            Some(disk) => disk.remove_all(),
            None => Ok(()),
        }
    }

    fn remove_if_expired(&self, key: &str) -> Result<()> {
        let mut state = self.state.lock();
        state.remove_if_expired(key, Utc::now());
        match &self.disk {
            Some(disk) => disk.remove_if_expired(key),
            None => Ok(()),
        }
    }

    fn remove_expired(&self) -> Result<()> {
        let now = Utc::now();
        let mut state = self.state.lock();
        let removed = state.remove_where(|entry| entry.is_expired_at(now));
        debug!(count = removed.len(), "Swept expired entries from memory");
        match &self.disk {
            Some(disk) => disk.remove_expired(),
            None => Ok(()),
        }
    }

    fn remove_since(&self, since: DateTime<Utc>) -> Result<()> {
        let touched_since = |created_at: DateTime<Utc>, last_accessed_at: DateTime<Utc>| {
            created_at >= since || last_accessed_at >= since
        };

        let mut state = self.state.lock();
        let removed =
            state.remove_where(|entry| touched_since(entry.created_at, entry.last_accessed_at));
        debug!(count = removed.len(), "Removed recent entries from memory");

        // Memory hits are recorded on disk, so this also catches entries
        // that were read after the cutoff and purged from memory since
        if let Some(disk) = &self.disk {
            let count =
                disk.remove_where(|meta| touched_since(meta.created_at, meta.last_accessed_at));
            debug!(count, "Removed recent entries from disk");
        }
        Ok(())
    }

    fn current_usage(&self) -> u64 {
        self.state.lock().index.total_cost()
    }

    fn capacity(&self) -> u64 {
        self.config.memory_capacity()
    }

    fn stats(&self) -> CacheStats {
        self.state.lock().stats(self.config.memory_capacity())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OnDiskConfig;
    use crate::transformer;
    use chrono::Duration;
    use std::sync::Arc;
    use tempfile::tempdir;

    fn store(capacity: u64, after_purge: u64) -> AutoPurgingStore<String> {
        let config = AutoPurgingConfig::new(Expiry::Never, capacity, after_purge).unwrap();
        AutoPurgingStore::new(config, transformer::json::<String>())
    }

    fn hybrid(root: &std::path::Path, capacity: u64, after_purge: u64) -> AutoPurgingStore<String> {
        let disk = OnDiskStore::open(
            root,
            OnDiskConfig::new("hybrid", 100_000_000),
            transformer::json::<String>(),
        )
        .unwrap();
        let config = AutoPurgingConfig::new(Expiry::Never, capacity, after_purge).unwrap();
        AutoPurgingStore::with_disk(config, disk)
    }

    #[test]
    fn test_init_stores_thresholds() {
        let sut = store(100_000_000, 60_000_000);
        assert_eq!(sut.memory_capacity(), 100_000_000);
        assert_eq!(sut.preferred_usage_after_purge(), 60_000_000);
        assert_eq!(sut.capacity(), 100_000_000);
        assert_eq!(sut.current_usage(), 0);
    }

    #[test]
    fn test_inverted_thresholds_are_a_configuration_error() {
        let result = AutoPurgingConfig::new(Expiry::Never, 50, 60);
        assert!(matches!(result, Err(StorehouseError::Config(_))));
    }

    #[test]
    fn test_current_usage_sums_costs() {
        let sut = store(100_000_000, 60_000_000);
        sut.set("key1", "objectToSave1".to_string(), None).unwrap();
        sut.set("key2", "objectToSave2".to_string(), None).unwrap();
        assert_eq!(sut.current_usage(), 52);
    }

    #[test]
    fn test_set_then_get() {
        let sut = store(100_000_000, 60_000_000);
        sut.set("key", "objectToSave".to_string(), Some(Expiry::Never))
            .unwrap();
        assert_eq!(sut.object("key").unwrap(), "objectToSave");
    }

    #[test]
    fn test_purge_removes_only_the_least_recently_used_entry() {
        let sut = store(50, 27);
        sut.set("key1", "objectToSave1".to_string(), None).unwrap();
        assert_eq!(sut.current_usage(), 26);

        sut.set("key2", "objectToSave2".to_string(), None).unwrap();

        assert_eq!(sut.current_usage(), 26);
        assert!(sut.get("key1").unwrap_err().is_not_found());
        assert_eq!(sut.object("key2").unwrap(), "objectToSave2");
    }

    #[test]
    fn test_purge_follows_access_order() {
        let sut = store(80, 55);
        sut.set("key1", "objectToSave1".to_string(), None).unwrap();
        sut.set("key2", "objectToSave2".to_string(), None).unwrap();
        sut.set("key3", "objectToSave3".to_string(), None).unwrap();
        sut.get("key1").unwrap();

        sut.set("key4", "objectToSave4".to_string(), None).unwrap();

        // 104 > 80: key2 then key3 go, leaving 52 <= 55
        assert_eq!(sut.current_usage(), 52);
        assert!(sut.contains("key1"));
        assert!(!sut.contains("key2"));
        assert!(!sut.contains("key3"));
        assert!(sut.contains("key4"));
    }

    #[test]
    fn test_usage_never_exceeds_capacity_after_set() {
        let sut = store(200, 120);
        for i in 0..200 {
            let value = "x".repeat(i % 37);
            sut.set(&format!("key{}", i % 23), value, None).unwrap();
            assert!(sut.current_usage() <= 200);
        }
    }

    #[test]
    fn test_replace_does_not_stack_cost() {
        let sut = store(50, 27);
        sut.set("key", "objectToSave1".to_string(), None).unwrap();
        sut.set("key", "objectToSave2".to_string(), None).unwrap();
        assert_eq!(sut.current_usage(), 26);
        assert_eq!(sut.object("key").unwrap(), "objectToSave2");
    }

    #[test]
    fn test_oversized_value_is_purged_immediately() {
        let sut = store(10, 5);
        sut.set("key", "objectToSave".to_string(), None).unwrap();
        assert_eq!(sut.current_usage(), 0);
        assert!(sut.get("key").is_err());
    }

    #[test]
    fn test_expired_at_now_is_invisible_without_sweep() {
        let sut = store(100_000_000, 60_000_000);
        sut.set("key", "objectToSave".to_string(), Some(Expiry::At(Utc::now())))
            .unwrap();

        assert!(sut.get("key").unwrap_err().is_not_found());
        assert_eq!(sut.current_usage(), 25);
    }

    #[test]
    fn test_remove_if_expired_is_noop_for_fresh_entry() {
        let sut = store(100_000_000, 60_000_000);
        sut.set("key", "objectToSave".to_string(), Some(Expiry::seconds(3600)))
            .unwrap();
        sut.remove_if_expired("key").unwrap();
        assert_eq!(sut.object("key").unwrap(), "objectToSave");
    }

    #[test]
    fn test_remove_if_expired_removes_stale_entry() {
        let sut = store(100_000_000, 60_000_000);
        sut.set("key", "objectToSave".to_string(), Some(Expiry::At(Utc::now())))
            .unwrap();
        sut.remove_if_expired("key").unwrap();
        assert_eq!(sut.current_usage(), 0);
    }

    #[test]
    fn test_remove_is_idempotent() {
        let sut = store(100_000_000, 60_000_000);
        sut.set("key", "objectToSave".to_string(), None).unwrap();
        sut.remove("key").unwrap();
        sut.remove("key").unwrap();
        assert!(sut.get("key").is_err());
    }

    #[test]
    fn test_remove_all() {
        let sut = store(100_000_000, 60_000_000);
        sut.set("key", "objectToSave".to_string(), None).unwrap();
        sut.remove_all().unwrap();
        assert!(sut.get("key").is_err());
        assert_eq!(sut.current_usage(), 0);
    }

    #[test]
    fn test_remove_expired_objects() {
        let sut = store(100_000_000, 60_000_000);
        let now = Utc::now();
        sut.set("key1", "objectToSave1".to_string(), Some(Expiry::At(now)))
            .unwrap();
        sut.set("key2", "objectToSave2".to_string(), Some(Expiry::At(now)))
            .unwrap();
        sut.remove_expired().unwrap();
        assert_eq!(sut.current_usage(), 0);
    }

    #[test]
    fn test_remove_since_uses_creation_or_access() {
        let sut = store(100_000_000, 60_000_000);
        sut.set("read", "objectToSave1".to_string(), None).unwrap();
        sut.set("untouched", "objectToSave2".to_string(), None).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(5));
        let cutoff = Utc::now();
        sut.get("read").unwrap();
        sut.set("new", "objectToSave3".to_string(), None).unwrap();

        sut.remove_since(cutoff).unwrap();

        assert_eq!(sut.current_usage(), 26);
        assert!(sut.contains("untouched"));
    }

    #[test]
    fn test_concurrent_sets_respect_capacity() {
        let sut = Arc::new(store(500, 300));
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let sut = Arc::clone(&sut);
                std::thread::spawn(move || {
                    for i in 0..100 {
                        let value = "y".repeat((t * 7 + i) % 60);
                        sut.set(&format!("{}-{}", t, i), value, None).unwrap();
                        assert!(sut.current_usage() <= 500);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert!(sut.current_usage() <= 500);
    }

    #[test]
    fn test_hybrid_falls_through_and_promotes() {
        let dir = tempdir().unwrap();
        let sut = hybrid(dir.path(), 50, 27);

        sut.set("key1", "objectToSave1".to_string(), None).unwrap();
        sut.set("key2", "objectToSave2".to_string(), None).unwrap();
        assert_eq!(sut.current_usage(), 26);
        assert_eq!(sut.disk_usage(), Some(52));

        // key1 was purged from memory but still lives on disk
        assert_eq!(sut.object("key1").unwrap(), "objectToSave1");
        assert_eq!(sut.current_usage(), 26);

        let stats = sut.stats();
        assert_eq!(stats.entries, 1);
        assert!(stats.misses >= 1);
    }

    #[test]
    fn test_hybrid_survives_restart() {
        let dir = tempdir().unwrap();
        {
            let sut = hybrid(dir.path(), 1000, 500);
            sut.set("key", "objectToSave".to_string(), None).unwrap();
        }

        let sut = hybrid(dir.path(), 1000, 500);
        assert_eq!(sut.current_usage(), 0);
        assert_eq!(sut.object("key").unwrap(), "objectToSave");
        assert_eq!(sut.current_usage(), 25);
    }

    #[test]
    fn test_hybrid_remove_clears_both_tiers() {
        let dir = tempdir().unwrap();
        let sut = hybrid(dir.path(), 1000, 500);
        sut.set("key", "objectToSave".to_string(), None).unwrap();

        sut.remove("key").unwrap();

        assert!(sut.get("key").is_err());
        assert_eq!(sut.disk_usage(), Some(0));
    }

    #[test]
    fn test_hybrid_remove_since_does_not_resurrect_from_disk() {
        let dir = tempdir().unwrap();
        let sut = hybrid(dir.path(), 1000, 500);
        sut.set("key", "objectToSave".to_string(), None).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(5));
        let cutoff = Utc::now();
        sut.get("key").unwrap();

        sut.remove_since(cutoff).unwrap();

        assert!(sut.get("key").unwrap_err().is_not_found());
        assert_eq!(sut.disk_usage(), Some(0));
    }

    #[test]
    fn test_hybrid_remove_since_reaches_entries_only_on_disk() {
        let dir = tempdir().unwrap();
        let sut = hybrid(dir.path(), 50, 27);
        sut.set("key1", "objectToSave1".to_string(), None).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(5));
        let cutoff = Utc::now();
        sut.get("key1").unwrap();
        // 52 > 50 purges key1 from memory; its disk copy remains
        sut.set("key2", "objectToSave2".to_string(), None).unwrap();
        assert_eq!(sut.current_usage(), 26);
        assert_eq!(sut.disk_usage(), Some(52));

        sut.remove_since(cutoff).unwrap();

        assert!(sut.get("key1").unwrap_err().is_not_found());
        assert!(sut.get("key2").unwrap_err().is_not_found());
        assert_eq!(sut.disk_usage(), Some(0));
    }

    #[test]
    fn test_hybrid_remove_since_reaches_promoted_then_purged_entries() {
        let dir = tempdir().unwrap();
        let sut = hybrid(dir.path(), 50, 27);
        sut.set("key1", "objectToSave1".to_string(), None).unwrap();
        sut.set("key2", "objectToSave2".to_string(), None).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(5));
        let cutoff = Utc::now();
        // Promoted from disk after the cutoff, then purged from memory again
        sut.get("key1").unwrap();
        sut.set("key3", "objectToSave3".to_string(), None).unwrap();

        sut.remove_since(cutoff).unwrap();

        assert!(sut.get("key1").unwrap_err().is_not_found());
        assert!(sut.get("key3").unwrap_err().is_not_found());
        assert_eq!(sut.object("key2").unwrap(), "objectToSave2");
        assert_eq!(sut.disk_usage(), Some(26));
    }

    #[test]
    fn test_hybrid_remove_since_keeps_older_entries() {
        let dir = tempdir().unwrap();
        let sut = hybrid(dir.path(), 1000, 500);
        sut.set("old", "objectToSave1".to_string(), None).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(5));
        let cutoff = Utc::now();
        sut.set("new", "objectToSave2".to_string(), None).unwrap();

        sut.remove_since(cutoff).unwrap();

        assert_eq!(sut.object("old").unwrap(), "objectToSave1");
        assert!(sut.get("new").unwrap_err().is_not_found());
        assert_eq!(sut.disk_usage(), Some(26));
    }

    #[test]
    fn test_hybrid_expiry_applies_to_disk_copy() {
        let dir = tempdir().unwrap();
        let sut = hybrid(dir.path(), 1000, 500);
        let past = Utc::now() - Duration::seconds(1);
        sut.set("key", "objectToSave".to_string(), Some(Expiry::At(past)))
            .unwrap();

        assert!(sut.get("key").unwrap_err().is_not_found());
        sut.remove_expired().unwrap();
        assert_eq!(sut.current_usage(), 0);
        assert_eq!(sut.disk_usage(), Some(0));
    }
}
