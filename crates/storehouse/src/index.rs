//! Recency-ordered key index shared by every tier
//!
//! Wraps an unbounded [`LruCache`] for the recency order and keeps a running
//! cost total on every mutation. Capacity decisions are made by the tiers, so
//! the underlying cache never evicts on its own.

use lru::LruCache;

/// A record that is charged against a capacity budget
pub(crate) trait Weighted {
    fn cost(&self) -> u64;
}

pub(crate) struct LruIndex<V> {
    entries: LruCache<String, V>,
    total_cost: u64,
}

impl<V: Weighted> LruIndex<V> {
    pub(crate) fn new() -> Self {
        Self {
            entries: LruCache::unbounded(),
            total_cost: 0,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn total_cost(&self) -> u64 {
        self.total_cost
    }

    /// Look up without refreshing recency
    pub(crate) fn get(&self, key: &str) -> Option<&V> {
        self.entries.peek(key)
    }

    /// Insert as most recently used, replacing (not stacking) any previous record
    pub(crate) fn insert(&mut self, key: String, record: V) -> Option<V> {
        self.total_cost += record.cost();
        let previous = self.entries.put(key, record);
        if let Some(old) = &previous {
            self.total_cost -= old.cost();
        }
        previous
    }

    /// Mark as most recently used
    pub(crate) fn touch(&mut self, key: &str) -> Option<&mut V> {
        self.entries.get_mut(key)
    }

    pub(crate) fn remove(&mut self, key: &str) -> Option<V> {
        let record = self.entries.pop(key)?;
        self.total_cost -= record.cost();
        Some(record)
    }

    pub(crate) fn pop_lru(&mut self) -> Option<(String, V)> {
        let (key, record) = self.entries.pop_lru()?;
        self.total_cost -= record.cost();
        Some((key, record))
    }

    /// Evict least recently used records until the total is at or below `target`
    pub(crate) fn purge_to(&mut self, target: u64) -> Vec<(String, V)> {
        let mut evicted = Vec::new();
        while self.total_cost > target {
            match self.pop_lru() {
                Some(victim) => evicted.push(victim),
                None => break,
            }
        }
        evicted
    }

    /// Keys whose record matches `predicate`, least recently used first
    pub(crate) fn keys_where(&self, predicate: impl Fn(&V) -> bool) -> Vec<String> {
        self.entries
            .iter()
            .rev()
            .filter(|(_, record)| predicate(record))
            .map(|(key, _)| key.clone())
            .collect()
    }

    pub(crate) fn drain(&mut self) -> Vec<(String, V)> {
        let mut drained = Vec::with_capacity(self.entries.len());
        while let Some(entry) = self.entries.pop_lru() {
            drained.push(entry);
        }
        self.total_cost = 0;
        drained
    }
}
