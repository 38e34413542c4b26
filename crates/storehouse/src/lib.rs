//! Storehouse: capacity-bounded object cache for fetched response payloads
//!
//! Three tiers share one operation surface ([`Storehouse`]):
//! - [`InMemoryStore`] bounded by entry count and total cost
//! - [`OnDiskStore`] persisting one file per key, surviving restarts
//! - [`AutoPurgingStore`] with a hard memory capacity and a two-threshold LRU
//!   purge, optionally fronting an [`OnDiskStore`]
//!
//! Values are priced and persisted through a [`Transformer`] supplied at
//! construction. [`ResponseCache`] adapts any tier for async download clients.

mod auto_purging;
mod config;
mod disk;
mod entry;
mod error;
mod expiry;
mod index;
mod memory;
mod response;
mod storage;
pub mod transformer;

pub use auto_purging::AutoPurgingStore;
pub use config::{AutoPurgingConfig, InMemoryConfig, OnDiskConfig, ProtectionLevel};
pub use disk::{file_name_for, OnDiskStore};
pub use entry::{CacheEntry, CacheStats, EntryMeta};
pub use error::{Result, StorehouseError};
pub use expiry::Expiry;
pub use memory::InMemoryStore;
pub use response::{canonical_key, CachedResponse, ResponseCache, ResponseTransformer};
pub use storage::Storehouse;
pub use transformer::{
    BytesTransformer, JsonTransformer, SharedTransformer, StringTransformer, Transformer,
};
