//! Per-tier configuration
//!
//! Each configuration is immutable once built. Size limits are in bytes of
//! encoded payload; a limit of `0` means the dimension is unbounded.

use crate::error::{Result, StorehouseError};
use crate::expiry::Expiry;
use std::path::Component;
use std::path::Path;

/// Configuration for [`InMemoryStore`](crate::InMemoryStore)
#[derive(Debug, Clone, Default)]
pub struct InMemoryConfig {
    pub default_expiry: Expiry,
    /// Maximum number of entries, `0` for unlimited
    pub count_limit: usize,
    /// Maximum total cost, `0` for unlimited
    pub total_cost_limit: u64,
}

/// Filesystem permissions applied to files written by the disk tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProtectionLevel {
    /// Leave permissions to the process umask
    #[default]
    Default,
    /// Files `0o600`, store directory `0o700`
    OwnerOnly,
    /// Explicit unix mode for payload and sidecar files
    Mode(u32),
}

impl ProtectionLevel {
    pub fn file_mode(&self) -> Option<u32> {
        match self {
            ProtectionLevel::Default => None,
            ProtectionLevel::OwnerOnly => Some(0o600),
            ProtectionLevel::Mode(mode) => Some(*mode),
        }
    }

    pub fn dir_mode(&self) -> Option<u32> {
        match self {
            ProtectionLevel::OwnerOnly => Some(0o700),
            _ => None,
        }
    }
}

/// Configuration for [`OnDiskStore`](crate::OnDiskStore)
#[derive(Debug, Clone)]
pub struct OnDiskConfig {
    /// Directory name of this cache under the root passed to `open`
    pub name: String,
    pub default_expiry: Expiry,
    pub max_size_bytes: u64,
    pub protection: ProtectionLevel,
}

impl OnDiskConfig {
    pub fn new(name: impl Into<String>, max_size_bytes: u64) -> Self {
        Self {
            name: name.into(),
            max_size_bytes,
            ..Self::default()
        }
    }

    pub fn with_default_expiry(mut self, expiry: Expiry) -> Self {
        self.default_expiry = expiry;
        self
    }

    pub fn with_protection(mut self, protection: ProtectionLevel) -> Self {
        self.protection = protection;
        self
    }

    /// Usage the disk tier purges down to once it exceeds `max_size_bytes`
    pub fn preferred_size_after_purge(&self) -> u64 {
        self.max_size_bytes / 2
    }

    pub(crate) fn validate(&self) -> Result<()> {
        let mut components = Path::new(&self.name).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(_)), None) => Ok(()),
            _ => Err(StorehouseError::Config(format!(
                "cache name must be a single path component, got {:?}",
                self.name
            ))),
        }
    }
}

impl Default for OnDiskConfig {
    fn default() -> Self {
        Self {
            name: "storehouse".to_string(),
            default_expiry: Expiry::Never,
            max_size_bytes: 100 * 1024 * 1024, // 100MB
            protection: ProtectionLevel::Default,
        }
    }
}

/// Configuration for [`AutoPurgingStore`](crate::AutoPurgingStore)
///
/// Built through [`AutoPurgingConfig::new`], which enforces
/// `preferred_usage_after_purge <= memory_capacity`.
#[derive(Debug, Clone)]
pub struct AutoPurgingConfig {
    default_expiry: Expiry,
    memory_capacity: u64,
    preferred_usage_after_purge: u64,
}

impl AutoPurgingConfig {
    pub fn new(
        default_expiry: Expiry,
        memory_capacity: u64,
        preferred_usage_after_purge: u64,
    ) -> Result<Self> {
        if preferred_usage_after_purge > memory_capacity {
            return Err(StorehouseError::Config(format!(
                "preferred usage after purge ({}) exceeds memory capacity ({})",
                preferred_usage_after_purge, memory_capacity
            )));
        }

        Ok(Self {
            default_expiry,
            memory_capacity,
            preferred_usage_after_purge,
        })
    }

    pub fn default_expiry(&self) -> Expiry {
        self.default_expiry
    }

    pub fn memory_capacity(&self) -> u64 {
        self.memory_capacity
    }

    pub fn preferred_usage_after_purge(&self) -> u64 {
        self.preferred_usage_after_purge
    }
}

impl Default for AutoPurgingConfig {
    fn default() -> Self {
        Self {
            default_expiry: Expiry::Never,
            memory_capacity: 100 * 1024 * 1024,            // 100MB
            preferred_usage_after_purge: 60 * 1024 * 1024, // 60MB
        }
    }
}
