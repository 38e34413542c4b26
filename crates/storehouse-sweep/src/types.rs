//! Configuration for the sweeper

use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq)]
pub struct SweepConfig {
    pub cache_dir: PathBuf,
    pub cache_name: String,
    pub max_cache_size: u64,
    pub cache_ttl_secs: u64,
    /// `0` sweeps once and exits
    pub sweep_interval_secs: u64,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            cache_dir: PathBuf::from("./cache"),
            cache_name: "responses".to_string(),
            max_cache_size: 1024 * 1024 * 1024, // 1GB
            cache_ttl_secs: 24 * 60 * 60,       // 24 hours
            sweep_interval_secs: 5 * 60,
        }
    }
}
