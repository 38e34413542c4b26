//! Storehouse sweeper - reclaims expired entries from an on-disk cache
//!
//! Opens a named response cache directory, reports its usage and removes
//! expired entries, either once or on a fixed interval.

mod error;
mod types;

use crate::error::{Result, SweepError};
use crate::types::SweepConfig;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use storehouse::{transformer, CacheStats, Expiry, OnDiskConfig, OnDiskStore, Storehouse};
use tracing::{error, info};
use tracing_subscriber::{prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    let env_filter = EnvFilter::from_default_env()
        .add_directive("storehouse_sweep=info".parse()?)
        .add_directive("storehouse=info".parse()?);

    // Use JSON format for GCP Cloud Logging when LOG_FORMAT=json
    if std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false)
    {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_stackdriver::layer())
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    };

    info!("Starting storehouse sweeper...");

    let config = load_config()?;
    info!("Cache dir: {:?}", config.cache_dir);
    info!("Cache name: {}", config.cache_name);
    info!(
        "Max cache size: {} MB",
        config.max_cache_size / (1024 * 1024)
    );
    info!("Sweep interval: {} seconds", config.sweep_interval_secs);

    let store = Arc::new(open_store(&config).await?);

    if config.sweep_interval_secs == 0 {
        sweep_once(&store).await?;
        return Ok(());
    }

    let mut ticker = tokio::time::interval(Duration::from_secs(config.sweep_interval_secs));
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(e) = sweep_once(&store).await {
                    error!(error = %e, "Sweep failed");
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down sweeper");
                return Ok(());
            }
        }
    }
}

fn load_config() -> Result<SweepConfig> {
    config_from(|name| std::env::var(name).ok())
}

fn config_from(lookup: impl Fn(&str) -> Option<String>) -> Result<SweepConfig> {
    let defaults = SweepConfig::default();
    let number = |name: &str, default: u64| {
        lookup(name)
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(default)
    };

    let cache_name = lookup("CACHE_NAME").unwrap_or(defaults.cache_name);
    if cache_name.trim().is_empty() {
        return Err(SweepError::Config("CACHE_NAME must not be empty".to_string()));
    }

    Ok(SweepConfig {
        cache_dir: lookup("CACHE_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.cache_dir),
        cache_name,
        max_cache_size: number("MAX_CACHE_SIZE", defaults.max_cache_size),
        cache_ttl_secs: number("CACHE_TTL_SECS", defaults.cache_ttl_secs),
        sweep_interval_secs: number("SWEEP_INTERVAL_SECS", defaults.sweep_interval_secs),
    })
}

fn default_expiry(ttl_secs: u64) -> Expiry {
    if ttl_secs == 0 {
        return Expiry::Never;
    }
    Expiry::seconds(i64::try_from(ttl_secs).unwrap_or(i64::MAX))
}

async fn open_store(config: &SweepConfig) -> Result<OnDiskStore<Vec<u8>>> {
    let root = config.cache_dir.clone();
    let disk_config = OnDiskConfig::new(config.cache_name.clone(), config.max_cache_size)
        .with_default_expiry(default_expiry(config.cache_ttl_secs));

    let store = tokio::task::spawn_blocking(move || {
        OnDiskStore::open(root, disk_config, transformer::bytes())
    })
    .await??;
    Ok(store)
}

/// Remove expired entries and report usage before and after
async fn sweep_once(store: &Arc<OnDiskStore<Vec<u8>>>) -> Result<CacheStats> {
    let store = Arc::clone(store);
    let (before, after) = tokio::task::spawn_blocking(move || {
        let before = store.stats();
        store.remove_expired()?;
        Ok::<_, SweepError>((before, store.stats()))
    })
    .await??;

    info!(
        entries_before = before.entries,
        entries_after = after.entries,
        usage_before = before.total_size,
        usage_after = after.total_size,
        capacity = after.capacity,
        "Sweep complete"
    );
    Ok(after)
}
