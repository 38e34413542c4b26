//! Persistent tier: one payload file per key plus a JSON metadata sidecar
//!
//! Layout under `<root>/<name>/`:
//! - `<sha256(key)>`       transformer-encoded payload
//! - `<sha256(key)>.meta`  [`EntryMeta`] as JSON
//! - `*.tmp`               in-flight writes, renamed into place when complete
//!
//! The in-process index mirrors the files written through this store and is
//! rebuilt from the sidecars when the store is reopened.

use crate::config::{OnDiskConfig, ProtectionLevel};
use crate::entry::{CacheEntry, CacheStats, EntryMeta};
use crate::error::{Result, StorehouseError};
use crate::expiry::Expiry;
use crate::index::LruIndex;
use crate::storage::Storehouse;
use crate::transformer::SharedTransformer;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{self, ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const META_EXTENSION: &str = "meta";
const TEMP_EXTENSION: &str = "tmp";

/// File name for a key: lowercase hex SHA-256
pub fn file_name_for(key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    hex::encode(hasher.finalize())
}

fn is_payload_name(name: &str) -> bool {
    name.len() == 64 && name.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".");
    name.push(TEMP_EXTENSION);
    PathBuf::from(name)
}

fn remove_if_present(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() != ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

#[cfg(unix)]
fn apply_mode(path: &Path, mode: Option<u32>) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    match mode {
        Some(mode) => fs::set_permissions(path, fs::Permissions::from_mode(mode)),
        None => Ok(()),
    }
}

#[cfg(not(unix))]
fn apply_mode(_path: &Path, _mode: Option<u32>) -> io::Result<()> {
    Ok(())
}

struct DiskState {
    index: LruIndex<EntryMeta>,
    hits: u64,
    misses: u64,
}

/// Disk-backed store bounded by the total size of its payload files
pub struct OnDiskStore<T> {
    config: OnDiskConfig,
    directory: PathBuf,
    transformer: SharedTransformer<T>,
    state: Mutex<DiskState>,
}

impl<T> OnDiskStore<T> {
    /// Open (or create) the cache directory `root/<config.name>` and recover
    /// any entries persisted by a previous instance
    pub fn open(
        root: impl AsRef<Path>,
        config: OnDiskConfig,
        transformer: SharedTransformer<T>,
    ) -> Result<Self> {
        config.validate()?;
        let directory = root.as_ref().join(&config.name);
        fs::create_dir_all(&directory)?;
        apply_mode(&directory, config.protection.dir_mode())?;

        let index = recover_index(&directory)?;
        let store = Self {
            config,
            directory,
            transformer,
            state: Mutex::new(DiskState {
                index,
                hits: 0,
                misses: 0,
            }),
        };

        {
            let mut state = store.state.lock();
            store.enforce_capacity(&mut state);
            info!(
                directory = ?store.directory,
                entries = state.index.len(),
                usage = state.index.total_cost(),
                max_size = store.config.max_size_bytes,
                "Disk cache opened"
            );
        }

        Ok(store)
    }

    /// Cache name, also the directory name under the root
    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn config(&self) -> &OnDiskConfig {
        &self.config
    }

    /// Number of tracked entries, expired ones included
    pub fn len(&self) -> usize {
        self.state.lock().index.len()
    }

    pub(crate) fn transformer(&self) -> SharedTransformer<T> {
        self.transformer.clone()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn payload_path(&self, key: &str) -> PathBuf {
        self.directory.join(file_name_for(key))
    }

    fn meta_path(&self, key: &str) -> PathBuf {
        self.directory
            .join(format!("{}.{}", file_name_for(key), META_EXTENSION))
    }

    fn protection(&self) -> ProtectionLevel {
        self.config.protection
    }

    /// Write to `<path>.tmp`, fsync, then rename over `path`
    fn write_atomically(&self, path: &Path, bytes: &[u8]) -> io::Result<()> {
        let tmp = temp_path(path);
        let result = self
            .write_file(&tmp, bytes)
            .and_then(|_| fs::rename(&tmp, path));
        if result.is_err() {
            let _ = fs::remove_file(&tmp);
        }
        result
    }

    fn write_file(&self, path: &Path, bytes: &[u8]) -> io::Result<()> {
        let mut file = File::create(path)?;
        apply_mode(path, self.protection().file_mode())?;
        file.write_all(bytes)?;
        file.sync_all()
    }

    fn delete_files(&self, key: &str) -> io::Result<()> {
        remove_if_present(&self.payload_path(key))?;
        remove_if_present(&self.meta_path(key))
    }

    /// Delete an entry's files and untrack it. On failure the entry stays
    /// tracked so the index keeps matching the directory.
    fn discard(&self, state: &mut DiskState, key: &str) -> bool {
        match self.delete_files(key) {
            Ok(()) => {
                state.index.remove(key);
                true
            }
            Err(e) => {
                warn!(key, error = %e, "Failed to delete cache files, keeping entry");
                false
            }
        }
    }

    /// Purge least recently used files down to half of `max_size_bytes`
    /// once usage exceeds it. Files that cannot be deleted are skipped.
    fn enforce_capacity(&self, state: &mut DiskState) {
        let max_size = self.config.max_size_bytes;
        if max_size == 0 || state.index.total_cost() <= max_size {
            return;
        }

        let target = self.config.preferred_size_after_purge();
        let mut evicted = 0;
        for key in state.index.keys_where(|_| true) {
            if state.index.total_cost() <= target {
                break;
            }
            if self.discard(state, &key) {
                debug!(key = %key, "Evicted least recently used file");
                evicted += 1;
            }
        }
        info!(
            evicted,
            usage = state.index.total_cost(),
            max_size,
            "Purged disk cache"
        );
    }

    /// Remove every entry whose metadata matches `predicate`, returning the
    /// number of entries removed
    pub(crate) fn remove_where(&self, predicate: impl Fn(&EntryMeta) -> bool) -> usize {
        let mut state = self.state.lock();
        let keys = state.index.keys_where(predicate);
        keys.iter()
            .filter(|key| self.discard(&mut state, key))
            .count()
    }

    /// Refresh recency for an entry served by a tier in front of this one
    pub(crate) fn record_access(&self, key: &str, at: DateTime<Utc>) {
        let mut state = self.state.lock();
        if let Some(meta) = state.index.touch(key) {
            meta.last_accessed_at = meta.last_accessed_at.max(at);
        }
    }

    /// Persist already-encoded bytes. The index is updated only after both
    /// the payload and its sidecar have been renamed into place.
    pub(crate) fn put_encoded(
        &self,
        key: &str,
        bytes: &[u8],
        expires_at: Option<DateTime<Utc>>,
        created_at: DateTime<Utc>,
    ) -> Result<()> {
        let meta = EntryMeta {
            key: key.to_string(),
            cost: bytes.len() as u64,
            expires_at,
            created_at,
            last_accessed_at: created_at,
        };
        let meta_bytes =
            serde_json::to_vec(&meta).map_err(|e| StorehouseError::Encode(e.to_string()))?;

        let mut state = self.state.lock();
        let payload_path = self.payload_path(key);
        let meta_path = self.meta_path(key);

        self.write_atomically(&payload_path, bytes)?;
        if let Err(e) = self.write_atomically(&meta_path, &meta_bytes) {
            // The payload no longer matches any sidecar; drop the entry entirely
            let _ = remove_if_present(&payload_path);
            let _ = remove_if_present(&meta_path);
            state.index.remove(key);
            return Err(e.into());
        }

        state.index.insert(key.to_string(), meta);
        debug!(key, size = bytes.len(), "Wrote cache file");

        self.enforce_capacity(&mut state);
        Ok(())
    }
}

/// Rebuild the index from the sidecars in `directory`, deleting temp files,
/// unreadable sidecars and payloads that have no matching sidecar
fn recover_index(directory: &Path) -> Result<LruIndex<EntryMeta>> {
    let mut sidecars = Vec::new();
    let mut payloads = HashSet::new();

    for dir_entry in fs::read_dir(directory)? {
        let dir_entry = dir_entry?;
        if !dir_entry.file_type()?.is_file() {
            continue;
        }
        let path = dir_entry.path();
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(TEMP_EXTENSION) => {
                debug!(path = ?path, "Removing interrupted write");
                let _ = remove_if_present(&path);
            }
            Some(META_EXTENSION) => sidecars.push(path),
            None => {
                if let Some(name) = path.file_name().and_then(|name| name.to_str()) {
                    if is_payload_name(name) {
                        payloads.insert(name.to_string());
                    }
                }
            }
            Some(_) => {}
        }
    }

    let mut recovered = Vec::new();
    for sidecar in sidecars {
        let stem = match sidecar.file_stem().and_then(|stem| stem.to_str()) {
            Some(stem) => stem.to_string(),
            None => continue,
        };
        let payload = directory.join(&stem);

        let meta = fs::read(&sidecar)
            .ok()
            .and_then(|bytes| serde_json::from_slice::<EntryMeta>(&bytes).ok())
            .filter(|meta| file_name_for(&meta.key) == stem && payloads.contains(&stem));
        let size = meta
            .as_ref()
            .and_then(|_| fs::metadata(&payload).ok())
            .map(|metadata| metadata.len());

        payloads.remove(&stem);
        match (meta, size) {
            (Some(mut meta), Some(size)) => {
                meta.cost = size;
                recovered.push(meta);
            }
            _ => {
                warn!(path = ?sidecar, "Discarding unreadable cache entry");
                let _ = remove_if_present(&sidecar);
                let _ = remove_if_present(&payload);
            }
        }
    }

    for orphan in payloads {
        warn!(file = %orphan, "Discarding cache file without metadata");
        let _ = remove_if_present(&directory.join(orphan));
    }

    recovered.sort_by_key(|meta| meta.last_accessed_at);
    let mut index = LruIndex::new();
    for meta in recovered {
        index.insert(meta.key.clone(), meta);
    }
    Ok(index)
}

impl<T: Send> Storehouse<T> for OnDiskStore<T> {
    fn set(&self, key: &str, value: T, expiry: Option<Expiry>) -> Result<()> {
        let bytes = self.transformer.encode(&value)?;
        let now = Utc::now();
        let expires_at = expiry.unwrap_or(self.config.default_expiry).resolve(now);
        self.put_encoded(key, &bytes, expires_at, now)
    }

    fn get(&self, key: &str) -> Result<CacheEntry<T>> {
        let now = Utc::now();
        let mut state = self.state.lock();

        let live = state
            .index
            .get(key)
            .is_some_and(|meta| !meta.is_expired_at(now));
        if !live {
            state.misses += 1;
            debug!(key, "Disk miss");
            return Err(StorehouseError::NotFound);
        }

        let bytes = match fs::read(self.payload_path(key)) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                warn!(key, "Cache file disappeared, removing entry");
                self.discard(&mut state, key);
                state.misses += 1;
                return Err(StorehouseError::NotFound);
            }
            Err(e) => return Err(e.into()),
        };
        let value = self.transformer.decode(&bytes)?;

        state.hits += 1;
        let meta = state.index.touch(key).ok_or(StorehouseError::NotFound)?;
        meta.last_accessed_at = now;
        debug!(key, "Disk hit");
        Ok(meta.clone().into_entry(value))
    }

    fn remove(&self, key: &str) -> Result<()> {
        let mut state = self.state.lock();
        self.delete_files(key)?;
        state.index.remove(key);
        Ok(())
    }

    fn remove_all(&self) -> Result<()> {
        let mut state = self.state.lock();
        let mut first_error = None;
        for key in state.index.keys_where(|_| true) {
            match self.delete_files(&key) {
                Ok(()) => {
                    state.index.remove(&key);
                }
                Err(e) => {
                    warn!(key = %key, error = %e, "Failed to delete cache files");
                    first_error.get_or_insert(e);
                }
            }
        }
        match first_error {
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    }

    fn remove_if_expired(&self, key: &str) -> Result<()> {
        let now = Utc::now();
        let mut state = self.state.lock();
        let expired = state
            .index
            .get(key)
            .is_some_and(|meta| meta.is_expired_at(now));
        if expired {
            self.delete_files(key)?;
            state.index.remove(key);
        }
        Ok(())
    }

    fn remove_expired(&self) -> Result<()> {
        let now = Utc::now();
        let count = self.remove_where(|meta| meta.is_expired_at(now));
        debug!(count, "Swept expired entries from disk");
        Ok(())
    }

    fn remove_since(&self, since: DateTime<Utc>) -> Result<()> {
        let count = self.remove_where(|meta| meta.created_at >= since);
        debug!(count, "Removed entries created since cutoff from disk");
        Ok(())
    }

    fn current_usage(&self) -> u64 {
        self.state.lock().index.total_cost()
    }

    fn capacity(&self) -> u64 {
        self.config.max_size_bytes
    }

    fn stats(&self) -> CacheStats {
        let state = self.state.lock();
        CacheStats {
            entries: state.index.len(),
            total_size: state.index.total_cost(),
            capacity: self.config.max_size_bytes,
            hits: state.hits,
            misses: state.misses,
        }
    }
}
