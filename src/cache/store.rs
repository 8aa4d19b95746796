//! Atomic, file-backed cache store.
//!
//! All cache types share these primitives:
//!
//! * **Writes** go to a uniquely-named temp file and are renamed onto the
//!   target, so a reader can never observe a partially written entry. A
//!   failed write cleans up after itself and reports `false` — it must never
//!   abort the caller's primary workflow.
//! * **Reads** retry briefly on transient races (a file mid-rename), then
//!   degrade to a miss. Malformed or wrong-version entries are also misses,
//!   never errors; they stay on disk until the next successful save
//!   overwrites them.
//! * **Validity** combines an age window with a source-modification check:
//!   an entry written before the source's last modification is stale.
//! * A single **enabled gate** from configuration turns every read into a
//!   miss and every write into a no-op, with no special-casing elsewhere.

use std::fs;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::RwLock;
use std::thread;
use std::time::{Duration, SystemTime};

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::cache::envelope::CacheEnvelope;
use crate::config::{CacheConfig, FALLBACK_DIR_NAME};

/// Attempts for a retried read before reporting a miss.
const READ_RETRIES: u32 = 3;

/// Base delay for read retries; doubles per attempt.
const READ_RETRY_BASE_DELAY: Duration = Duration::from_millis(10);

struct StoreState {
    enabled: bool,
    directory: PathBuf,
    expiration_days: u32,
}

/// Shared store underlying every cache type.
pub struct CacheStore {
    state: RwLock<StoreState>,
}

impl CacheStore {
    /// Build a store from a configuration snapshot.
    ///
    /// Directory setup is explicit and two-stage: if the configured
    /// directory cannot be created, the store falls back to a directory
    /// under the process temp dir; if that also fails, the store disables
    /// itself and the host application carries on without caching.
    pub fn new(config: &CacheConfig) -> Self {
        let mut state = StoreState {
            enabled: config.enabled,
            directory: config.directory(),
            expiration_days: config.expiration_days,
        };

        if state.enabled {
            match setup_directory(&state.directory) {
                Some(dir) => state.directory = dir,
                None => state.enabled = false,
            }
        }

        Self {
            state: RwLock::new(state),
        }
    }

    /// Whether caching is currently enabled.
    #[must_use]
    pub fn enabled(&self) -> bool {
        self.state.read().unwrap().enabled
    }

    /// The directory entries are stored in.
    #[must_use]
    pub fn directory(&self) -> PathBuf {
        self.state.read().unwrap().directory.clone()
    }

    /// Apply a fresh configuration snapshot.
    ///
    /// Can flip enabled/disabled and migrate to a new directory at runtime.
    /// Existing entries are not moved; they age out in the old location.
    pub fn reconfigure(&self, config: &CacheConfig) {
        let mut state = self.state.write().unwrap();

        let was_enabled = state.enabled;
        state.enabled = config.enabled;
        state.expiration_days = config.expiration_days;

        if was_enabled && !state.enabled {
            log::info!("Caching has been disabled");
        } else if !was_enabled && state.enabled {
            log::info!("Caching has been enabled");
        }

        if state.enabled {
            let requested = config.directory();
            if requested != state.directory {
                log::info!(
                    "Cache directory changing from {} to {}",
                    state.directory.display(),
                    requested.display()
                );
                match setup_directory(&requested) {
                    Some(dir) => state.directory = dir,
                    None => state.enabled = false,
                }
            } else if setup_directory(&state.directory).is_none() {
                state.enabled = false;
            }
        }
    }

    /// Absolute path for a cache file name.
    #[must_use]
    pub fn file_path(&self, key: &str) -> PathBuf {
        self.directory().join(key)
    }

    /// Write an envelope under the given file name.
    ///
    /// Returns false when caching is disabled or on any I/O failure.
    pub fn write<T: Serialize>(&self, key: &str, envelope: &CacheEnvelope<T>) -> bool {
        if !self.enabled() {
            return false;
        }

        let json = match serde_json::to_string_pretty(envelope) {
            Ok(json) => json,
            Err(e) => {
                log::warn!("Failed to serialize cache entry {}: {}", key, e);
                return false;
            }
        };

        let target = self.file_path(key);
        match write_atomic(&target, &json) {
            Ok(()) => true,
            Err(e) => {
                log::warn!("Failed to write cache file {}: {}", target.display(), e);
                false
            }
        }
    }

    /// Read an envelope by file name, checking validity against `source`.
    pub fn read<T: DeserializeOwned>(&self, key: &str, source: &Path) -> Option<CacheEnvelope<T>> {
        if !self.enabled() {
            return None;
        }
        let path = self.file_path(key);
        self.read_file(&path, source)
    }

    /// Read an envelope from an already-resolved cache file path.
    ///
    /// Used when enumerating entries by naming convention.
    pub fn read_file<T: DeserializeOwned>(
        &self,
        path: &Path,
        source: &Path,
    ) -> Option<CacheEnvelope<T>> {
        if !self.enabled() || !self.is_valid(path, source) {
            return None;
        }

        let raw = retry_with_backoff(READ_RETRIES, READ_RETRY_BASE_DELAY, || {
            fs::read_to_string(path).ok()
        })?;

        let envelope = CacheEnvelope::from_json(&raw);
        if envelope.is_none() {
            log::debug!(
                "Cache file {} is malformed or wrong version, treating as miss",
                path.display()
            );
        }
        envelope
    }

    /// Delete a single cache file. Returns true if a file was removed.
    pub fn remove(&self, key: &str) -> bool {
        if !self.enabled() {
            return false;
        }
        let path = self.file_path(key);
        match fs::remove_file(&path) {
            Ok(()) => true,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
            Err(e) => {
                log::debug!("Failed to remove cache file {}: {}", path.display(), e);
                false
            }
        }
    }

    /// Enumerate all cache entry files (`*.json`) in the cache directory.
    ///
    /// Temp files from in-flight writes never match and are excluded.
    #[must_use]
    pub fn list(&self) -> Vec<PathBuf> {
        let dir = self.directory();
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(_) => return Vec::new(),
        };

        entries
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| {
                path.file_name()
                    .and_then(|name| name.to_str())
                    .is_some_and(|name| name.ends_with(".json"))
            })
            .collect()
    }

    /// Check whether a cache file is still usable for `source`.
    ///
    /// Invalid when the file is missing, older than the expiration window,
    /// or older than the source's last modification. Stale entries are left
    /// in place to be overwritten by the next save.
    pub fn is_valid(&self, cache_file: &Path, source: &Path) -> bool {
        let cache_mtime = match fs::metadata(cache_file).and_then(|m| m.modified()) {
            Ok(mtime) => mtime,
            Err(_) => return false,
        };

        let expiration_days = self.state.read().unwrap().expiration_days;
        let max_age = Duration::from_secs(u64::from(expiration_days) * 24 * 3600);
        let age = SystemTime::now()
            .duration_since(cache_mtime)
            .unwrap_or_default();
        if age > max_age {
            log::debug!(
                "Cache file {} expired ({} days old)",
                cache_file.display(),
                age.as_secs() / (24 * 3600)
            );
            return false;
        }

        if let Ok(source_mtime) = fs::metadata(source).and_then(|m| m.modified()) {
            if source_mtime > cache_mtime {
                log::debug!(
                    "Cache file {} is stale: source modified after it was written",
                    cache_file.display()
                );
                return false;
            }
        }

        true
    }
}

/// Create `preferred`, falling back to a directory under the process temp
/// dir. Returns the directory that is actually usable, or `None` when
/// neither can be created.
pub(crate) fn setup_directory(preferred: &Path) -> Option<PathBuf> {
    match fs::create_dir_all(preferred) {
        Ok(()) => {
            log::debug!("Cache directory: {}", preferred.display());
            Some(preferred.to_path_buf())
        }
        Err(e) => {
            log::warn!(
                "Failed to create cache directory {}: {}",
                preferred.display(),
                e
            );
            let fallback = std::env::temp_dir().join(FALLBACK_DIR_NAME);
            match fs::create_dir_all(&fallback) {
                Ok(()) => {
                    log::info!("Using fallback cache directory: {}", fallback.display());
                    Some(fallback)
                }
                Err(e) => {
                    log::error!(
                        "Failed to create fallback cache directory {}: {}",
                        fallback.display(),
                        e
                    );
                    None
                }
            }
        }
    }
}

/// Run `op` up to `attempts` times with exponential backoff, returning the
/// first `Some`.
pub(crate) fn retry_with_backoff<T>(
    attempts: u32,
    base_delay: Duration,
    mut op: impl FnMut() -> Option<T>,
) -> Option<T> {
    for attempt in 0..attempts {
        if let Some(value) = op() {
            return Some(value);
        }
        if attempt + 1 < attempts {
            thread::sleep(base_delay * 2u32.pow(attempt));
        }
    }
    None
}

/// Write `contents` to `target` via a uniquely-named temp file and an atomic
/// rename. The temp name embeds pid, thread id and a random token so
/// concurrent writers aiming at the same logical key cannot collide.
fn write_atomic(target: &Path, contents: &str) -> std::io::Result<()> {
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent)?;
    }

    let file_name = target
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("entry.json");
    let thread_id: String = format!("{:?}", thread::current().id())
        .chars()
        .filter(char::is_ascii_digit)
        .collect();
    let mut token = uuid::Uuid::new_v4().simple().to_string();
    token.truncate(8);

    let temp = target.with_file_name(format!(
        "{}.tmp.{}.{}.{}",
        file_name,
        process::id(),
        thread_id,
        token
    ));

    let result = fs::write(&temp, contents).and_then(|()| fs::rename(&temp, target));
    if result.is_err() {
        let _ = fs::remove_file(&temp);
    }
    result
}
