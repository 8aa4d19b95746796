//! Cache administration: stats, pruning, and runtime reconfiguration.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use serde::Serialize;

use crate::cache::checkpoint::{CheckpointStore, SCAN_PROGRESS_INFIX};
use crate::cache::locations::{LocationCache, SourceInfoCache, RESULT_LOCATIONS_TYPE, SOURCE_INFO_TYPE};
use crate::cache::preview::{PreviewCache, PREVIEW_BATCH_TYPE, PREVIEW_TYPE_PREFIX};
use crate::cache::store::CacheStore;
use crate::config::{CacheConfig, ConfigSource, StaticConfigSource};
use crate::suggest::SuggestionEngine;

/// Snapshot of what the cache directory currently holds.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CacheStats {
    /// Directory the cache lives in.
    pub directory: PathBuf,
    /// Whether caching is enabled and the directory reachable.
    pub enabled: bool,
    /// Whether the directory exists on disk.
    pub directory_exists: bool,
    /// Total cache entry files.
    pub total_files: usize,
    /// Total size of all entry files in bytes.
    pub total_size_bytes: u64,
    /// `result_locations` entries.
    pub location_caches: usize,
    /// `source_info` entries.
    pub source_info_caches: usize,
    /// Scan checkpoint entries.
    pub scan_progress_caches: usize,
    /// Individual preview entries.
    pub preview_caches: usize,
    /// Batched preview entries.
    pub preview_batch_caches: usize,
}

/// Owning handle over the whole cache layer.
///
/// The application root creates one `Arc<CacheManager>` and passes it by
/// reference to whatever needs caching; there is deliberately no
/// process-global instance. The handle is thread-safe: a scan worker can
/// write checkpoints while the caller reads stats or suggestions, with
/// correctness resting on whole-file atomic replace rather than in-process
/// locks.
pub struct CacheManager {
    store: Arc<CacheStore>,
    config_source: Box<dyn ConfigSource>,
}

impl CacheManager {
    /// Build a manager, reading configuration once from `config_source`.
    pub fn new(config_source: Box<dyn ConfigSource>) -> Self {
        let config = config_source.load();
        Self {
            store: Arc::new(CacheStore::new(&config)),
            config_source,
        }
    }

    /// Build a manager over a fixed configuration.
    pub fn with_config(config: CacheConfig) -> Self {
        Self::new(Box::new(StaticConfigSource(config)))
    }

    /// Whether caching is currently enabled.
    #[must_use]
    pub fn enabled(&self) -> bool {
        self.store.enabled()
    }

    /// The directory entries are stored in.
    #[must_use]
    pub fn directory(&self) -> PathBuf {
        self.store.directory()
    }

    /// Sprite location cache facade.
    #[must_use]
    pub fn locations(&self) -> LocationCache {
        LocationCache::new(Arc::clone(&self.store))
    }

    /// Source-info cache facade.
    #[must_use]
    pub fn source_info(&self) -> SourceInfoCache {
        SourceInfoCache::new(Arc::clone(&self.store))
    }

    /// Scan checkpoint facade.
    #[must_use]
    pub fn checkpoints(&self) -> CheckpointStore {
        CheckpointStore::new(Arc::clone(&self.store))
    }

    /// Preview cache facade.
    #[must_use]
    pub fn previews(&self) -> PreviewCache {
        PreviewCache::new(Arc::clone(&self.store))
    }

    /// Suggestion engine over all cached evidence, with default weights.
    #[must_use]
    pub fn suggestions(&self) -> SuggestionEngine {
        SuggestionEngine::new(Arc::clone(&self.store))
    }

    /// Enumerate cache files by naming convention and report counts/sizes.
    ///
    /// Degrades to a zeroed, disabled report when caching is off or the
    /// directory is absent — never fails.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        let directory = self.store.directory();
        let directory_exists = directory.is_dir();

        if !self.store.enabled() || !directory_exists {
            return CacheStats {
                directory,
                enabled: false,
                directory_exists,
                ..CacheStats::default()
            };
        }

        let mut stats = CacheStats {
            directory,
            enabled: true,
            directory_exists: true,
            ..CacheStats::default()
        };

        for path in self.store.list() {
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            stats.total_files += 1;
            if let Ok(meta) = fs::metadata(&path) {
                stats.total_size_bytes += meta.len();
            }

            if name.ends_with(&format!("_{}.json", RESULT_LOCATIONS_TYPE)) {
                stats.location_caches += 1;
            } else if name.ends_with(&format!("_{}.json", SOURCE_INFO_TYPE)) {
                stats.source_info_caches += 1;
            } else if name.contains(SCAN_PROGRESS_INFIX) {
                stats.scan_progress_caches += 1;
            } else if name.ends_with(&format!("_{}.json", PREVIEW_BATCH_TYPE)) {
                stats.preview_batch_caches += 1;
            } else if name.contains(&format!("_{}", PREVIEW_TYPE_PREFIX)) {
                stats.preview_caches += 1;
            }
        }

        stats
    }

    /// Remove cache files, optionally only those older than `older_than_days`.
    ///
    /// Returns the number of files removed.
    pub fn clear(&self, older_than_days: Option<u32>) -> usize {
        if !self.store.enabled() {
            return 0;
        }

        let cutoff = older_than_days.map(|days| {
            SystemTime::now() - Duration::from_secs(u64::from(days) * 24 * 3600)
        });

        let mut removed = 0;
        for path in self.store.list() {
            if let Some(cutoff) = cutoff {
                let old_enough = fs::metadata(&path)
                    .and_then(|m| m.modified())
                    .map(|mtime| mtime < cutoff)
                    .unwrap_or(false);
                if !old_enough {
                    continue;
                }
            }
            if fs::remove_file(&path).is_ok() {
                removed += 1;
            }
        }
        removed
    }

    /// Re-read configuration and apply it.
    ///
    /// Can flip caching on or off and migrate to a new directory, creating
    /// it on demand with the usual temp-dir fallback.
    pub fn refresh(&self) {
        let config = self.config_source.load();
        self.store.reconfigure(&config);
    }
}
