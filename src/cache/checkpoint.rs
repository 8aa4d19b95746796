//! Scan checkpoint persistence.
//!
//! A checkpoint is always a full snapshot of everything a scan has found so
//! far plus the last offset it processed. Each save wholly replaces the
//! previous checkpoint file, so an interruption between saves can never
//! leave the stored state inconsistent: resumption from the last
//! successfully written checkpoint is always safe.
//!
//! One checkpoint file exists per distinct set of scan parameters — the file
//! name embeds the parameters' [`ScanId`], so scans over different ranges or
//! step sizes never share or clobber each other's progress.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

use crate::cache::envelope::CacheEnvelope;
use crate::cache::identity::{cache_file_name, ScanId, SourceId};
use crate::cache::store::CacheStore;

/// Infix shared by every checkpoint file name, used for sweeps by naming
/// convention.
pub const SCAN_PROGRESS_INFIX: &str = "_scan_progress_";

/// Parameters identifying one scan request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanParams {
    /// First candidate offset, inclusive.
    pub start: u64,
    /// End of the range, exclusive.
    pub end: u64,
    /// Distance between candidate offsets.
    pub step: u64,
}

impl ScanParams {
    /// The short id namespacing this parameter set's checkpoint file.
    #[must_use]
    pub fn scan_id(&self) -> ScanId {
        ScanId::for_params(self)
    }

    /// Number of candidate offsets in the range.
    #[must_use]
    pub fn total_steps(&self) -> u64 {
        if self.step == 0 || self.end <= self.start {
            return 0;
        }
        (self.end - self.start).div_ceil(self.step)
    }
}

/// A sprite accepted during a scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FoundSprite {
    /// Byte offset the sprite decodes from.
    pub offset: u64,
    /// Compressed size in bytes.
    pub compressed_size: u32,
    /// Decompressed size in bytes.
    pub decompressed_size: u32,
    /// Number of 32-byte tiles in the decompressed data.
    pub tile_count: u32,
    /// Quality score in [0, 1] from the assessment collaborator.
    pub quality: f64,
}

/// Full snapshot of an in-flight or finished scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanProgress {
    /// Every sprite found so far, ordered by offset.
    pub found: Vec<FoundSprite>,
    /// Last offset that was processed.
    pub current_offset: u64,
    /// Whether the full range was traversed.
    pub completed: bool,
    /// When this snapshot was written.
    pub last_updated: DateTime<Utc>,
    /// Convenience count of `found`.
    pub total_found: usize,
    /// The range this scan was asked to cover.
    pub range: ScanParams,
}

/// Checkpoint persistence for resumable scans.
pub struct CheckpointStore {
    store: Arc<CacheStore>,
}

impl CheckpointStore {
    pub(crate) fn new(store: Arc<CacheStore>) -> Self {
        Self { store }
    }

    fn cache_type(params: &ScanParams) -> String {
        format!("scan_progress_{}", params.scan_id())
    }

    /// Overwrite the checkpoint for (source, params) with a full snapshot.
    pub fn save(
        &self,
        source: &Path,
        params: &ScanParams,
        found: &[FoundSprite],
        current_offset: u64,
        completed: bool,
    ) -> bool {
        let mut found = found.to_vec();
        found.sort_by_key(|sprite| sprite.offset);

        let progress = ScanProgress {
            total_found: found.len(),
            found,
            current_offset,
            completed,
            last_updated: Utc::now(),
            range: *params,
        };

        let id = SourceId::for_path(source);
        let key = cache_file_name(&id, &Self::cache_type(params));
        self.store
            .write(&key, &CacheEnvelope::new(source, &id, progress))
    }

    /// Load the checkpoint for (source, params), or `None` to start fresh.
    pub fn load(&self, source: &Path, params: &ScanParams) -> Option<ScanProgress> {
        let id = SourceId::for_path(source);
        let key = cache_file_name(&id, &Self::cache_type(params));
        let progress = self
            .store
            .read::<ScanProgress>(&key, source)?
            .payload;

        // A checkpoint for a different range under the same id cannot
        // happen; a range mismatch means the entry predates a format
        // change and is unusable.
        if progress.range != *params {
            return None;
        }
        Some(progress)
    }

    /// Delete checkpoint files.
    ///
    /// With both `source` and `params`, removes that one checkpoint.
    /// Otherwise sweeps every checkpoint file by naming convention.
    /// Returns the number of files removed.
    pub fn clear(&self, source: Option<&Path>, params: Option<&ScanParams>) -> usize {
        if !self.store.enabled() {
            return 0;
        }

        match (source, params) {
            (Some(source), Some(params)) => {
                let id = SourceId::for_path(source);
                let key = cache_file_name(&id, &Self::cache_type(params));
                usize::from(self.store.remove(&key))
            }
            _ => {
                let mut removed = 0;
                for path in self.store.list() {
                    let is_checkpoint = path
                        .file_name()
                        .and_then(|name| name.to_str())
                        .is_some_and(|name| name.contains(SCAN_PROGRESS_INFIX));
                    if is_checkpoint && std::fs::remove_file(&path).is_ok() {
                        removed += 1;
                    }
                }
                removed
            }
        }
    }
}
