//! Versioned JSON envelopes shared by every cache type.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::cache::identity::SourceId;

/// Current version of the on-disk cache format.
pub const SCHEMA_VERSION: u32 = 1;

/// Envelope wrapping every cache payload on disk.
///
/// Carries enough provenance to audit an entry by hand: which source it was
/// derived from, under which hash, and when. An envelope whose
/// `schema_version` is unrecognized is treated as a miss on read, never as
/// an error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEnvelope<T> {
    /// On-disk format version.
    pub schema_version: u32,
    /// Resolved path of the source the payload was derived from.
    pub source_path: PathBuf,
    /// Content hash of that source at write time.
    pub source_hash: String,
    /// When the entry was written.
    pub cached_at: DateTime<Utc>,
    /// The cache-type-specific payload.
    pub payload: T,
}

impl<T> CacheEnvelope<T> {
    /// Wrap a payload for the given source.
    pub fn new(source_path: &Path, source_hash: &SourceId, payload: T) -> Self {
        let resolved = std::path::absolute(source_path).unwrap_or_else(|_| source_path.to_path_buf());
        Self {
            schema_version: SCHEMA_VERSION,
            source_path: resolved,
            source_hash: source_hash.as_str().to_string(),
            cached_at: Utc::now(),
            payload,
        }
    }
}

impl<T: DeserializeOwned> CacheEnvelope<T> {
    /// Parse an envelope from raw JSON, rejecting unknown schema versions.
    ///
    /// The version field is probed before the payload is decoded, so a
    /// future format whose payload shape has changed still reads as a clean
    /// miss rather than a parse error.
    pub fn from_json(raw: &str) -> Option<Self> {
        #[derive(Deserialize)]
        struct VersionProbe {
            schema_version: u32,
        }

        let probe: VersionProbe = serde_json::from_str(raw).ok()?;
        if probe.schema_version != SCHEMA_VERSION {
            log::debug!(
                "Rejecting cache entry with schema version {} (expected {})",
                probe.schema_version,
                SCHEMA_VERSION
            );
            return None;
        }

        serde_json::from_str(raw).ok()
    }
}
