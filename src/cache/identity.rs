//! Source identity and cache keying.
//!
//! Every cache file lives in one flat directory, named
//! `{source_hash}_{cache_type}.json`. The source hash is derived from the
//! ROM's content so a renamed copy shares its cache, and a modified ROM gets
//! a fresh namespace. Scan parameters hash to a short [`ScanId`] so each
//! distinct scan request owns an independent checkpoint file.

use std::fmt;
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use serde::Serialize;
use sha2::{Digest, Sha256};

/// Chunk size for streaming a source file through the hasher.
///
/// Bounds memory use regardless of ROM size.
const HASH_CHUNK_SIZE: usize = 8192;

/// Marker mixed into path-based hashes for absent source files, so a file
/// that later appears at the same path cannot collide with its placeholder
/// namespace.
const MISSING_SOURCE_MARKER: &str = "nonexistent_";

/// Number of hex characters in a [`ScanId`].
const SCAN_ID_LEN: usize = 16;

/// Stable, content-derived identity of a source image.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SourceId(String);

impl SourceId {
    /// Compute the identity for a source path.
    ///
    /// An existing file is streamed through BLAKE3 in fixed-size chunks. An
    /// absent or unreadable file falls back to hashing its resolved path with
    /// a distinguishing marker, so a cache key always exists.
    pub fn for_path(path: &Path) -> Self {
        if path.exists() {
            match hash_file_contents(path) {
                Ok(hex) => return Self(hex),
                Err(e) => {
                    log::debug!(
                        "Could not read {} for hashing, using path-based identity: {}",
                        path.display(),
                        e
                    );
                }
            }
        }

        let resolved = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
        let tagged = format!("{}{}", MISSING_SOURCE_MARKER, resolved.display());
        Self(blake3::hash(tagged.as_bytes()).to_hex().to_string())
    }

    /// The hex digest as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn hash_file_contents(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = blake3::Hasher::new();
    let mut buf = [0u8; HASH_CHUNK_SIZE];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hasher.finalize().to_hex().to_string())
}

/// Deterministic cache file name for a source and cache type.
#[must_use]
pub fn cache_file_name(source: &SourceId, cache_type: &str) -> String {
    format!("{}_{}.json", source, cache_type)
}

/// Short digest identifying one set of scan parameters.
///
/// Identical parameters always produce the same id regardless of field
/// order in any serialized form; any differing field produces a different
/// id and therefore an independent checkpoint.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ScanId(String);

impl ScanId {
    /// Derive the id from any serializable parameter set.
    ///
    /// Parameters are canonicalized through a sorted-key JSON value before
    /// hashing, then the SHA-256 digest is truncated.
    pub fn for_params<T: Serialize>(params: &T) -> Self {
        let canonical = serde_json::to_value(params)
            .map(|v| v.to_string())
            .unwrap_or_default();
        Self(short_digest(canonical.as_bytes(), SCAN_ID_LEN))
    }

    /// The hex digest as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ScanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Truncated SHA-256 hex digest, also used for preview parameter keys.
pub(crate) fn short_digest(bytes: &[u8], len: usize) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let mut hex = format!("{:x}", hasher.finalize());
    hex.truncate(len);
    hex
}
