//! Content-addressed, file-backed caching for ROM scan results.
//!
//! Expensive scan work — decompression attempts and quality checks at
//! thousands of candidate offsets — is remembered here so repeated scans of
//! the same ROM are cheap and interrupted scans resume where they stopped.
//!
//! # Architecture
//!
//! * [`identity`]: content hashing of the source image and deterministic
//!   keying of cache files and scan checkpoints.
//! * [`envelope`]: the versioned JSON envelope every entry is wrapped in.
//! * [`store`]: shared primitives — atomic writes, retried reads, validity
//!   checks, and the global enable gate.
//! * [`locations`] / [`checkpoint`] / [`preview`]: the concrete cache types
//!   layered over the store.
//! * [`admin`]: stats, pruning, and runtime reconfiguration via
//!   [`CacheManager`], the one handle the application root owns.
//!
//! # Cache Invalidation
//!
//! An entry is served only while all of these hold:
//!
//! * its `schema_version` matches the current format,
//! * it is younger than the configured expiration window,
//! * the source file has not been modified since the entry was written.
//!
//! Stale or corrupt entries read as misses — never errors — and stay on
//! disk until the next successful save overwrites them.

pub mod admin;
pub mod checkpoint;
pub mod envelope;
pub mod identity;
pub mod locations;
pub mod preview;
pub mod store;

pub use admin::{CacheManager, CacheStats};
pub use checkpoint::{CheckpointStore, FoundSprite, ScanParams, ScanProgress};
pub use envelope::{CacheEnvelope, SCHEMA_VERSION};
pub use identity::{cache_file_name, ScanId, SourceId};
pub use locations::{LocationCache, SourceInfoCache, SpriteLocation, SpriteLocations};
pub use preview::{Preview, PreviewBatch, PreviewCache, PreviewRecord, RawPreview};
pub use store::CacheStore;
