//! Result caches for sprite locations and source-info metadata.
//!
//! Thin, versioned wrappers over the shared store for the two simple result
//! payloads: a named map of sprite locations (optionally with the source's
//! header metadata attached) and arbitrary source-info metadata. Both
//! round-trip their fields exactly, including optional ones.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::cache::envelope::CacheEnvelope;
use crate::cache::identity::{cache_file_name, SourceId};
use crate::cache::store::CacheStore;

/// Cache type suffix for sprite location entries.
pub const RESULT_LOCATIONS_TYPE: &str = "result_locations";

/// Cache type suffix for source-info entries.
pub const SOURCE_INFO_TYPE: &str = "source_info";

/// A discovered sprite location within the source image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpriteLocation {
    /// Byte offset of the compressed sprite data.
    pub offset: u64,
    /// ROM bank the sprite is addressed through.
    pub bank: u8,
    /// In-bank address.
    pub address: u16,
    /// Compressed size in bytes, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compressed_size: Option<u32>,
    /// Alternate offsets where the same sprite also decodes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset_variants: Option<Vec<u64>>,
}

/// Payload of a `result_locations` entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SpriteLocations {
    /// Locations keyed by sprite name.
    pub locations: BTreeMap<String, SpriteLocation>,
    /// Free-form source header metadata captured alongside the locations.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub header: Option<Value>,
}

/// Versioned cache of named sprite locations per source.
pub struct LocationCache {
    store: Arc<CacheStore>,
}

impl LocationCache {
    pub(crate) fn new(store: Arc<CacheStore>) -> Self {
        Self { store }
    }

    /// Save the full location map for a source, replacing any prior entry.
    pub fn save(
        &self,
        source: &Path,
        locations: BTreeMap<String, SpriteLocation>,
        header: Option<Value>,
    ) -> bool {
        let id = SourceId::for_path(source);
        let key = cache_file_name(&id, RESULT_LOCATIONS_TYPE);
        let payload = SpriteLocations { locations, header };
        self.store
            .write(&key, &CacheEnvelope::new(source, &id, payload))
    }

    /// Load the location map for a source, if a valid entry exists.
    pub fn load(&self, source: &Path) -> Option<SpriteLocations> {
        let id = SourceId::for_path(source);
        let key = cache_file_name(&id, RESULT_LOCATIONS_TYPE);
        self.store
            .read::<SpriteLocations>(&key, source)
            .map(|envelope| envelope.payload)
    }
}

/// Versioned cache of arbitrary source-info metadata per source.
pub struct SourceInfoCache {
    store: Arc<CacheStore>,
}

impl SourceInfoCache {
    pub(crate) fn new(store: Arc<CacheStore>) -> Self {
        Self { store }
    }

    /// Save source-info metadata, replacing any prior entry.
    pub fn save(&self, source: &Path, info: serde_json::Map<String, Value>) -> bool {
        let id = SourceId::for_path(source);
        let key = cache_file_name(&id, SOURCE_INFO_TYPE);
        self.store
            .write(&key, &CacheEnvelope::new(source, &id, info))
    }

    /// Load source-info metadata, if a valid entry exists.
    pub fn load(&self, source: &Path) -> Option<serde_json::Map<String, Value>> {
        let id = SourceId::for_path(source);
        let key = cache_file_name(&id, SOURCE_INFO_TYPE);
        self.store
            .read::<serde_json::Map<String, Value>>(&key, source)
            .map(|envelope| envelope.payload)
    }
}
