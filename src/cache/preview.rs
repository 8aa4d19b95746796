//! Compressed preview cache.
//!
//! Raw tile bytes are zlib-compressed before hitting disk and embedded in
//! the JSON envelope as base64. The cache key mixes the offset with a short
//! hash of the generation parameters, so two previews of the same offset
//! rendered with different settings never collide. A batch variant packs
//! many offsets into one file to amortize filesystem overhead.

use std::collections::BTreeMap;
use std::io::{Read, Write};
use std::path::Path;
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::cache::envelope::CacheEnvelope;
use crate::cache::identity::{cache_file_name, short_digest, SourceId};
use crate::cache::store::CacheStore;

/// Cache type suffix for the batched preview entry.
pub const PREVIEW_BATCH_TYPE: &str = "preview_batch";

/// Prefix shared by individual preview cache types.
pub const PREVIEW_TYPE_PREFIX: &str = "preview_";

/// Hex characters kept from the generation-parameter hash.
const PARAM_HASH_LEN: usize = 8;

/// One cached preview as stored on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreviewRecord {
    /// Offset the preview was rendered from.
    pub offset: u64,
    /// zlib-compressed tile bytes, base64-encoded.
    pub tile_data: String,
    /// Pixel width of the rendered tile block.
    pub width: u32,
    /// Pixel height of the rendered tile block.
    pub height: u32,
    /// Generation parameters the preview was rendered with.
    pub params: Value,
    /// Compressed size as a fraction of the raw size.
    pub compression_ratio: f64,
}

impl PreviewRecord {
    /// Returns the record plus the compressed byte count for aggregation.
    fn encode(
        offset: u64,
        raw: &[u8],
        width: u32,
        height: u32,
        params: &Value,
    ) -> Option<(Self, usize)> {
        let compressed = deflate(raw)?;
        let compressed_len = compressed.len();
        let ratio = if raw.is_empty() {
            1.0
        } else {
            compressed_len as f64 / raw.len() as f64
        };
        let record = Self {
            offset,
            tile_data: BASE64.encode(&compressed),
            width,
            height,
            params: params.clone(),
            compression_ratio: ratio,
        };
        Some((record, compressed_len))
    }

    /// Decompress the stored tile bytes, or `None` when the blob is damaged.
    #[must_use]
    pub fn decode(&self) -> Option<Vec<u8>> {
        let compressed = BASE64.decode(&self.tile_data).ok()?;
        inflate(&compressed)
    }
}

/// A decoded preview handed back to callers.
#[derive(Debug, Clone, PartialEq)]
pub struct Preview {
    /// Offset the preview was rendered from.
    pub offset: u64,
    /// Raw decompressed tile bytes.
    pub bytes: Vec<u8>,
    /// Pixel width.
    pub width: u32,
    /// Pixel height.
    pub height: u32,
    /// Generation parameters.
    pub params: Value,
    /// Compressed size as a fraction of the raw size.
    pub compression_ratio: f64,
}

/// Payload of a `preview_batch` entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PreviewBatch {
    /// Records keyed by offset.
    pub previews: BTreeMap<u64, PreviewRecord>,
    /// Total compressed bytes over total raw bytes across the batch.
    pub aggregate_ratio: f64,
}

/// Raw preview input for batched saves.
#[derive(Debug, Clone, Copy)]
pub struct RawPreview<'a> {
    /// Offset the preview was rendered from.
    pub offset: u64,
    /// Raw tile bytes to compress and store.
    pub bytes: &'a [u8],
    /// Pixel width.
    pub width: u32,
    /// Pixel height.
    pub height: u32,
}

/// Compressed preview persistence, individual and batched.
pub struct PreviewCache {
    store: Arc<CacheStore>,
}

impl PreviewCache {
    pub(crate) fn new(store: Arc<CacheStore>) -> Self {
        Self { store }
    }

    fn cache_type(offset: u64, params: &Value) -> String {
        let param_hash = short_digest(params.to_string().as_bytes(), PARAM_HASH_LEN);
        format!("{}{:06x}_{}", PREVIEW_TYPE_PREFIX, offset, param_hash)
    }

    /// Compress and store one preview.
    pub fn save(
        &self,
        source: &Path,
        offset: u64,
        raw: &[u8],
        width: u32,
        height: u32,
        params: &Value,
    ) -> bool {
        let Some((record, _)) = PreviewRecord::encode(offset, raw, width, height, params) else {
            log::warn!("Failed to compress preview for offset 0x{:06X}", offset);
            return false;
        };

        let id = SourceId::for_path(source);
        let key = cache_file_name(&id, &Self::cache_type(offset, params));
        self.store
            .write(&key, &CacheEnvelope::new(source, &id, record))
    }

    /// Load and decompress one preview.
    ///
    /// A record that fails to decompress is a miss, left in place to be
    /// overwritten by the next save.
    pub fn load(&self, source: &Path, offset: u64, params: &Value) -> Option<Preview> {
        let id = SourceId::for_path(source);
        let key = cache_file_name(&id, &Self::cache_type(offset, params));
        let record = self.store.read::<PreviewRecord>(&key, source)?.payload;

        let bytes = record.decode()?;
        Some(Preview {
            offset: record.offset,
            bytes,
            width: record.width,
            height: record.height,
            params: record.params,
            compression_ratio: record.compression_ratio,
        })
    }

    /// Store many previews in one batch file, replacing any prior batch.
    ///
    /// Returns the aggregate compression ratio on success.
    pub fn save_batch(
        &self,
        source: &Path,
        previews: &[RawPreview<'_>],
        params: &Value,
    ) -> Option<f64> {
        let mut records = BTreeMap::new();
        let mut raw_total = 0usize;
        let mut compressed_total = 0usize;

        for preview in previews {
            let (record, compressed_len) = PreviewRecord::encode(
                preview.offset,
                preview.bytes,
                preview.width,
                preview.height,
                params,
            )?;
            raw_total += preview.bytes.len();
            compressed_total += compressed_len;
            records.insert(preview.offset, record);
        }

        let aggregate_ratio = if raw_total == 0 {
            1.0
        } else {
            compressed_total as f64 / raw_total as f64
        };

        let payload = PreviewBatch {
            previews: records,
            aggregate_ratio,
        };

        let id = SourceId::for_path(source);
        let key = cache_file_name(&id, PREVIEW_BATCH_TYPE);
        if self
            .store
            .write(&key, &CacheEnvelope::new(source, &id, payload))
        {
            Some(aggregate_ratio)
        } else {
            None
        }
    }

    /// Load the batch entry for a source.
    pub fn load_batch(&self, source: &Path) -> Option<PreviewBatch> {
        let id = SourceId::for_path(source);
        let key = cache_file_name(&id, PREVIEW_BATCH_TYPE);
        self.store
            .read::<PreviewBatch>(&key, source)
            .map(|envelope| envelope.payload)
    }
}

fn deflate(bytes: &[u8]) -> Option<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(bytes).ok()?;
    encoder.finish().ok()
}

fn inflate(bytes: &[u8]) -> Option<Vec<u8>> {
    let mut decoder = ZlibDecoder::new(bytes);
    let mut out = Vec::new();
    decoder.read_to_end(&mut out).ok()?;
    Some(out)
}
