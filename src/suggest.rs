//! Offset suggestion engine.
//!
//! Mines every cache type that can reference an offset — prior scan results,
//! individual previews, batched previews — and aggregates them into
//! confidence-ranked candidates for "offsets worth inspecting next".
//!
//! Each source kind carries a base weight; an offset's weights are summed
//! and clamped to 1.0. Corroboration by more than one *distinct* kind earns
//! a bounded multiplicative boost: independent evidence counts for more
//! than repeated evidence of one kind.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::Arc;

use serde::Serialize;
use serde_json::{json, Map, Value};

use crate::cache::checkpoint::{ScanProgress, SCAN_PROGRESS_INFIX};
use crate::cache::identity::SourceId;
use crate::cache::locations::SpriteLocations;
use crate::cache::preview::{PreviewBatch, PreviewRecord, PREVIEW_BATCH_TYPE, PREVIEW_TYPE_PREFIX};
use crate::cache::store::CacheStore;
use crate::cache::{cache_file_name, locations::RESULT_LOCATIONS_TYPE};

/// Base weights per evidence kind and the corroboration boost.
///
/// These are hand-tuned values, exposed as configuration rather than
/// constants baked into the algorithm.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SuggestionWeights {
    /// Weight of an offset seen in a prior scan result.
    pub scan_result: f64,
    /// Weight of an offset with an individual preview entry.
    pub preview: f64,
    /// Weight of an offset appearing in a preview batch.
    pub preview_batch: f64,
    /// Multiplier applied when distinct kinds corroborate an offset.
    pub corroboration_boost: f64,
}

impl Default for SuggestionWeights {
    fn default() -> Self {
        Self {
            scan_result: 0.8,
            preview: 0.6,
            preview_batch: 0.5,
            corroboration_boost: 1.2,
        }
    }
}

/// Kind of cached evidence backing a suggestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestionSource {
    /// A prior scan found a sprite at this offset.
    ScanResult,
    /// An individual preview was rendered at this offset.
    Preview,
    /// The offset appears in a batched preview entry.
    PreviewBatch,
}

impl SuggestionSource {
    /// Short display label.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::ScanResult => "scan result",
            Self::Preview => "preview",
            Self::PreviewBatch => "preview batch",
        }
    }
}

/// One ranked candidate offset.
#[derive(Debug, Clone, Serialize)]
pub struct Suggestion {
    /// The candidate offset.
    pub offset: u64,
    /// Normalized confidence in [0, 1].
    pub confidence: f64,
    /// Distinct evidence kinds that mentioned the offset.
    pub sources: Vec<SuggestionSource>,
    /// Metadata merged from every mention.
    pub metadata: Map<String, Value>,
}

#[derive(Default)]
struct Candidate {
    score: f64,
    kinds: BTreeSet<SuggestionSource>,
    metadata: Map<String, Value>,
}

impl Candidate {
    fn add(&mut self, kind: SuggestionSource, weight: f64, metadata: Map<String, Value>) {
        self.score += weight;
        self.kinds.insert(kind);
        for (key, value) in metadata {
            self.metadata.entry(key).or_insert(value);
        }
    }
}

/// Aggregator over all cached evidence for a source image.
pub struct SuggestionEngine {
    store: Arc<CacheStore>,
    weights: SuggestionWeights,
}

impl SuggestionEngine {
    pub(crate) fn new(store: Arc<CacheStore>) -> Self {
        Self {
            store,
            weights: SuggestionWeights::default(),
        }
    }

    /// Override the evidence weights.
    #[must_use]
    pub fn with_weights(mut self, weights: SuggestionWeights) -> Self {
        self.weights = weights;
        self
    }

    /// Rank candidate offsets for `source`.
    ///
    /// `current_offset`, when given, is excluded from its own suggestions.
    /// Results are sorted by descending confidence and truncated to `limit`.
    #[must_use]
    pub fn suggest(
        &self,
        source: &Path,
        current_offset: Option<u64>,
        limit: usize,
    ) -> Vec<Suggestion> {
        if !self.store.enabled() {
            return Vec::new();
        }

        let id = SourceId::for_path(source);
        let mut candidates: BTreeMap<u64, Candidate> = BTreeMap::new();

        self.mine_locations(source, &id, &mut candidates);
        self.mine_checkpoints(source, &id, &mut candidates);
        self.mine_previews(source, &id, &mut candidates);
        self.mine_preview_batch(source, &id, &mut candidates);

        let mut suggestions: Vec<Suggestion> = candidates
            .into_iter()
            .filter(|(offset, _)| Some(*offset) != current_offset)
            .map(|(offset, candidate)| {
                let mut confidence = candidate.score.min(1.0);
                if candidate.kinds.len() > 1 {
                    confidence = (confidence * self.weights.corroboration_boost).min(1.0);
                }
                Suggestion {
                    offset,
                    confidence,
                    sources: candidate.kinds.into_iter().collect(),
                    metadata: candidate.metadata,
                }
            })
            .collect();

        suggestions.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.offset.cmp(&b.offset))
        });
        suggestions.truncate(limit);
        suggestions
    }

    fn mine_locations(
        &self,
        source: &Path,
        id: &SourceId,
        candidates: &mut BTreeMap<u64, Candidate>,
    ) {
        let key = cache_file_name(id, RESULT_LOCATIONS_TYPE);
        let Some(envelope) = self.store.read::<SpriteLocations>(&key, source) else {
            return;
        };

        for (name, location) in envelope.payload.locations {
            let mut metadata = Map::new();
            metadata.insert("sprite_name".into(), json!(name));
            if let Some(size) = location.compressed_size {
                metadata.insert("compressed_size".into(), json!(size));
            }
            candidates.entry(location.offset).or_default().add(
                SuggestionSource::ScanResult,
                self.weights.scan_result,
                metadata,
            );
        }
    }

    fn mine_checkpoints(
        &self,
        source: &Path,
        id: &SourceId,
        candidates: &mut BTreeMap<u64, Candidate>,
    ) {
        let prefix = format!("{}{}", id, SCAN_PROGRESS_INFIX);
        for path in self.store.list() {
            let matches = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with(&prefix));
            if !matches {
                continue;
            }
            let Some(envelope) = self.store.read_file::<ScanProgress>(&path, source) else {
                continue;
            };
            for sprite in envelope.payload.found {
                let mut metadata = Map::new();
                metadata.insert("quality".into(), json!(sprite.quality));
                metadata.insert("compressed_size".into(), json!(sprite.compressed_size));
                metadata.insert("tile_count".into(), json!(sprite.tile_count));
                candidates.entry(sprite.offset).or_default().add(
                    SuggestionSource::ScanResult,
                    self.weights.scan_result,
                    metadata,
                );
            }
        }
    }

    fn mine_previews(
        &self,
        source: &Path,
        id: &SourceId,
        candidates: &mut BTreeMap<u64, Candidate>,
    ) {
        let prefix = format!("{}_{}", id, PREVIEW_TYPE_PREFIX);
        let batch_name = cache_file_name(id, PREVIEW_BATCH_TYPE);
        for path in self.store.list() {
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if !name.starts_with(&prefix) || name == batch_name {
                continue;
            }
            let Some(envelope) = self.store.read_file::<PreviewRecord>(&path, source) else {
                continue;
            };
            let record = envelope.payload;
            let mut metadata = Map::new();
            metadata.insert("width".into(), json!(record.width));
            metadata.insert("height".into(), json!(record.height));
            metadata.insert(
                "compression_ratio".into(),
                json!(record.compression_ratio),
            );
            candidates.entry(record.offset).or_default().add(
                SuggestionSource::Preview,
                self.weights.preview,
                metadata,
            );
        }
    }

    fn mine_preview_batch(
        &self,
        source: &Path,
        id: &SourceId,
        candidates: &mut BTreeMap<u64, Candidate>,
    ) {
        let key = cache_file_name(id, PREVIEW_BATCH_TYPE);
        let Some(envelope) = self.store.read::<PreviewBatch>(&key, source) else {
            return;
        };

        for (offset, record) in envelope.payload.previews {
            let mut metadata = Map::new();
            metadata.insert("width".into(), json!(record.width));
            metadata.insert("height".into(), json!(record.height));
            candidates.entry(offset).or_default().add(
                SuggestionSource::PreviewBatch,
                self.weights.preview_batch,
                metadata,
            );
        }
    }
}
