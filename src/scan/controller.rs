//! Resumable offset-by-offset scan controller.
//!
//! Drives the scan loop on one dedicated worker thread: consult the
//! checkpoint cache for a resumption point, iterate candidate offsets in
//! fixed steps, delegate each offset to the codec collaborator, and
//! checkpoint progress so an interrupted scan picks up exactly where it
//! stopped — across process restarts.
//!
//! State machine: `Idle → Running ⇄ Paused → {Completed | Stopped | Failed}`.
//! Stop is a level-triggered flag honored within one iteration; pause parks
//! the worker on a condition variable without losing any in-memory results.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{bail, Result};

use crate::cache::admin::CacheManager;
use crate::cache::checkpoint::{CheckpointStore, FoundSprite, ScanParams};
use crate::scan::codec::{SpriteCodec, TILE_SIZE};
use crate::scan::image::SourceImage;
use crate::scan::observer::{ScanObserver, ScanOutcome};

/// Bound on condvar waits while paused, so a stop request that raced the
/// pause notification still lands promptly.
const PAUSE_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Checkpoint at most once per this much range progress.
const CHECKPOINT_STRIDE_PCT: u8 = 10;

/// Scan loop configuration.
#[derive(Debug, Clone)]
pub struct ScanConfig {
    /// Offset range and step.
    pub params: ScanParams,
    /// Ladder of decompressed-size caps tried at each offset.
    pub size_limits: Vec<usize>,
    /// Minimum quality for a candidate to be accepted.
    pub min_quality: f64,
    /// Minimum decompressed size for a candidate to be accepted.
    pub min_decompressed: usize,
    /// Whether to consult and write the cache.
    pub use_cache: bool,
}

impl ScanConfig {
    /// Configuration with default thresholds for the given range.
    #[must_use]
    pub fn new(params: ScanParams) -> Self {
        Self {
            params,
            size_limits: vec![0x800, 0x2000, 0x8000],
            min_quality: 0.5,
            min_decompressed: 2 * TILE_SIZE,
            use_cache: true,
        }
    }
}

/// Lifecycle state of a scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanState {
    /// Not started yet.
    Idle,
    /// The worker is iterating offsets.
    Running,
    /// The worker is parked on a pause request.
    Paused,
    /// The full range was traversed.
    Completed,
    /// Stopped before covering the full range.
    Stopped,
    /// Ended by an unexpected error.
    Failed,
}

/// Errors from controller lifecycle operations.
#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    /// `start` was called more than once.
    #[error("scan has already been started")]
    AlreadyStarted,
    /// The worker thread could not be spawned.
    #[error("failed to spawn scan worker: {0}")]
    SpawnFailed(#[from] std::io::Error),
}

struct PauseGate {
    paused: Mutex<bool>,
    condvar: Condvar,
}

impl PauseGate {
    fn new() -> Self {
        Self {
            paused: Mutex::new(false),
            condvar: Condvar::new(),
        }
    }

    fn set_paused(&self, value: bool) {
        *self.paused.lock().unwrap() = value;
        if !value {
            self.condvar.notify_all();
        }
    }

    fn wake(&self) {
        self.condvar.notify_all();
    }

    /// Park the worker while paused. Waits are bounded so a stop request is
    /// observed even without a matching notification.
    fn wait_while_paused(&self, stop: &AtomicBool) {
        let mut paused = self.paused.lock().unwrap();
        while *paused && !stop.load(Ordering::SeqCst) {
            let (guard, _timeout) = self
                .condvar
                .wait_timeout(paused, PAUSE_POLL_INTERVAL)
                .unwrap();
            paused = guard;
        }
    }
}

/// One scan over one source image.
///
/// A controller runs a single scan; create a fresh one per request. All
/// cache I/O happens on the worker thread with ordinary blocking calls.
pub struct ScanController {
    source: PathBuf,
    config: ScanConfig,
    codec: Arc<dyn SpriteCodec>,
    observer: Arc<dyn ScanObserver>,
    cache: Option<Arc<CacheManager>>,
    stop_flag: Arc<AtomicBool>,
    pause_gate: Arc<PauseGate>,
    state: Arc<Mutex<ScanState>>,
    outcome: Arc<Mutex<Option<ScanOutcome>>>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl ScanController {
    /// Build a controller without caching.
    pub fn new(
        source: impl Into<PathBuf>,
        config: ScanConfig,
        codec: Arc<dyn SpriteCodec>,
        observer: Arc<dyn ScanObserver>,
    ) -> Self {
        Self {
            source: source.into(),
            config,
            codec,
            observer,
            cache: None,
            stop_flag: Arc::new(AtomicBool::new(false)),
            pause_gate: Arc::new(PauseGate::new()),
            state: Arc::new(Mutex::new(ScanState::Idle)),
            outcome: Arc::new(Mutex::new(None)),
            handle: Mutex::new(None),
        }
    }

    /// Attach the cache used for resumption and checkpointing.
    #[must_use]
    pub fn with_cache(mut self, cache: Arc<CacheManager>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Share an externally owned stop flag (e.g. a Ctrl+C handler's).
    #[must_use]
    pub fn with_stop_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.stop_flag = flag;
        self
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ScanState {
        *self.state.lock().unwrap()
    }

    /// Terminal outcome, available once the worker has finished.
    #[must_use]
    pub fn outcome(&self) -> Option<ScanOutcome> {
        self.outcome.lock().unwrap().clone()
    }

    /// Spawn the worker thread and begin scanning.
    pub fn start(&self) -> Result<(), ScanError> {
        {
            let mut state = self.state.lock().unwrap();
            if *state != ScanState::Idle {
                return Err(ScanError::AlreadyStarted);
            }
            *state = ScanState::Running;
        }

        let job = ScanJob {
            source: self.source.clone(),
            config: self.config.clone(),
            codec: Arc::clone(&self.codec),
            observer: Arc::clone(&self.observer),
            checkpoints: self
                .cache
                .as_ref()
                .filter(|cache| self.config.use_cache && cache.enabled())
                .map(|cache| cache.checkpoints()),
            stop: Arc::clone(&self.stop_flag),
            pause: Arc::clone(&self.pause_gate),
        };

        let state = Arc::clone(&self.state);
        let outcome_slot = Arc::clone(&self.outcome);
        let observer = Arc::clone(&self.observer);

        let spawned = thread::Builder::new()
            .name("romscan-worker".into())
            .spawn(move || {
                let outcome = job.run();
                *state.lock().unwrap() = match &outcome {
                    ScanOutcome::Completed { .. } => ScanState::Completed,
                    ScanOutcome::Stopped { .. } => ScanState::Stopped,
                    ScanOutcome::Failed { .. } => ScanState::Failed,
                };
                observer.on_finished(&outcome);
                *outcome_slot.lock().unwrap() = Some(outcome);
            });

        match spawned {
            Ok(handle) => {
                *self.handle.lock().unwrap() = Some(handle);
                Ok(())
            }
            Err(e) => {
                *self.state.lock().unwrap() = ScanState::Idle;
                Err(ScanError::SpawnFailed(e))
            }
        }
    }

    /// Request a pause. Nothing committed is lost; no checkpoint is needed.
    pub fn pause(&self) {
        let mut state = self.state.lock().unwrap();
        if *state == ScanState::Running {
            *state = ScanState::Paused;
            drop(state);
            self.pause_gate.set_paused(true);
            self.observer.on_paused();
        }
    }

    /// Resume from a pause.
    pub fn resume(&self) {
        let mut state = self.state.lock().unwrap();
        if *state == ScanState::Paused {
            *state = ScanState::Running;
            drop(state);
            self.pause_gate.set_paused(false);
            self.observer.on_resumed();
        }
    }

    /// Request a stop. Takes effect within one loop iteration; the worker
    /// writes its exit checkpoint before finishing.
    pub fn stop(&self) {
        self.stop_flag.store(true, Ordering::SeqCst);
        self.pause_gate.wake();
    }

    /// Wait for the worker to finish.
    pub fn join(&self) {
        let handle = self.handle.lock().unwrap().take();
        if let Some(handle) = handle {
            let _ = handle.join();
        }
    }
}

struct ScanJob {
    source: PathBuf,
    config: ScanConfig,
    codec: Arc<dyn SpriteCodec>,
    observer: Arc<dyn ScanObserver>,
    checkpoints: Option<CheckpointStore>,
    stop: Arc<AtomicBool>,
    pause: Arc<PauseGate>,
}

impl ScanJob {
    /// Run the scan, converting any unexpected error into a terminal
    /// failure outcome so completion is always signaled exactly once.
    fn run(self) -> ScanOutcome {
        match self.execute() {
            Ok(outcome) => outcome,
            Err(err) => {
                log::error!("Scan failed: {:#}", err);
                ScanOutcome::Failed {
                    error: format!("{:#}", err),
                }
            }
        }
    }

    fn execute(&self) -> Result<ScanOutcome> {
        let params = self.config.params;
        let ScanParams { start, end, step } = params;
        if step == 0 {
            bail!("scan step must be non-zero");
        }

        let image = SourceImage::open(&self.source)?;
        let data = image.bytes();

        let mut found: BTreeMap<u64, FoundSprite> = BTreeMap::new();
        let mut next_offset = start;
        let mut last_evaluated: Option<u64> = None;
        let mut last_saved_pct: u8 = 0;

        if let Some(checkpoints) = &self.checkpoints {
            self.observer.on_status("Checking cache...");
            match checkpoints.load(&self.source, &params) {
                Some(progress) if progress.completed => {
                    // The whole range is already covered; restore without
                    // re-scanning a single offset.
                    for sprite in &progress.found {
                        self.observer.on_sprite_found(sprite);
                    }
                    let total = params.total_steps();
                    self.observer.on_progress(total, total);
                    self.observer.on_status(&format!(
                        "Restored {} sprites from a completed scan",
                        progress.found.len()
                    ));
                    return Ok(ScanOutcome::Completed {
                        found: progress.found,
                    });
                }
                Some(progress) => {
                    let pct = progress_percent(&params, progress.current_offset);
                    self.observer.on_status(&format!(
                        "Resuming from {}% ({} sprites found)",
                        pct,
                        progress.found.len()
                    ));
                    log::info!("Resuming scan from offset 0x{:X}", progress.current_offset);
                    for sprite in progress.found {
                        self.observer.on_sprite_found(&sprite);
                        found.insert(sprite.offset, sprite);
                    }
                    next_offset = progress.current_offset + step;
                    last_evaluated = Some(progress.current_offset);
                    last_saved_pct = pct;
                }
                None => {
                    self.observer.on_status("Starting fresh scan");
                }
            }
        }

        let total = params.total_steps();
        let mut stopped = false;

        while next_offset < end {
            if self.stop.load(Ordering::SeqCst) {
                stopped = true;
                break;
            }
            self.pause.wait_while_paused(&self.stop);
            if self.stop.load(Ordering::SeqCst) {
                stopped = true;
                break;
            }

            if let Some(sprite) =
                evaluate_offset(data, next_offset, &self.config, self.codec.as_ref())
            {
                log::info!(
                    "Found sprite at 0x{:06X}: quality={:.2}, tiles={}",
                    sprite.offset,
                    sprite.quality,
                    sprite.tile_count
                );
                self.observer.on_sprite_found(&sprite);
                found.insert(next_offset, sprite);
            }
            last_evaluated = Some(next_offset);

            let current_step = (next_offset - start) / step + 1;
            self.observer.on_progress(current_step, total);

            if let Some(checkpoints) = &self.checkpoints {
                let pct = progress_percent(&params, next_offset);
                if pct >= last_saved_pct.saturating_add(CHECKPOINT_STRIDE_PCT) {
                    self.observer
                        .on_status(&format!("Saving progress ({}%)...", pct));
                    let snapshot: Vec<FoundSprite> = found.values().cloned().collect();
                    if checkpoints.save(&self.source, &params, &snapshot, next_offset, false) {
                        self.observer.on_checkpoint_saved(pct);
                        last_saved_pct = pct;
                        log::debug!("Saved scan checkpoint at {}% progress", pct);
                    }
                }
            }

            next_offset += step;
        }

        let completed = !stopped;
        let results: Vec<FoundSprite> = found.into_values().collect();

        if let Some(checkpoints) = &self.checkpoints {
            // Unconditional exit checkpoint. Completion is recorded only
            // when the full range was traversed.
            if completed {
                self.observer.on_status("Saving final results...");
                if checkpoints.save(&self.source, &params, &results, end, true) {
                    self.observer.on_checkpoint_saved(100);
                    log::debug!("Saved final scan results ({} sprites)", results.len());
                }
            } else if let Some(offset) = last_evaluated {
                self.observer.on_status("Saving progress before exit...");
                if checkpoints.save(&self.source, &params, &results, offset, false) {
                    self.observer
                        .on_checkpoint_saved(progress_percent(&params, offset));
                }
            }
        }

        Ok(if completed {
            ScanOutcome::Completed { found: results }
        } else {
            ScanOutcome::Stopped { found: results }
        })
    }
}

/// Probe one offset through the codec's size-limit ladder, keeping the
/// single best-quality acceptable match.
fn evaluate_offset(
    data: &[u8],
    offset: u64,
    config: &ScanConfig,
    codec: &dyn SpriteCodec,
) -> Option<FoundSprite> {
    let index = usize::try_from(offset).ok()?;
    if index >= data.len() {
        return None;
    }

    let mut best: Option<FoundSprite> = None;
    for &limit in &config.size_limits {
        let Some((compressed_size, bytes)) = codec.try_decompress(data, index, limit) else {
            continue;
        };
        if bytes.len() < config.min_decompressed {
            continue;
        }
        let quality = codec.quality(&bytes).clamp(0.0, 1.0);
        if quality < config.min_quality {
            continue;
        }

        let candidate = FoundSprite {
            offset,
            compressed_size: compressed_size as u32,
            decompressed_size: bytes.len() as u32,
            tile_count: (bytes.len() / TILE_SIZE) as u32,
            quality,
        };
        if best.as_ref().map_or(true, |b| candidate.quality > b.quality) {
            best = Some(candidate);
        }
    }
    best
}

/// Progress through the range after processing `current_offset`, in percent.
fn progress_percent(params: &ScanParams, current_offset: u64) -> u8 {
    if params.end <= params.start {
        return 100;
    }
    let range = (params.end - params.start) as f64;
    let done = (current_offset.saturating_sub(params.start) + params.step) as f64;
    ((done / range) * 100.0).min(100.0) as u8
}
