use romscan::cache::{CacheManager, FoundSprite, ScanParams};
use romscan::config::CacheConfig;
use romscan::scan::{
    ScanConfig, ScanController, ScanObserver, ScanOutcome, ScanState, SpriteCodec, TILE_SIZE,
};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::tempdir;

/// Byte value marking a "sprite" for the test codec.
const MARKER: u8 = 0xAB;

/// Codec that accepts any offset holding the marker byte, recording every
/// offset it probes.
struct MarkerCodec {
    probes: Mutex<Vec<usize>>,
    delay: Duration,
}

impl MarkerCodec {
    fn new() -> Self {
        Self {
            probes: Mutex::new(Vec::new()),
            delay: Duration::ZERO,
        }
    }

    fn with_delay(delay: Duration) -> Self {
        Self {
            probes: Mutex::new(Vec::new()),
            delay,
        }
    }

    fn probed(&self) -> Vec<usize> {
        self.probes.lock().unwrap().clone()
    }
}

impl SpriteCodec for MarkerCodec {
    fn try_decompress(
        &self,
        data: &[u8],
        offset: usize,
        size_limit: usize,
    ) -> Option<(usize, Vec<u8>)> {
        self.probes.lock().unwrap().push(offset);
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        if data.get(offset) != Some(&MARKER) {
            return None;
        }
        let len = (2 * TILE_SIZE).min(size_limit);
        Some((0x40, vec![0x11; len]))
    }

    fn quality(&self, bytes: &[u8]) -> f64 {
        if bytes.len() % TILE_SIZE == 0 {
            0.9
        } else {
            0.3
        }
    }
}

/// Observer recording every event, optionally raising a stop flag once a
/// number of candidates have been processed.
#[derive(Default)]
struct Collector {
    found: Mutex<Vec<FoundSprite>>,
    statuses: Mutex<Vec<String>>,
    checkpoints: Mutex<Vec<u8>>,
    progress: Mutex<Vec<(u64, u64)>>,
    finished: AtomicUsize,
    stop_flag: Option<Arc<AtomicBool>>,
    stop_after: u64,
}

impl Collector {
    fn stopping_after(candidates: u64, flag: Arc<AtomicBool>) -> Self {
        Self {
            stop_flag: Some(flag),
            stop_after: candidates,
            ..Self::default()
        }
    }

    fn found_offsets(&self) -> Vec<u64> {
        self.found.lock().unwrap().iter().map(|s| s.offset).collect()
    }
}

impl ScanObserver for Collector {
    fn on_progress(&self, current: u64, total: u64) {
        self.progress.lock().unwrap().push((current, total));
        if let Some(flag) = &self.stop_flag {
            if current >= self.stop_after {
                flag.store(true, Ordering::SeqCst);
            }
        }
    }

    fn on_sprite_found(&self, sprite: &FoundSprite) {
        self.found.lock().unwrap().push(sprite.clone());
    }

    fn on_status(&self, message: &str) {
        self.statuses.lock().unwrap().push(message.to_string());
    }

    fn on_checkpoint_saved(&self, percent: u8) {
        self.checkpoints.lock().unwrap().push(percent);
    }

    fn on_finished(&self, _outcome: &ScanOutcome) {
        self.finished.fetch_add(1, Ordering::SeqCst);
    }
}

fn manager_for(dir: &Path) -> Arc<CacheManager> {
    Arc::new(CacheManager::with_config(CacheConfig {
        enabled: true,
        location: Some(dir.to_path_buf()),
        expiration_days: 30,
    }))
}

/// Write a 0x1000-byte image with markers at the given offsets.
fn write_image(dir: &Path, markers: &[usize]) -> PathBuf {
    let mut data = vec![0u8; 0x1000];
    for &offset in markers {
        data[offset] = MARKER;
    }
    let path = dir.join("game.sfc");
    fs::write(&path, data).unwrap();
    path
}

fn test_params() -> ScanParams {
    ScanParams {
        start: 0,
        end: 0x1000,
        step: 0x100,
    }
}

#[test]
fn test_full_scan_finds_all_markers() {
    let rom_dir = tempdir().unwrap();
    let image = write_image(rom_dir.path(), &[0x200, 0x500, 0x900]);
    let observer = Arc::new(Collector::default());
    let codec = Arc::new(MarkerCodec::new());

    let controller = ScanController::new(
        &image,
        ScanConfig::new(test_params()),
        Arc::clone(&codec) as Arc<dyn SpriteCodec>,
        Arc::clone(&observer) as Arc<dyn ScanObserver>,
    );
    controller.start().unwrap();
    controller.join();

    assert_eq!(controller.state(), ScanState::Completed);
    match controller.outcome().unwrap() {
        ScanOutcome::Completed { found } => {
            let offsets: Vec<u64> = found.iter().map(|s| s.offset).collect();
            assert_eq!(offsets, vec![0x200, 0x500, 0x900]);
        }
        other => panic!("expected completion, got {:?}", other),
    }
    assert_eq!(observer.found_offsets(), vec![0x200, 0x500, 0x900]);
    assert_eq!(observer.finished.load(Ordering::SeqCst), 1);

    // All 16 candidates were probed exactly once.
    let probed = codec.probed();
    let unique: std::collections::BTreeSet<usize> = probed.iter().copied().collect();
    assert_eq!(unique.len(), 16);
}

#[test]
fn test_completed_scan_is_checkpointed_and_short_circuits() {
    let cache_dir = tempdir().unwrap();
    let rom_dir = tempdir().unwrap();
    let image = write_image(rom_dir.path(), &[0x200, 0x900]);
    let manager = manager_for(cache_dir.path());

    let controller = ScanController::new(
        &image,
        ScanConfig::new(test_params()),
        Arc::new(MarkerCodec::new()),
        Arc::new(Collector::default()),
    )
    .with_cache(Arc::clone(&manager));
    controller.start().unwrap();
    controller.join();
    assert_eq!(controller.state(), ScanState::Completed);

    let progress = manager.checkpoints().load(&image, &test_params()).unwrap();
    assert!(progress.completed);
    assert_eq!(progress.found.len(), 2);

    // A second run restores from the completed checkpoint without probing
    // a single offset.
    let codec = Arc::new(MarkerCodec::new());
    let observer = Arc::new(Collector::default());
    let second = ScanController::new(
        &image,
        ScanConfig::new(test_params()),
        Arc::clone(&codec) as Arc<dyn SpriteCodec>,
        Arc::clone(&observer) as Arc<dyn ScanObserver>,
    )
    .with_cache(Arc::clone(&manager));
    second.start().unwrap();
    second.join();

    assert_eq!(second.state(), ScanState::Completed);
    assert_eq!(observer.found_offsets(), vec![0x200, 0x900]);
    assert!(codec.probed().is_empty());
}

#[test]
fn test_split_scan_equals_uninterrupted_scan() {
    let rom_dir = tempdir().unwrap();
    let image = write_image(rom_dir.path(), &[0x200, 0x500, 0x900, 0xD00]);

    // Reference: one uninterrupted, uncached scan.
    let reference = ScanController::new(
        &image,
        ScanConfig::new(test_params()),
        Arc::new(MarkerCodec::new()),
        Arc::new(Collector::default()),
    );
    reference.start().unwrap();
    reference.join();
    let full_offsets: Vec<u64> = reference.outcome().unwrap().found().iter().map(|s| s.offset).collect();

    // Session 1: stop roughly halfway through.
    let cache_dir = tempdir().unwrap();
    let manager = manager_for(cache_dir.path());
    let stop = Arc::new(AtomicBool::new(false));
    let first = ScanController::new(
        &image,
        ScanConfig::new(test_params()),
        Arc::new(MarkerCodec::new()),
        Arc::new(Collector::stopping_after(8, Arc::clone(&stop))),
    )
    .with_cache(Arc::clone(&manager))
    .with_stop_flag(stop);
    first.start().unwrap();
    first.join();
    assert_eq!(first.state(), ScanState::Stopped);

    let checkpoint = manager.checkpoints().load(&image, &test_params()).unwrap();
    assert!(!checkpoint.completed);
    let resume_point = checkpoint.current_offset;

    // Session 2: a fresh controller resumes and completes.
    let codec = Arc::new(MarkerCodec::new());
    let observer = Arc::new(Collector::default());
    let second = ScanController::new(
        &image,
        ScanConfig::new(test_params()),
        Arc::clone(&codec) as Arc<dyn SpriteCodec>,
        Arc::clone(&observer) as Arc<dyn ScanObserver>,
    )
    .with_cache(Arc::clone(&manager));
    second.start().unwrap();
    second.join();
    assert_eq!(second.state(), ScanState::Completed);

    // Nothing below the checkpoint was re-treated as unscanned.
    let probed = codec.probed();
    assert!(!probed.is_empty());
    assert_eq!(*probed.iter().min().unwrap() as u64, resume_point + 0x100);

    // The split scan found exactly what the uninterrupted scan found.
    let split_offsets: Vec<u64> = second.outcome().unwrap().found().iter().map(|s| s.offset).collect();
    assert_eq!(split_offsets, full_offsets);

    // Session 1's results were re-emitted to session 2's observer before
    // scanning resumed.
    let emitted = observer.found_offsets();
    for sprite in &checkpoint.found {
        assert!(emitted.contains(&sprite.offset));
    }
}

#[test]
fn test_seeded_checkpoint_resumes_at_next_step() {
    let cache_dir = tempdir().unwrap();
    let rom_dir = tempdir().unwrap();

    let mut data = vec![0u8; 0x2000];
    data[0x1200] = MARKER;
    let image = rom_dir.path().join("game.sfc");
    fs::write(&image, data).unwrap();

    let params = ScanParams {
        start: 0x0000,
        end: 0x2000,
        step: 0x100,
    };
    let manager = manager_for(cache_dir.path());
    let seeded = vec![FoundSprite {
        offset: 0x0900,
        compressed_size: 0x100,
        decompressed_size: 0x400,
        tile_count: 32,
        quality: 0.75,
    }];
    assert!(manager.checkpoints().save(&image, &params, &seeded, 0x0900, false));

    let codec = Arc::new(MarkerCodec::new());
    let observer = Arc::new(Collector::default());
    let mut config = ScanConfig::new(params);
    config.min_quality = 0.5;
    let controller = ScanController::new(
        &image,
        config,
        Arc::clone(&codec) as Arc<dyn SpriteCodec>,
        Arc::clone(&observer) as Arc<dyn ScanObserver>,
    )
    .with_cache(Arc::clone(&manager));
    controller.start().unwrap();
    controller.join();

    // Resumed at checkpoint + step, never earlier.
    assert_eq!(*codec.probed().iter().min().unwrap(), 0x0A00);

    // Final results merge the seeded sprite with the newly found one.
    let offsets: Vec<u64> = controller.outcome().unwrap().found().iter().map(|s| s.offset).collect();
    assert_eq!(offsets, vec![0x0900, 0x1200]);

    // The resumption status was surfaced to observers.
    let statuses = observer.statuses.lock().unwrap();
    assert!(statuses.iter().any(|s| s.starts_with("Resuming from")));
}

#[test]
fn test_preset_stop_flag_prevents_any_probing() {
    let rom_dir = tempdir().unwrap();
    let image = write_image(rom_dir.path(), &[0x200]);
    let codec = Arc::new(MarkerCodec::new());

    let stop = Arc::new(AtomicBool::new(true));
    let controller = ScanController::new(
        &image,
        ScanConfig::new(test_params()),
        Arc::clone(&codec) as Arc<dyn SpriteCodec>,
        Arc::new(Collector::default()),
    )
    .with_stop_flag(stop);
    controller.start().unwrap();
    controller.join();

    assert_eq!(controller.state(), ScanState::Stopped);
    assert!(codec.probed().is_empty());
}

#[test]
fn test_pause_holds_progress_and_resume_completes() {
    let rom_dir = tempdir().unwrap();
    let image = write_image(rom_dir.path(), &[0x200, 0x900]);
    let observer = Arc::new(Collector::default());

    let controller = ScanController::new(
        &image,
        ScanConfig::new(test_params()),
        Arc::new(MarkerCodec::with_delay(Duration::from_millis(5))),
        Arc::clone(&observer) as Arc<dyn ScanObserver>,
    );
    controller.start().unwrap();
    controller.pause();
    assert_eq!(controller.state(), ScanState::Paused);

    // While paused, progress stalls (at most the in-flight iteration lands).
    std::thread::sleep(Duration::from_millis(30));
    let held = observer.progress.lock().unwrap().len();
    std::thread::sleep(Duration::from_millis(60));
    let after = observer.progress.lock().unwrap().len();
    assert!(after <= held + 1);

    controller.resume();
    assert_eq!(controller.state(), ScanState::Running);
    controller.join();

    // Nothing accumulated was lost across the pause.
    assert_eq!(controller.state(), ScanState::Completed);
    assert_eq!(observer.found_offsets(), vec![0x200, 0x900]);
    assert_eq!(observer.finished.load(Ordering::SeqCst), 1);
}

#[test]
fn test_failure_still_signals_completion() {
    let rom_dir = tempdir().unwrap();
    let missing = rom_dir.path().join("missing.sfc");
    let observer = Arc::new(Collector::default());

    let controller = ScanController::new(
        &missing,
        ScanConfig::new(test_params()),
        Arc::new(MarkerCodec::new()),
        Arc::clone(&observer) as Arc<dyn ScanObserver>,
    );
    controller.start().unwrap();
    controller.join();

    assert_eq!(controller.state(), ScanState::Failed);
    assert!(matches!(
        controller.outcome(),
        Some(ScanOutcome::Failed { .. })
    ));
    // Observers never hang waiting for a completion that does not arrive.
    assert_eq!(observer.finished.load(Ordering::SeqCst), 1);
}

#[test]
fn test_stopped_scan_writes_exit_checkpoint() {
    let cache_dir = tempdir().unwrap();
    let rom_dir = tempdir().unwrap();
    let image = write_image(rom_dir.path(), &[0x200, 0x900]);
    let manager = manager_for(cache_dir.path());

    let stop = Arc::new(AtomicBool::new(false));
    let observer = Arc::new(Collector::stopping_after(6, Arc::clone(&stop)));
    let controller = ScanController::new(
        &image,
        ScanConfig::new(test_params()),
        Arc::new(MarkerCodec::new()),
        Arc::clone(&observer) as Arc<dyn ScanObserver>,
    )
    .with_cache(Arc::clone(&manager))
    .with_stop_flag(stop);
    controller.start().unwrap();
    controller.join();
    assert_eq!(controller.state(), ScanState::Stopped);

    // The exit checkpoint was written unconditionally, not completed.
    let progress = manager.checkpoints().load(&image, &test_params()).unwrap();
    assert!(!progress.completed);
    assert!(progress.found.iter().any(|s| s.offset == 0x200));

    // Double start on the same controller is rejected.
    assert!(controller.start().is_err());
}

#[test]
fn test_uncached_controller_writes_no_files() {
    let rom_dir = tempdir().unwrap();
    let image = write_image(rom_dir.path(), &[0x200]);

    let controller = ScanController::new(
        &image,
        ScanConfig::new(test_params()),
        Arc::new(MarkerCodec::new()),
        Arc::new(Collector::default()),
    );
    controller.start().unwrap();
    controller.join();
    assert_eq!(controller.state(), ScanState::Completed);

    // Only the image itself lives in the directory.
    assert_eq!(fs::read_dir(rom_dir.path()).unwrap().count(), 1);
}
