use romscan::cache::{CacheManager, FoundSprite, ScanParams};
use romscan::config::CacheConfig;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::tempdir;

fn manager_for(dir: &Path) -> CacheManager {
    CacheManager::with_config(CacheConfig {
        enabled: true,
        location: Some(dir.to_path_buf()),
        expiration_days: 30,
    })
}

fn write_rom(dir: &Path) -> PathBuf {
    let rom = dir.join("game.sfc");
    fs::write(&rom, vec![0x42u8; 0x2000]).unwrap();
    rom
}

fn sprite(offset: u64) -> FoundSprite {
    FoundSprite {
        offset,
        compressed_size: 0x180,
        decompressed_size: 0x800,
        tile_count: 64,
        quality: 0.82,
    }
}

/// Cache a scan of [0xC0000, 0xC1000) step 0x100 with results at
/// 0xC0200/0xC0500/0xC0900 and currentOffset 0xC0900; a fresh process with
/// identical source and params recovers exactly those results and resumes
/// at 0xC0A00.
#[test]
fn test_cross_process_resume_scenario() {
    let cache_dir = tempdir().unwrap();
    let rom_dir = tempdir().unwrap();
    let rom = write_rom(rom_dir.path());

    let params = ScanParams {
        start: 0xC0000,
        end: 0xC1000,
        step: 0x100,
    };
    let found = vec![sprite(0xC0200), sprite(0xC0500), sprite(0xC0900)];

    {
        let first_process = manager_for(cache_dir.path());
        assert!(first_process
            .checkpoints()
            .save(&rom, &params, &found, 0xC0900, false));
    }

    let second_process = manager_for(cache_dir.path());
    let progress = second_process.checkpoints().load(&rom, &params).unwrap();

    assert_eq!(progress.found, found);
    assert_eq!(progress.current_offset, 0xC0900);
    assert!(!progress.completed);
    assert_eq!(progress.current_offset + params.step, 0xC0A00);
}

#[test]
fn test_identical_params_share_one_checkpoint() {
    let cache_dir = tempdir().unwrap();
    let rom_dir = tempdir().unwrap();
    let rom = write_rom(rom_dir.path());
    let manager = manager_for(cache_dir.path());

    let params = ScanParams {
        start: 0xC0000,
        end: 0xC1000,
        step: 0x100,
    };

    assert!(manager
        .checkpoints()
        .save(&rom, &params, &[sprite(0xC0200)], 0xC0200, false));
    assert!(manager
        .checkpoints()
        .save(&rom, &params, &[sprite(0xC0200), sprite(0xC0500)], 0xC0500, false));

    // Two saves, one file: the second wholly replaced the first.
    let checkpoint_files = fs::read_dir(cache_dir.path())
        .unwrap()
        .filter_map(Result::ok)
        .filter(|e| e.file_name().to_string_lossy().contains("_scan_progress_"))
        .count();
    assert_eq!(checkpoint_files, 1);
}

#[test]
fn test_differing_params_keep_independent_checkpoints() {
    let cache_dir = tempdir().unwrap();
    let rom_dir = tempdir().unwrap();
    let rom = write_rom(rom_dir.path());
    let manager = manager_for(cache_dir.path());

    let base = ScanParams {
        start: 0xC0000,
        end: 0xC1000,
        step: 0x100,
    };
    let narrower = ScanParams {
        end: 0xC0800,
        ..base
    };
    let finer = ScanParams { step: 0x80, ..base };

    assert!(manager
        .checkpoints()
        .save(&rom, &base, &[sprite(0xC0200)], 0xC0200, false));
    assert!(manager.checkpoints().save(&rom, &narrower, &[], 0xC0100, false));
    assert!(manager.checkpoints().save(&rom, &finer, &[], 0xC0080, false));

    assert_eq!(manager.checkpoints().load(&rom, &base).unwrap().found.len(), 1);
    assert!(manager.checkpoints().load(&rom, &narrower).unwrap().found.is_empty());
    assert!(manager.checkpoints().load(&rom, &finer).unwrap().found.is_empty());

    let checkpoint_files = fs::read_dir(cache_dir.path())
        .unwrap()
        .filter_map(Result::ok)
        .filter(|e| e.file_name().to_string_lossy().contains("_scan_progress_"))
        .count();
    assert_eq!(checkpoint_files, 3);
}

#[test]
fn test_checkpoint_offsets_monotonic_in_snapshot() {
    let cache_dir = tempdir().unwrap();
    let rom_dir = tempdir().unwrap();
    let rom = write_rom(rom_dir.path());
    let manager = manager_for(cache_dir.path());

    let params = ScanParams {
        start: 0,
        end: 0x1000,
        step: 0x100,
    };
    // Deliberately unordered input.
    let found = vec![sprite(0x900), sprite(0x200), sprite(0x500)];
    assert!(manager.checkpoints().save(&rom, &params, &found, 0x900, false));

    let offsets: Vec<u64> = manager
        .checkpoints()
        .load(&rom, &params)
        .unwrap()
        .found
        .iter()
        .map(|s| s.offset)
        .collect();
    assert!(offsets.windows(2).all(|w| w[0] <= w[1]));
}

#[test]
fn test_modified_rom_discards_checkpoint() {
    let cache_dir = tempdir().unwrap();
    let rom_dir = tempdir().unwrap();
    let rom = write_rom(rom_dir.path());
    let manager = manager_for(cache_dir.path());

    let params = ScanParams {
        start: 0xC0000,
        end: 0xC1000,
        step: 0x100,
    };
    assert!(manager
        .checkpoints()
        .save(&rom, &params, &[sprite(0xC0200)], 0xC0200, false));

    // Rewriting the ROM changes both mtime and content hash; either alone
    // would make the old checkpoint unreachable.
    std::thread::sleep(std::time::Duration::from_millis(20));
    fs::write(&rom, vec![0x43u8; 0x2000]).unwrap();

    assert!(manager.checkpoints().load(&rom, &params).is_none());
}

#[test]
fn test_clear_checkpoints_only_sweeps_by_convention() {
    let cache_dir = tempdir().unwrap();
    let rom_dir = tempdir().unwrap();
    let rom = write_rom(rom_dir.path());
    let manager = manager_for(cache_dir.path());

    let params = ScanParams {
        start: 0,
        end: 0x1000,
        step: 0x100,
    };
    assert!(manager.checkpoints().save(&rom, &params, &[], 0x100, false));
    assert!(manager
        .locations()
        .save(&rom, std::collections::BTreeMap::new(), None));

    assert_eq!(manager.checkpoints().clear(None, None), 1);
    // The locations entry is untouched.
    assert!(manager.locations().load(&rom).is_some());
}
