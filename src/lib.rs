//! romscan - Resumable ROM Sprite Scanner
//!
//! Scans ROM images for compressed sprite data at candidate byte offsets,
//! with a content-addressed, file-backed cache so repeated scans are cheap
//! and interrupted scans resume exactly where they stopped.

pub mod cache;
pub mod cli;
pub mod config;
pub mod error;
pub mod logging;
pub mod progress;
pub mod scan;
pub mod signal;
pub mod suggest;

use std::fs;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use bytesize::ByteSize;
use yansi::Paint;

use crate::cache::checkpoint::{FoundSprite, ScanParams};
use crate::cache::CacheManager;
use crate::cli::{Cli, ClearArgs, Commands, OutputFormat, ScanArgs, SuggestArgs};
use crate::config::FileConfigSource;
use crate::error::ExitCode;
use crate::progress::ConsoleObserver;
use crate::scan::{ScanConfig, ScanController, ScanObserver, ScanOutcome, ZlibCodec};

/// Default first candidate offset: skip headers and early data.
const DEFAULT_SCAN_START: u64 = 0x40000;

/// Default cap on the scan range end.
const DEFAULT_SCAN_CAP: u64 = 0x400000;

/// Run the application with parsed CLI arguments.
pub fn run_app(cli: Cli) -> Result<ExitCode> {
    logging::init_logging(cli.verbose, cli.quiet);
    if cli.no_color {
        yansi::disable();
    }

    let manager = Arc::new(build_cache_manager(&cli));

    match cli.command {
        Commands::Scan(args) => cmd_scan(&manager, args, cli.quiet),
        Commands::Suggest(args) => cmd_suggest(&manager, &args),
        Commands::Stats => cmd_stats(&manager),
        Commands::Clear(args) => cmd_clear(&manager, &args),
    }
}

/// Build the one cache handle for this process.
///
/// CLI overrides are folded into the loaded configuration; without them the
/// manager keeps the file source so `refresh()` would see config changes.
fn build_cache_manager(cli: &Cli) -> CacheManager {
    if cli.no_cache || cli.cache_dir.is_some() {
        let mut config = FileConfigSource::new().load();
        if cli.no_cache {
            config.enabled = false;
        }
        if let Some(dir) = &cli.cache_dir {
            config.location = Some(dir.clone());
        }
        CacheManager::with_config(config)
    } else {
        CacheManager::new(Box::new(FileConfigSource::new()))
    }
}

fn cmd_scan(manager: &Arc<CacheManager>, args: ScanArgs, quiet: bool) -> Result<ExitCode> {
    let image_len = fs::metadata(&args.image)
        .with_context(|| format!("Cannot read image {}", args.image.display()))?
        .len();

    if args.step == 0 {
        bail!("Scan step must be non-zero");
    }

    let end = args.end.unwrap_or_else(|| image_len.min(DEFAULT_SCAN_CAP));
    let start = args
        .start
        .unwrap_or(if DEFAULT_SCAN_START < end { DEFAULT_SCAN_START } else { 0 });
    if start >= end {
        bail!("Empty scan range: 0x{:X}..0x{:X}", start, end);
    }

    let params = ScanParams {
        start,
        end,
        step: args.step,
    };
    log::info!(
        "Scanning {} from 0x{:X} to 0x{:X} step 0x{:X}",
        args.image.display(),
        start,
        end,
        args.step
    );

    if args.fresh {
        let removed = manager.checkpoints().clear(Some(&args.image), Some(&params));
        if removed > 0 {
            log::info!("Discarded existing checkpoint for this scan range");
        }
    }

    let mut config = ScanConfig::new(params);
    config.min_quality = args.min_quality;

    let handler = signal::install_handler()?;
    let show_progress = !quiet && args.output == OutputFormat::Text;
    let observer: Arc<dyn ScanObserver> = Arc::new(ConsoleObserver::new(!show_progress));

    let controller = ScanController::new(&args.image, config, Arc::new(ZlibCodec), observer)
        .with_cache(Arc::clone(manager))
        .with_stop_flag(handler.get_flag());
    controller.start()?;
    controller.join();

    let outcome = controller
        .outcome()
        .context("Scan worker finished without an outcome")?;
    match outcome {
        ScanOutcome::Completed { found } => {
            print_results(&found, args.output)?;
            Ok(if found.is_empty() {
                ExitCode::NoResults
            } else {
                ExitCode::Success
            })
        }
        ScanOutcome::Stopped { found } => {
            print_results(&found, args.output)?;
            Ok(ExitCode::Interrupted)
        }
        ScanOutcome::Failed { error } => bail!("Scan failed: {}", error),
    }
}

fn print_results(found: &[FoundSprite], format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(found)?),
        OutputFormat::Text => {
            if found.is_empty() {
                println!("No sprites found.");
            } else {
                println!("\n{} sprites found:", found.len());
                for sprite in found {
                    println!(
                        "  {}  quality {:.2}  {:>4} tiles  {} compressed",
                        format!("0x{:06X}", sprite.offset).cyan(),
                        sprite.quality,
                        sprite.tile_count,
                        ByteSize(u64::from(sprite.compressed_size))
                    );
                }
            }
        }
    }
    Ok(())
}

fn cmd_suggest(manager: &Arc<CacheManager>, args: &SuggestArgs) -> Result<ExitCode> {
    let suggestions = manager
        .suggestions()
        .suggest(&args.image, args.exclude, args.limit);

    match args.output {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&suggestions)?),
        OutputFormat::Text => {
            if suggestions.is_empty() {
                println!("No cached evidence for this image yet.");
            } else {
                println!("Offsets worth inspecting next:");
                for suggestion in &suggestions {
                    let sources: Vec<&str> = suggestion
                        .sources
                        .iter()
                        .map(|source| source.label())
                        .collect();
                    println!(
                        "  {}  confidence {:.2}  [{}]",
                        format!("0x{:06X}", suggestion.offset).cyan(),
                        suggestion.confidence,
                        sources.join(", ")
                    );
                }
            }
        }
    }

    Ok(if suggestions.is_empty() {
        ExitCode::NoResults
    } else {
        ExitCode::Success
    })
}

fn cmd_stats(manager: &Arc<CacheManager>) -> Result<ExitCode> {
    let stats = manager.stats();

    println!("Cache directory: {}", stats.directory.display());
    println!(
        "Status: {}",
        if stats.enabled {
            "enabled".green().to_string()
        } else {
            "disabled".red().to_string()
        }
    );
    println!(
        "Entries: {} files, {}",
        stats.total_files,
        ByteSize(stats.total_size_bytes)
    );
    println!("  sprite locations:  {}", stats.location_caches);
    println!("  source info:       {}", stats.source_info_caches);
    println!("  scan checkpoints:  {}", stats.scan_progress_caches);
    println!("  previews:          {}", stats.preview_caches);
    println!("  preview batches:   {}", stats.preview_batch_caches);

    Ok(ExitCode::Success)
}

fn cmd_clear(manager: &Arc<CacheManager>, args: &ClearArgs) -> Result<ExitCode> {
    let removed = if args.checkpoints_only {
        manager.checkpoints().clear(None, None)
    } else {
        manager.clear(args.older_than)
    };
    println!("Removed {} cache files.", removed);
    Ok(ExitCode::Success)
}
