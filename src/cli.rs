//! Command-line interface definitions.
//!
//! All CLI arguments, subcommands, and options via the clap derive API:
//! global options (verbosity, cache overrides) plus subcommands for
//! scanning, suggestions, and cache administration.
//!
//! # Example
//!
//! ```bash
//! # Scan a ROM over its default range; resumes automatically
//! romscan scan game.sfc
//!
//! # Scan a specific range with JSON output for scripting
//! romscan scan game.sfc --start 0xC0000 --end 0xC1000 --output json
//!
//! # Offsets worth inspecting next, mined from all cached evidence
//! romscan suggest game.sfc --limit 5
//!
//! # Cache administration
//! romscan stats
//! romscan clear --older-than 30
//! ```

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Resumable ROM sprite scanner with a content-addressed result cache.
///
/// romscan looks for compressed sprite data at candidate byte offsets in a
/// ROM image. Results, previews, and in-flight scan progress are cached on
/// disk, keyed by the ROM's content hash, so repeated scans are cheap and
/// an interrupted scan resumes exactly where it stopped.
#[derive(Debug, Parser)]
#[command(name = "romscan")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Increase verbosity level (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true, env = "NO_COLOR")]
    pub no_color: bool,

    /// Cache directory override
    #[arg(long, global = true, value_name = "DIR")]
    pub cache_dir: Option<PathBuf>,

    /// Disable the cache for this invocation
    #[arg(long, global = true)]
    pub no_cache: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Scan a ROM image for compressed sprite data
    Scan(ScanArgs),
    /// Rank cached evidence into offsets worth inspecting next
    Suggest(SuggestArgs),
    /// Show cache statistics
    Stats,
    /// Remove cache entries
    Clear(ClearArgs),
}

/// Arguments for the scan subcommand.
#[derive(Debug, Args)]
pub struct ScanArgs {
    /// Path to the ROM image to scan
    #[arg(value_name = "IMAGE")]
    pub image: PathBuf,

    /// First candidate offset (hex with 0x prefix, or decimal)
    #[arg(long, value_name = "OFFSET", value_parser = parse_offset)]
    pub start: Option<u64>,

    /// End of the scan range, exclusive (hex or decimal)
    #[arg(long, value_name = "OFFSET", value_parser = parse_offset)]
    pub end: Option<u64>,

    /// Distance between candidate offsets (hex or decimal)
    #[arg(long, value_name = "STEP", default_value = "0x100", value_parser = parse_offset)]
    pub step: u64,

    /// Minimum quality for a candidate to be accepted
    #[arg(long, value_name = "SCORE", default_value = "0.5")]
    pub min_quality: f64,

    /// Discard any existing checkpoint and scan from the start
    #[arg(long)]
    pub fresh: bool,

    /// Output format
    #[arg(short, long, value_enum, default_value = "text")]
    pub output: OutputFormat,
}

/// Arguments for the suggest subcommand.
#[derive(Debug, Args)]
pub struct SuggestArgs {
    /// Path to the ROM image
    #[arg(value_name = "IMAGE")]
    pub image: PathBuf,

    /// Maximum number of suggestions
    #[arg(long, value_name = "N", default_value = "10")]
    pub limit: usize,

    /// Offset to exclude, typically the one currently being inspected
    #[arg(long, value_name = "OFFSET", value_parser = parse_offset)]
    pub exclude: Option<u64>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "text")]
    pub output: OutputFormat,
}

/// Arguments for the clear subcommand.
#[derive(Debug, Args)]
pub struct ClearArgs {
    /// Only remove entries older than this many days
    #[arg(long, value_name = "DAYS")]
    pub older_than: Option<u32>,

    /// Only remove scan checkpoints, leaving results and previews
    #[arg(long)]
    pub checkpoints_only: bool,
}

/// Output formats for scan and suggest results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text
    Text,
    /// JSON for scripting
    Json,
}

/// Parse an offset in `0x` hex or decimal form.
fn parse_offset(value: &str) -> Result<u64, String> {
    let value = value.trim();
    let parsed = if let Some(hex) = value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        u64::from_str_radix(hex, 16)
    } else {
        value.parse()
    };
    parsed.map_err(|_| format!("Invalid offset: '{}' (use 0x hex or decimal)", value))
}
