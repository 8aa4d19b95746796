//! Terminal progress reporting for scans.
//!
//! An `indicatif`-backed [`ScanObserver`] for non-quiet CLI runs: one
//! progress bar over the candidate range, found sprites printed above it,
//! checkpoint saves surfaced in the bar message.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};

use crate::cache::checkpoint::FoundSprite;
use crate::scan::observer::{ScanObserver, ScanOutcome};

/// Progress reporter for CLI scans.
pub struct ConsoleObserver {
    bar: Mutex<Option<ProgressBar>>,
    found: AtomicUsize,
    quiet: bool,
}

impl ConsoleObserver {
    /// Create a reporter. With `quiet`, nothing is displayed.
    #[must_use]
    pub fn new(quiet: bool) -> Self {
        Self {
            bar: Mutex::new(None),
            found: AtomicUsize::new(0),
            quiet,
        }
    }

    fn bar_style() -> ProgressStyle {
        ProgressStyle::with_template(
            "[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg} (ETA: {eta})",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█>-")
    }

    fn with_bar(&self, f: impl FnOnce(&ProgressBar)) {
        if let Some(bar) = self.bar.lock().unwrap().as_ref() {
            f(bar);
        }
    }
}

impl ScanObserver for ConsoleObserver {
    fn on_progress(&self, current: u64, total: u64) {
        if self.quiet {
            return;
        }
        let mut guard = self.bar.lock().unwrap();
        let bar = guard.get_or_insert_with(|| {
            let bar = ProgressBar::new(total);
            bar.set_style(Self::bar_style());
            bar.set_message("Scanning");
            bar.enable_steady_tick(Duration::from_millis(100));
            bar
        });
        bar.set_position(current);
    }

    fn on_sprite_found(&self, sprite: &FoundSprite) {
        let count = self.found.fetch_add(1, Ordering::SeqCst) + 1;
        if self.quiet {
            return;
        }
        let line = format!(
            "Found sprite at 0x{:06X}: quality {:.2}, {} tiles ({} total)",
            sprite.offset, sprite.quality, sprite.tile_count, count
        );
        let guard = self.bar.lock().unwrap();
        match guard.as_ref() {
            Some(bar) => bar.println(line),
            None => println!("{}", line),
        }
    }

    fn on_status(&self, message: &str) {
        if self.quiet {
            return;
        }
        let guard = self.bar.lock().unwrap();
        match guard.as_ref() {
            Some(bar) => bar.set_message(message.to_string()),
            None => eprintln!("{}", message),
        }
    }

    fn on_checkpoint_saved(&self, percent: u8) {
        if self.quiet {
            return;
        }
        self.with_bar(|bar| bar.set_message(format!("Checkpoint saved ({}%)", percent)));
    }

    fn on_paused(&self) {
        if !self.quiet {
            self.with_bar(|bar| bar.set_message("Paused"));
        }
    }

    fn on_resumed(&self) {
        if !self.quiet {
            self.with_bar(|bar| bar.set_message("Scanning"));
        }
    }

    fn on_finished(&self, outcome: &ScanOutcome) {
        if self.quiet {
            return;
        }
        let guard = self.bar.lock().unwrap();
        if let Some(bar) = guard.as_ref() {
            match outcome {
                ScanOutcome::Completed { found } => {
                    bar.finish_with_message(format!("Scan complete: {} sprites", found.len()));
                }
                ScanOutcome::Stopped { found } => {
                    bar.abandon_with_message(format!("Scan stopped: {} sprites so far", found.len()));
                }
                ScanOutcome::Failed { error } => {
                    bar.abandon_with_message(format!("Scan failed: {}", error));
                }
            }
        }
    }
}
