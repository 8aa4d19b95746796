//! Observer interface for scan lifecycle events.

use crate::cache::checkpoint::FoundSprite;

/// How a scan ended.
#[derive(Debug, Clone)]
pub enum ScanOutcome {
    /// The full range was traversed.
    Completed {
        /// Everything found, cached results included.
        found: Vec<FoundSprite>,
    },
    /// The scan was stopped before covering the full range.
    Stopped {
        /// Everything found up to the stop point.
        found: Vec<FoundSprite>,
    },
    /// An unexpected error ended the scan.
    Failed {
        /// Human-readable failure description.
        error: String,
    },
}

impl ScanOutcome {
    /// The found results, when the outcome carries any.
    #[must_use]
    pub fn found(&self) -> &[FoundSprite] {
        match self {
            Self::Completed { found } | Self::Stopped { found } => found,
            Self::Failed { .. } => &[],
        }
    }
}

/// Receiver of scan progress and lifecycle events.
///
/// All methods have no-op defaults; implement only what the UI needs.
/// Methods are invoked from the scan worker thread. Exactly one
/// `on_finished` call is delivered per scan, even when the scan fails —
/// observers never hang waiting for a completion that does not arrive.
pub trait ScanObserver: Send + Sync {
    /// Position within the scan, as (candidates processed, total candidates).
    fn on_progress(&self, _current: u64, _total: u64) {}

    /// A sprite was found, or restored from a checkpoint during resumption.
    fn on_sprite_found(&self, _sprite: &FoundSprite) {}

    /// Human-readable status text, e.g. cache lookup progress.
    fn on_status(&self, _message: &str) {}

    /// A checkpoint was written at the given progress percentage.
    fn on_checkpoint_saved(&self, _percent: u8) {}

    /// The scan worker is idling on a pause request.
    fn on_paused(&self) {}

    /// The scan worker resumed after a pause.
    fn on_resumed(&self) {}

    /// Terminal event: the scan finished, one way or another.
    fn on_finished(&self, _outcome: &ScanOutcome) {}
}

/// Observer that ignores everything.
pub struct NullObserver;

impl ScanObserver for NullObserver {}
