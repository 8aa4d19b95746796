//! Exit codes and top-level error reporting.

/// Exit codes for the romscan CLI.
///
/// - 0: Success (scan completed, sprites found)
/// - 1: General error (unexpected failure)
/// - 2: No results (scan completed, nothing found)
/// - 130: Interrupted by user (Ctrl+C)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    /// Scan completed and found at least one sprite.
    Success = 0,
    /// An unexpected error occurred.
    GeneralError = 1,
    /// Scan completed but found nothing.
    NoResults = 2,
    /// Scan was interrupted by the user.
    Interrupted = 130,
}

impl ExitCode {
    /// Get the numeric exit code.
    #[must_use]
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// Machine-readable code prefix for error output.
    #[must_use]
    pub fn code_prefix(self) -> &'static str {
        match self {
            Self::Success => "RS000",
            Self::GeneralError => "RS001",
            Self::NoResults => "RS002",
            Self::Interrupted => "RS130",
        }
    }
}
