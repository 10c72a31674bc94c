//! Scan Error Types
//!
//! Every terminal failure state of the scan pipeline maps to exactly one
//! variant of [`ScanError`].

use std::time::Duration;

/// Error types for scan operations
#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    /// Target or option string failed validation.
    ///
    /// Carries no detail: callers are untrusted and must not learn which
    /// token or which validator rejected the request.
    #[error("Invalid target or option specification")]
    InvalidInput,

    /// Scanner executable is not installed on the host
    #[error("Scanner executable '{0}' not found")]
    ToolNotFound(String),

    /// Scanner ran and failed (carries captured stderr)
    #[error("Scan failed: {0}")]
    ExecutionFailed(String),

    /// Deadline exceeded; the child process was killed
    #[error("Scan timed out after {}s", .0.as_secs())]
    TimedOut(Duration),

    /// Output was captured but could not be decoded
    #[error("Failed to parse scan output: {0}")]
    ParseFailed(String),
}

impl ScanError {
    /// Stable label for HTTP bodies and metric labels
    pub fn kind(&self) -> &'static str {
        match self {
            ScanError::InvalidInput => "invalid_input",
            ScanError::ToolNotFound(_) => "tool_not_found",
            ScanError::ExecutionFailed(_) => "execution_failed",
            ScanError::TimedOut(_) => "timed_out",
            ScanError::ParseFailed(_) => "parse_failed",
        }
    }
}
