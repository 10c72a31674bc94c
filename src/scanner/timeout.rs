//! Scan Deadline Management
//!
//! Wall-clock deadlines for scanner child processes.

use std::time::Duration;
use tokio::time;

/// Default scan deadline in seconds
pub const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// Scan deadline
///
/// Measured from process start. Expiry means the child gets killed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanTimeout {
    /// The timeout duration
    duration: Duration,
}

impl Default for ScanTimeout {
    fn default() -> Self {
        Self::from_secs(DEFAULT_TIMEOUT_SECS)
    }
}

impl From<Duration> for ScanTimeout {
    fn from(duration: Duration) -> Self {
        Self::new(duration)
    }
}

impl ScanTimeout {
    /// Create a new scan timeout
    ///
    /// # Example
    ///
    /// ```
    /// use std::time::Duration;
    /// use scanguard::scanner::ScanTimeout;
    ///
    /// let timeout = ScanTimeout::new(Duration::from_secs(30));
    /// assert_eq!(timeout.duration(), Duration::from_secs(30));
    /// ```
    pub fn new(duration: Duration) -> Self {
        Self { duration }
    }

    /// Create a timeout from seconds
    pub fn from_secs(secs: u64) -> Self {
        Self::new(Duration::from_secs(secs))
    }

    /// Get the timeout duration
    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Cap the deadline at `max`
    pub fn clamp_to(self, max: Duration) -> Self {
        Self::new(self.duration.min(max))
    }

    /// Drive `future` until it completes or the deadline passes.
    ///
    /// Returns `None` on expiry. The future is dropped at that point, so any
    /// resources it owns are released.
    pub async fn run<F, T>(&self, future: F) -> Option<T>
    where
        F: std::future::Future<Output = T>,
    {
        time::timeout(self.duration, future).await.ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_default() {
        let timeout = ScanTimeout::default();
        assert_eq!(timeout.duration(), Duration::from_secs(300));
    }

    #[test]
    fn test_timeout_from_secs() {
        let timeout = ScanTimeout::from_secs(45);
        assert_eq!(timeout.duration(), Duration::from_secs(45));
    }

    #[test]
    fn test_timeout_clamp() {
        let max = Duration::from_secs(600);
        assert_eq!(
            ScanTimeout::from_secs(3600).clamp_to(max).duration(),
            max
        );
        assert_eq!(
            ScanTimeout::from_secs(60).clamp_to(max).duration(),
            Duration::from_secs(60)
        );
    }

    #[tokio::test]
    async fn test_timeout_run_success() {
        let timeout = ScanTimeout::from_secs(5);
        let result = timeout.run(async { "done" }).await;
        assert_eq!(result, Some("done"));
    }

    #[tokio::test]
    async fn test_timeout_run_expires() {
        let timeout = ScanTimeout::new(Duration::from_millis(50));
        let result = timeout
            .run(async {
                tokio::time::sleep(Duration::from_secs(2)).await;
            })
            .await;
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_timeout_run_just_in_time() {
        let timeout = ScanTimeout::from_secs(1);
        let result = timeout
            .run(async {
                tokio::time::sleep(Duration::from_millis(100)).await;
                42
            })
            .await;
        assert_eq!(result, Some(42));
    }
}
