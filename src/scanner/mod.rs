//! Guarded Scanner Invocation
//!
//! This module turns two untrusted strings (targets and options) into a
//! parsed nmap report, or a typed [`ScanError`].
//!
//! # Pipeline
//!
//! 1. `targets`: every target token must be a well-formed address, network,
//!    range or hostname
//! 2. `options`: every flag must be on a closed allow-list with its
//!    arguments present
//! 3. `command`: validated tokens become `<nmap> <options> -oX - <targets>`
//! 4. `runner`: the argument vector runs as a direct child with a deadline
//! 5. `parser`: stdout is decoded into an ordered mapping
//!
//! Validation failures are returned before anything is spawned. No stage is
//! retried, and no child process outlives the call that spawned it.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let report = scanguard::scanner::scan("scanme.nmap.org", "-sV -p 22", Duration::from_secs(120)).await?;
//!     println!("{}", serde_json::to_string_pretty(&report)?);
//!     Ok(())
//! }
//! ```

mod command;
mod error;
mod options;
mod parser;
mod runner;
mod targets;
mod timeout;
mod tokenize;

#[cfg(test)]
pub(crate) mod testutil;

pub use command::{ScanCommand, MACHINE_OUTPUT_FLAG, MACHINE_OUTPUT_TARGET};
pub use error::ScanError;
pub use options::{validate_options, AllowListError, OptionAllowList, OptionList, DEFAULT_ALLOW_LIST};
pub use parser::{parse, HostsSummary, ScanResult};
pub use runner::{ExecutionOutcome, ProcessRunner, DEFAULT_MAX_OUTPUT_BYTES};
pub use targets::{validate_targets, TargetList, TargetSpec};
pub use timeout::{ScanTimeout, DEFAULT_TIMEOUT_SECS};
pub use tokenize::tokenize;

use std::time::{Duration, Instant};
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::config::ScannerConfig;
use crate::metrics;

/// Default scanner executable
pub const DEFAULT_BINARY: &str = "nmap";

/// Upper bound on caller-requested deadlines (1 hour)
pub const DEFAULT_MAX_TIMEOUT_SECS: u64 = 3600;

/// Longest stderr excerpt written to logs
const STDERR_LOG_EXCERPT: usize = 512;

/// Validates, runs and decodes scans.
///
/// Holds only read-only configuration, so one instance can serve any number
/// of concurrent requests.
#[derive(Debug, Clone)]
pub struct Scanner {
    binary: String,
    allow_list: OptionAllowList,
    runner: ProcessRunner,
    default_timeout: ScanTimeout,
    max_timeout: Duration,
}

impl Default for Scanner {
    fn default() -> Self {
        Self {
            binary: DEFAULT_BINARY.to_string(),
            allow_list: DEFAULT_ALLOW_LIST.clone(),
            runner: ProcessRunner::new(),
            default_timeout: ScanTimeout::default(),
            max_timeout: Duration::from_secs(DEFAULT_MAX_TIMEOUT_SECS),
        }
    }
}

impl Scanner {
    /// Build a scanner from configuration.
    ///
    /// # Errors
    ///
    /// Fails if `extra_options` names a flag that can never be allowed.
    pub fn from_config(config: &ScannerConfig) -> Result<Self, AllowListError> {
        Ok(Self {
            binary: config.binary.clone(),
            allow_list: OptionAllowList::with_extra(&config.extra_options)?,
            runner: ProcessRunner::with_max_output(config.max_output_bytes),
            default_timeout: ScanTimeout::from_secs(config.default_timeout_secs),
            max_timeout: Duration::from_secs(config.max_timeout_secs),
        })
    }

    /// Use a different scanner executable
    pub fn with_binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }

    pub fn binary(&self) -> &str {
        &self.binary
    }

    pub fn allow_list(&self) -> &OptionAllowList {
        &self.allow_list
    }

    pub fn default_timeout(&self) -> ScanTimeout {
        self.default_timeout
    }

    /// Deadline actually applied for a requested one
    pub fn effective_timeout(&self, requested: Option<Duration>) -> ScanTimeout {
        let timeout = requested.map(ScanTimeout::new).unwrap_or(self.default_timeout);
        if timeout.duration() > self.max_timeout {
            warn!(
                requested_secs = timeout.duration().as_secs(),
                max_secs = self.max_timeout.as_secs(),
                "Requested timeout above maximum, clamping"
            );
        }
        timeout.clamp_to(self.max_timeout)
    }

    /// True if both strings would pass validation
    pub fn validate(&self, targets: &str, options: &str) -> bool {
        self.prepare(targets, options).is_ok()
    }

    /// Validate both strings and build the command.
    ///
    /// The tokens placed in the command are the exact tokens that were
    /// validated.
    pub fn prepare(&self, targets: &str, options: &str) -> Result<ScanCommand, ScanError> {
        let targets = TargetList::parse(targets).ok_or(ScanError::InvalidInput)?;
        let options = self.allow_list.parse(options).ok_or(ScanError::InvalidInput)?;
        Ok(ScanCommand::new(self.binary.as_str(), &options, &targets))
    }

    /// Run the full pipeline.
    ///
    /// `timeout` defaults to the configured deadline and is capped at the
    /// configured maximum.
    pub async fn scan(
        &self,
        targets: &str,
        options: &str,
        timeout: Option<Duration>,
    ) -> Result<ScanResult, ScanError> {
        self.scan_with_id(Uuid::new_v4(), targets, options, timeout).await
    }

    /// [`Scanner::scan`] with a caller-chosen correlation id for the log span
    pub async fn scan_with_id(
        &self,
        scan_id: Uuid,
        targets: &str,
        options: &str,
        timeout: Option<Duration>,
    ) -> Result<ScanResult, ScanError> {
        let span = info_span!("scan", %scan_id);

        async move {
            let _active = metrics::ActiveScan::start();
            let started = Instant::now();

            let result = self.execute(targets, options, timeout).await;

            let outcome = match &result {
                Ok(_) => "succeeded",
                Err(e) => e.kind(),
            };
            metrics::record_scan(outcome, started.elapsed());
            result
        }
        .instrument(span)
        .await
    }

    async fn execute(
        &self,
        targets: &str,
        options: &str,
        timeout: Option<Duration>,
    ) -> Result<ScanResult, ScanError> {
        let command = self.prepare(targets, options).inspect_err(|_| {
            warn!(targets = %targets, options = %options, "Rejected scan request");
        })?;

        let timeout = self.effective_timeout(timeout);
        info!(
            targets = %targets,
            options = %options,
            timeout_secs = timeout.duration().as_secs(),
            "Starting scan"
        );

        let outcome = self.runner.run(&command, timeout).await.inspect_err(|e| {
            error!(binary = %self.binary, error = %e, "Scanner could not be run");
        })?;

        if outcome.timed_out {
            error!(targets = %targets, "Scan timed out");
            return Err(ScanError::TimedOut(timeout.duration()));
        }

        if !outcome.success() {
            let stderr = outcome.stderr.trim();
            error!(
                targets = %targets,
                options = %options,
                exit_code = ?outcome.exit_code,
                stderr = %excerpt(stderr, STDERR_LOG_EXCERPT),
                "Scan failed"
            );
            let detail = if stderr.is_empty() {
                match outcome.exit_code {
                    Some(code) => format!("scanner exited with status {}", code),
                    None => "scanner terminated by signal".to_string(),
                }
            } else {
                stderr.to_string()
            };
            return Err(ScanError::ExecutionFailed(detail));
        }

        let result = parse(&outcome.stdout).inspect_err(|e| {
            error!(error = %e, stdout_bytes = outcome.stdout.len(), "Failed to parse scanner output");
        })?;

        match result.hosts_summary() {
            Some(hosts) => info!(
                hosts_up = hosts.up,
                hosts_total = hosts.total,
                duration_ms = outcome.duration_ms,
                "Scan completed successfully"
            ),
            None => info!(duration_ms = outcome.duration_ms, "Scan completed successfully"),
        }
        Ok(result)
    }
}

/// Scan with the default scanner configuration.
///
/// Equivalent to `Scanner::default().scan(targets, options, Some(timeout))`.
pub async fn scan(targets: &str, options: &str, timeout: Duration) -> Result<ScanResult, ScanError> {
    Scanner::default().scan(targets, options, Some(timeout)).await
}

fn excerpt(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
