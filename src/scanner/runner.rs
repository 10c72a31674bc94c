//! Process Runner
//!
//! Executes a [`ScanCommand`] as a direct child process with a deadline.
//!
//! # Security
//!
//! - The argument vector goes straight to `execve`; no shell is involved
//! - stdin is closed; stdout and stderr are piped and drained concurrently
//! - The child is created with `kill_on_drop`, so dropping the runner future
//!   (caller cancellation) kills it; on deadline expiry it is killed and
//!   reaped explicitly
//! - On Unix the child leads its own process group, and the whole group is
//!   killed when `run` returns or is dropped, so helpers forked by the
//!   scanner (or by a wrapper script) do not survive it
//! - Captured output is capped to prevent memory exhaustion

use serde::Serialize;
use std::io::ErrorKind;
use std::process::Stdio;
use std::time::Instant;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tracing::{debug, info, warn};

use super::command::ScanCommand;
use super::error::ScanError;
use super::timeout::ScanTimeout;

/// Default cap on captured stdout/stderr (16 MiB each)
pub const DEFAULT_MAX_OUTPUT_BYTES: usize = 16 * 1024 * 1024;

/// Read buffer size for pipe draining
const READ_CHUNK: usize = 8192;

/// Result of running the scanner
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionOutcome {
    /// Exit code (None if killed or terminated by a signal)
    pub exit_code: Option<i32>,

    /// Captured standard output
    pub stdout: String,

    /// Captured standard error
    pub stderr: String,

    /// Whether the child was killed for exceeding its deadline
    pub timed_out: bool,

    /// Whether either stream exceeded the capture limit
    pub truncated: bool,

    /// Wall-clock duration in milliseconds
    pub duration_ms: f64,
}

impl ExecutionOutcome {
    fn completed(
        exit_code: Option<i32>,
        stdout: Captured,
        stderr: Captured,
        duration_ms: f64,
    ) -> Self {
        Self {
            exit_code,
            truncated: stdout.truncated || stderr.truncated,
            stdout: stdout.into_string(),
            stderr: stderr.into_string(),
            timed_out: false,
            duration_ms,
        }
    }

    fn timeout(duration_ms: f64) -> Self {
        Self {
            exit_code: None,
            stdout: String::new(),
            stderr: String::new(),
            timed_out: true,
            truncated: false,
            duration_ms,
        }
    }

    /// Exited with status 0 before the deadline
    pub fn success(&self) -> bool {
        !self.timed_out && self.exit_code == Some(0)
    }

    /// Get a human-readable summary
    pub fn summary(&self) -> String {
        if self.timed_out {
            format!("Timeout after {:.0}ms", self.duration_ms)
        } else if self.success() {
            format!(
                "Success ({:.0}ms, {} bytes output)",
                self.duration_ms,
                self.stdout.len()
            )
        } else {
            format!(
                "Failed (exit code: {:?}, {:.0}ms)",
                self.exit_code, self.duration_ms
            )
        }
    }
}

/// Bytes captured from one pipe
#[derive(Debug, Default)]
struct Captured {
    bytes: Vec<u8>,
    truncated: bool,
}

impl Captured {
    fn into_string(self) -> String {
        String::from_utf8_lossy(&self.bytes).into_owned()
    }
}

/// Runs scanner commands as child processes
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    max_output_bytes: usize,
}

impl Default for ProcessRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessRunner {
    pub fn new() -> Self {
        Self {
            max_output_bytes: DEFAULT_MAX_OUTPUT_BYTES,
        }
    }

    /// Create a runner with a custom capture limit
    pub fn with_max_output(max_output_bytes: usize) -> Self {
        Self { max_output_bytes }
    }

    pub fn max_output_bytes(&self) -> usize {
        self.max_output_bytes
    }

    /// Execute `command`, killing it if it outlives `timeout`.
    ///
    /// # Errors
    ///
    /// - [`ScanError::ToolNotFound`] if the executable does not exist
    /// - [`ScanError::ExecutionFailed`] if it cannot be started or waited on
    ///
    /// A non-zero exit or a timeout is not an error here; both are reported
    /// in the returned [`ExecutionOutcome`].
    pub async fn run(
        &self,
        command: &ScanCommand,
        timeout: ScanTimeout,
    ) -> Result<ExecutionOutcome, ScanError> {
        let start = Instant::now();
        debug!(argv = ?command.argv(), "Spawning scanner");

        let mut cmd = Command::new(command.program());
        cmd.args(command.args())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = cmd.spawn().map_err(|e| spawn_error(command.program(), e))?;
        let group = ProcessGroup::of(child.id());

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let limit = self.max_output_bytes;

        let collect = async {
            tokio::join!(
                child.wait(),
                read_capped(stdout, limit),
                read_capped(stderr, limit)
            )
        };

        let collected = timeout.run(collect).await;
        let Some((status, stdout, stderr)) = collected else {
            warn!(
                timeout_secs = timeout.duration().as_secs(),
                "Scanner exceeded deadline, killing"
            );
            group.kill();
            if let Err(e) = child.kill().await {
                warn!("Failed to kill timed out scanner: {}", e);
            }
            return Ok(ExecutionOutcome::timeout(elapsed_ms(start)));
        };

        let status = status
            .map_err(|e| ScanError::ExecutionFailed(format!("Failed to wait for scanner: {}", e)))?;
        let stdout = stdout
            .map_err(|e| ScanError::ExecutionFailed(format!("Failed to read scanner output: {}", e)))?;
        let stderr = stderr
            .map_err(|e| ScanError::ExecutionFailed(format!("Failed to read scanner errors: {}", e)))?;

        if stdout.truncated || stderr.truncated {
            warn!(limit, "Scanner output exceeded capture limit and was truncated");
        }

        let outcome =
            ExecutionOutcome::completed(status.code(), stdout, stderr, elapsed_ms(start));
        info!("Scanner finished: {}", outcome.summary());
        Ok(outcome)
    }
}

/// Kills the scanner's process group when dropped
#[derive(Debug)]
struct ProcessGroup {
    #[cfg_attr(not(unix), allow(dead_code))]
    leader: Option<u32>,
}

impl ProcessGroup {
    fn of(leader: Option<u32>) -> Self {
        Self { leader }
    }

    #[cfg(unix)]
    fn kill(&self) {
        use nix::errno::Errno;
        use nix::sys::signal::{killpg, Signal};
        use nix::unistd::Pid;

        let Some(leader) = self.leader else {
            return;
        };
        match killpg(Pid::from_raw(leader as i32), Signal::SIGKILL) {
            // Group already gone
            Ok(()) | Err(Errno::ESRCH) => {}
            Err(e) => warn!(pgid = leader, "Failed to kill scanner process group: {}", e),
        }
    }

    #[cfg(not(unix))]
    fn kill(&self) {}
}

impl Drop for ProcessGroup {
    fn drop(&mut self) {
        self.kill();
    }
}

fn spawn_error(program: &str, err: std::io::Error) -> ScanError {
    if err.kind() == ErrorKind::NotFound {
        ScanError::ToolNotFound(program.to_string())
    } else {
        ScanError::ExecutionFailed(format!("Failed to start scanner: {}", err))
    }
}

fn elapsed_ms(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1000.0
}

/// Drain `reader` to EOF, keeping at most `limit` bytes.
///
/// Excess output is still read so the child never blocks on a full pipe.
async fn read_capped<R>(reader: Option<R>, limit: usize) -> std::io::Result<Captured>
where
    R: AsyncRead + Unpin,
{
    let mut captured = Captured::default();
    let Some(mut reader) = reader else {
        return Ok(captured);
    };

    let mut chunk = [0u8; READ_CHUNK];
    loop {
        let n = reader.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        let room = limit.saturating_sub(captured.bytes.len());
        if n > room {
            captured.truncated = true;
        }
        captured.bytes.extend_from_slice(&chunk[..n.min(room)]);
    }
    Ok(captured)
}
