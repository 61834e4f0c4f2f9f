//! Subprocess plumbing shared by the scanner tools.
//!
//! Every child is spawned with `kill_on_drop(true)`: when the harness drops
//! a tool future (per-tool timeout or run cancellation) the scanner dies
//! with it.

use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, Instant};

use tempfile::NamedTempFile;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// How often a long-running scan logs that it is still alive.
pub const PROGRESS_INTERVAL: Duration = Duration::from_secs(30);

/// How long to keep reading output once the child is gone. A grandchild
/// that inherited the pipes can hold them open indefinitely.
pub const DRAIN_GRACE: Duration = Duration::from_secs(2);

/// Everything a finished (or killed) process left behind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutput {
    /// `None` when the process was killed at the deadline.
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub timed_out: bool,
    pub elapsed: Duration,
}

impl ProcessOutput {
    /// Exited on its own with status 0.
    pub fn completed(&self) -> bool {
        !self.timed_out && self.exit_code == Some(0)
    }
}

/// Run `program` with `args`, killing it once `timeout` has elapsed.
///
/// Output collected before the kill is kept. `Err` only when the process
/// could not be started.
pub async fn run_with_deadline(
    program: &str,
    args: &[String],
    timeout: Duration,
) -> Result<ProcessOutput, String> {
    let start = Instant::now();
    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => format!("{program} not found on PATH"),
            _ => format!("failed to start {program}: {e}"),
        })?;
    debug!(program, pid = child.id(), "Spawned {program} {}", args.join(" "));

    let stdout = child.stdout.take().map(drain);
    let stderr = child.stderr.take().map(drain);

    let deadline = tokio::time::sleep(timeout);
    tokio::pin!(deadline);
    let mut progress = tokio::time::interval_at(
        tokio::time::Instant::now() + PROGRESS_INTERVAL,
        PROGRESS_INTERVAL,
    );

    let (exit_code, timed_out) = loop {
        tokio::select! {
            status = child.wait() => {
                let status = status.map_err(|e| format!("failed to wait for {program}: {e}"))?;
                info!(program, code = ?status.code(), "Process completed");
                break (status.code(), false);
            }
            _ = &mut deadline => {
                info!(
                    program,
                    "Timeout reached ({}s), collecting partial results",
                    timeout.as_secs()
                );
                if let Err(e) = child.kill().await {
                    warn!(program, "Failed to kill process: {e}");
                }
                break (None, true);
            }
            _ = progress.tick() => {
                info!(program, "Still running ({:.0}s elapsed)", start.elapsed().as_secs_f64());
            }
        }
    };

    let grace_ends = tokio::time::Instant::now() + DRAIN_GRACE;
    let (stdout, stderr) = tokio::join!(collect(stdout, grace_ends), collect(stderr, grace_ends));
    Ok(ProcessOutput {
        exit_code,
        stdout,
        stderr,
        timed_out,
        elapsed: start.elapsed(),
    })
}

/// A pipe being read in the background, chunk by chunk, so whatever
/// arrived survives an abort.
struct Drain {
    chunks: mpsc::UnboundedReceiver<Vec<u8>>,
    task: JoinHandle<()>,
}

fn drain<R: AsyncRead + Unpin + Send + 'static>(mut reader: R) -> Drain {
    let (tx, chunks) = mpsc::unbounded_channel();
    let task = tokio::spawn(async move {
        let mut chunk = [0u8; 8192];
        loop {
            match reader.read(&mut chunk).await {
                Ok(0) => break,
                Ok(n) => {
                    if tx.send(chunk[..n].to_vec()).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    debug!("Output stream ended early: {e}");
                    break;
                }
            }
        }
    });
    Drain { chunks, task }
}

/// Read until EOF or `grace_ends`, whichever comes first.
async fn collect(pipe: Option<Drain>, grace_ends: tokio::time::Instant) -> String {
    let Some(mut pipe) = pipe else {
        return String::new();
    };
    let mut buf = Vec::new();
    let grace = tokio::time::sleep_until(grace_ends);
    tokio::pin!(grace);
    loop {
        tokio::select! {
            chunk = pipe.chunks.recv() => match chunk {
                Some(chunk) => buf.extend_from_slice(&chunk),
                None => break,
            },
            _ = &mut grace => {
                debug!("Pipe still open after the process ended; keeping what was read");
                pipe.task.abort();
                while let Ok(chunk) = pipe.chunks.try_recv() {
                    buf.extend_from_slice(&chunk);
                }
                break;
            }
        }
    }
    String::from_utf8_lossy(&buf).into_owned()
}

/// An empty temp file for a scanner's structured output. Removed on drop.
pub fn temp_output(suffix: &str) -> Result<NamedTempFile, String> {
    tempfile::Builder::new()
        .prefix("redline-")
        .suffix(suffix)
        .tempfile()
        .map_err(|e| format!("failed to create temp file: {e}"))
}

/// Read a scanner output file; a missing or unreadable file is empty.
pub async fn read_output(path: &Path) -> String {
    tokio::fs::read_to_string(path).await.unwrap_or_else(|e| {
        debug!(path = %path.display(), "No scanner output: {e}");
        String::new()
    })
}

/// Non-blank lines in a file, `0` if it cannot be read.
pub async fn count_lines(path: &Path) -> usize {
    read_output(path)
        .await
        .lines()
        .filter(|l| !l.trim().is_empty())
        .count()
}
