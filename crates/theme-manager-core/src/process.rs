//! Running external tools with a deadline.
//!
//! The extractor, the wallpaper setters and plugin reload hooks all shell out.
//! None of them may block a worker forever, so every call goes through
//! `run_with_timeout`, which kills the child once the deadline passes.
//!
//! The deadline also covers collecting output. A child that backgrounds a
//! long-lived process leaves that process holding its pipes; such a call
//! counts as timed out instead of waiting for the grandchild to exit.

use std::io::{self, Read};
use std::process::{Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, warn};
use wait_timeout::ChildExt;

/// Minimum wait for a reader that has not reported yet, so a child exiting
/// right at the deadline still has its output collected.
const OUTPUT_GRACE: Duration = Duration::from_millis(100);

/// Captured result of a finished process.
#[derive(Debug)]
pub struct ProcessOutput {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.status.success()
    }

    /// Trimmed stderr, or the exit status when stderr is empty.
    pub fn failure_reason(&self) -> String {
        let stderr = self.stderr.trim();
        if stderr.is_empty() {
            self.status.to_string()
        } else {
            stderr.to_string()
        }
    }
}

/// Why a process could not produce output.
#[derive(Debug, Error)]
pub enum RunError {
    /// The program could not be spawned (not installed, not executable, ...).
    #[error("failed to start: {0}")]
    Spawn(#[source] io::Error),

    /// The deadline passed before the child exited and closed its output.
    #[error("timed out")]
    TimedOut,

    #[error("failed to wait for process: {0}")]
    Wait(#[source] io::Error),
}

impl RunError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, RunError::Spawn(e) if e.kind() == io::ErrorKind::NotFound)
    }
}

/// Run `cmd` to completion, capturing stdout/stderr, killing it after `timeout`.
pub fn run_with_timeout(cmd: &mut Command, timeout: Duration) -> Result<ProcessOutput, RunError> {
    debug!("Running {:?} (timeout {:?})", cmd, timeout);
    let deadline = Instant::now() + timeout;

    let mut child = cmd
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(RunError::Spawn)?;

    // Drain pipes on helper threads so a chatty child cannot fill a pipe
    // buffer and deadlock against the wait below.
    let stdout_reader = spawn_reader(child.stdout.take());
    let stderr_reader = spawn_reader(child.stderr.take());

    let status = match child.wait_timeout(timeout) {
        Ok(Some(status)) => status,
        Ok(None) => {
            warn!("Process {:?} exceeded {:?}, killing", cmd.get_program(), timeout);
            let _ = child.kill();
            let _ = child.wait();
            return Err(RunError::TimedOut);
        }
        Err(e) => {
            let _ = child.kill();
            let _ = child.wait();
            return Err(RunError::Wait(e));
        }
    };

    let collect = |reader: &Receiver<String>| match reader
        .recv_timeout(deadline.saturating_duration_since(Instant::now()).max(OUTPUT_GRACE))
    {
        Ok(text) => Ok(text),
        Err(RecvTimeoutError::Disconnected) => Ok(String::new()),
        Err(RecvTimeoutError::Timeout) => {
            warn!(
                "Process {:?} exited but its output is still held open after {:?}",
                cmd.get_program(),
                timeout
            );
            Err(RunError::TimedOut)
        }
    };

    let stdout = collect(&stdout_reader)?;
    let stderr = collect(&stderr_reader)?;
    Ok(ProcessOutput {
        status,
        stdout,
        stderr,
    })
}

/// Read `pipe` to the end on a detached thread and send the text once done.
///
/// The thread outlives a timed-out call and ends when the last writer closes
/// the pipe.
fn spawn_reader<R: Read + Send + 'static>(pipe: Option<R>) -> Receiver<String> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_end(&mut buf);
        }
        let _ = tx.send(String::from_utf8_lossy(&buf).into_owned());
    });
    rx
}
