//! Process spawning and I/O
//!
//! Runs a [`ProcessCommand`] to completion, timeout or cancellation while
//! draining both output streams concurrently.

use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::Child;
use tokio::task::JoinHandle;
use tracing::{debug, instrument, warn};

use crate::executor::{CancelToken, ExecutorError, ProcessCommand};
use crate::types::ExecutionResult;

/// How long output readers may keep running after the process is gone
const READER_GRACE: Duration = Duration::from_millis(500);

const READ_CHUNK: usize = 8192;

/// Run a compiler
///
/// Stdin is the null device. Returns once the compiler and everything it
/// started have exited or been killed.
#[instrument(skip(command, cancel), fields(program = command.program()))]
pub async fn compile(
    command: &ProcessCommand,
    cancel: Option<&CancelToken>,
) -> Result<ExecutionResult, ExecutorError> {
    execute(command, None, cancel).await
}

/// Run a user program
///
/// The whole `stdin` payload is written and the pipe is then closed, so a
/// program reading past the end sees EOF instead of blocking. On timeout or
/// cancellation the process group is killed and the partial output captured
/// so far is returned.
#[instrument(skip(command, stdin, cancel), fields(program = command.program()))]
pub async fn run(
    command: &ProcessCommand,
    stdin: &[u8],
    cancel: Option<&CancelToken>,
) -> Result<ExecutionResult, ExecutorError> {
    execute(command, Some(stdin.to_vec()), cancel).await
}

enum Outcome {
    Exited(std::io::Result<ExitStatus>),
    TimedOut,
    Cancelled,
}

async fn execute(
    command: &ProcessCommand,
    stdin: Option<Vec<u8>>,
    cancel: Option<&CancelToken>,
) -> Result<ExecutionResult, ExecutorError> {
    let program = command.program().unwrap_or_default().to_owned();
    let stdin_cfg = if stdin.is_some() {
        Stdio::piped()
    } else {
        Stdio::null()
    };

    debug!(argv = ?command.argv(), "spawning process");

    let mut child = command
        .build(stdin_cfg)?
        .spawn()
        .map_err(|source| ExecutorError::Spawn {
            program: program.clone(),
            source,
        })?;
    let start = Instant::now();
    let pid = child.id();

    if let (Some(data), Some(mut pipe)) = (stdin, child.stdin.take()) {
        tokio::spawn(async move {
            // A program that exits without reading everything closes the pipe
            if let Err(e) = pipe.write_all(&data).await {
                debug!(error = %e, "stdin closed before payload was written");
            }
        });
    }

    let limit = command.output_limit();
    let stdout = Arc::new(Mutex::new(Capture::default()));
    let stderr = Arc::new(Mutex::new(Capture::default()));
    let readers = [
        child
            .stdout
            .take()
            .map(|pipe| tokio::spawn(drain(pipe, Arc::clone(&stdout), limit))),
        child
            .stderr
            .take()
            .map(|pipe| tokio::spawn(drain(pipe, Arc::clone(&stderr), limit))),
    ];

    let outcome = wait(&mut child, command.timeout_duration(), cancel).await;

    // The leader may be gone while its descendants still hold the pipes
    if let Some(pid) = pid {
        match outcome {
            // The leader is reaped, so the group id is only reserved while
            // some member is still alive
            Outcome::Exited(_) => {
                if group_alive(pid) {
                    kill_group(pid);
                }
            }
            Outcome::TimedOut | Outcome::Cancelled => kill_group(pid),
        }
    }

    let (status, timed_out, cancelled) = match outcome {
        Outcome::Exited(status) => (status, false, false),
        Outcome::TimedOut => (reap(&mut child).await, true, false),
        Outcome::Cancelled => (reap(&mut child).await, false, true),
    };
    let duration = start.elapsed();
    let status = status.map_err(|source| ExecutorError::Wait {
        program: program.clone(),
        source,
    })?;

    for reader in readers.into_iter().flatten() {
        join_reader(reader).await;
    }

    // Aborted readers may still hold a reference, so take rather than unwrap
    let stdout = stdout.lock().unwrap_or_else(PoisonError::into_inner).take();
    let stderr = stderr.lock().unwrap_or_else(PoisonError::into_inner).take();

    let result = ExecutionResult {
        stdout: String::from_utf8_lossy(&stdout.data).into_owned(),
        stderr: String::from_utf8_lossy(&stderr.data).into_owned(),
        exit_code: status.code(),
        signal: exit_signal(&status),
        timed_out,
        cancelled,
        truncated: stdout.truncated || stderr.truncated,
        duration,
    };

    debug!(
        exit_code = ?result.exit_code,
        signal = ?result.signal,
        timed_out,
        cancelled,
        truncated = result.truncated,
        elapsed_ms = duration.as_millis() as u64,
        "process finished"
    );

    Ok(result)
}

async fn wait(child: &mut Child, timeout: Duration, cancel: Option<&CancelToken>) -> Outcome {
    let cancelled = async {
        match cancel {
            Some(token) => token.cancelled().await,
            None => std::future::pending().await,
        }
    };

    tokio::select! {
        status = child.wait() => Outcome::Exited(status),
        () = tokio::time::sleep(timeout) => Outcome::TimedOut,
        () = cancelled => Outcome::Cancelled,
    }
}

/// Kill the leader directly (for platforms without process groups) and
/// collect its exit status
async fn reap(child: &mut Child) -> std::io::Result<ExitStatus> {
    if let Err(e) = child.start_kill() {
        debug!(error = %e, "kill of process leader failed");
    }
    child.wait().await
}

async fn join_reader(mut reader: JoinHandle<()>) {
    if tokio::time::timeout(READER_GRACE, &mut reader).await.is_err() {
        warn!("output reader still busy after process exit, abandoning it");
        reader.abort();
    }
}

#[cfg(unix)]
fn kill_group(pid: u32) {
    use nix::errno::Errno;
    use nix::sys::signal::{Signal, killpg};
    use nix::unistd::Pid;

    let Ok(raw) = i32::try_from(pid) else {
        return;
    };
    match killpg(Pid::from_raw(raw), Signal::SIGKILL) {
        Ok(()) | Err(Errno::ESRCH) => {}
        Err(e) => warn!(pid, error = %e, "failed to kill process group"),
    }
}

#[cfg(not(unix))]
fn kill_group(_pid: u32) {}

/// Check whether any process is left in the group led by `pid`
#[cfg(unix)]
fn group_alive(pid: u32) -> bool {
    use nix::sys::signal::killpg;
    use nix::unistd::Pid;

    i32::try_from(pid).is_ok_and(|raw| killpg(Pid::from_raw(raw), None).is_ok())
}

#[cfg(not(unix))]
fn group_alive(_pid: u32) -> bool {
    false
}

#[cfg(unix)]
fn exit_signal(status: &ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    status.signal()
}

#[cfg(not(unix))]
fn exit_signal(_status: &ExitStatus) -> Option<i32> {
    None
}

/// Bytes captured from one output stream
#[derive(Debug, Default)]
struct Capture {
    data: Vec<u8>,
    truncated: bool,
}

impl Capture {
    fn push(&mut self, chunk: &[u8], limit: usize) {
        let room = limit.saturating_sub(self.data.len());
        if chunk.len() > room {
            self.truncated = true;
        }
        self.data.extend_from_slice(&chunk[..chunk.len().min(room)]);
    }

    fn take(&mut self) -> Self {
        std::mem::take(self)
    }
}

/// Read a stream to EOF, keeping at most `limit` bytes
///
/// Reading continues past the limit so the writer never blocks on a full pipe.
async fn drain<R>(mut reader: R, capture: Arc<Mutex<Capture>>, limit: usize)
where
    R: AsyncRead + Unpin,
{
    let mut chunk = [0u8; READ_CHUNK];
    loop {
        match reader.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => capture
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(&chunk[..n], limit),
            Err(e) => {
                debug!(error = %e, "output stream read failed");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capture_keeps_everything_under_limit() {
        let mut capture = Capture::default();
        capture.push(b"hello", 10);
        capture.push(b"world", 10);
        assert_eq!(capture.data, b"helloworld");
        assert!(!capture.truncated);
    }

    #[test]
    fn capture_truncates_at_limit() {
        let mut capture = Capture::default();
        capture.push(b"hello", 8);
        capture.push(b"world", 8);
        assert_eq!(capture.data, b"hellowor");
        assert!(capture.truncated);

        capture.push(b"more", 8);
        assert_eq!(capture.data.len(), 8);
    }

    #[test]
    fn capture_zero_limit() {
        let mut capture = Capture::default();
        capture.push(b"x", 0);
        assert!(capture.data.is_empty());
        assert!(capture.truncated);
    }
}
