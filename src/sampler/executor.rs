//! Child process execution with optional timeout
//!
//! Every run blocks the caller until the child exits. With a timeout the child
//! is polled and, on expiry, killed together with anything it spawned.

use std::io::Read;
use std::process::{Child, Command, Output, Stdio};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread;
use std::time::{Duration, Instant};

use crate::{Error, Result};

use super::{duration_ms, OutputCapture, ProcessOutput, TargetCommand};

/// How often a running child is polled while a timeout is armed
const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Run a command to completion and capture its output
///
/// Without a timeout this waits indefinitely, so a hung child hangs the
/// caller. With a timeout the child (and on Unix its whole process group) is
/// killed on expiry and [`Error::Timeout`] is returned.
///
/// # Errors
///
/// Returns [`Error::Spawn`] if the program cannot be started,
/// [`Error::Timeout`] on expiry, or [`Error::Io`] if waiting fails.
pub fn run_to_completion(mut cmd: Command, timeout: Option<Duration>) -> Result<ProcessOutput> {
    let program = cmd.get_program().to_string_lossy().into_owned();

    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    #[cfg(unix)]
    if timeout.is_some() {
        use std::os::unix::process::CommandExt;
        // Own process group, so the wrapped target can be killed with the wrapper
        cmd.process_group(0);
    }

    let start = Instant::now();
    let child = cmd.spawn().map_err(|e| Error::Spawn {
        program: program.clone(),
        message: e.to_string(),
    })?;

    let output = match timeout {
        Some(limit) => wait_with_timeout(child, limit)?,
        None => child.wait_with_output()?,
    };

    let elapsed = duration_ms(start.elapsed());
    tracing::debug!(
        program = %program,
        exit_code = ?output.status.code(),
        elapsed_ms = elapsed,
        "child process finished"
    );

    Ok(ProcessOutput {
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        exit_code: output.status.code(),
        duration_ms: elapsed,
    })
}

/// Wait for a process with timeout using threaded output capture
///
/// The deadline covers both the exit of the child and the closing of its
/// pipes, so a descendant that keeps stdout open cannot outlive the limit.
fn wait_with_timeout(mut child: Child, timeout: Duration) -> Result<Output> {
    // Readers drain the pipes concurrently so a chatty child cannot block on a full buffer
    let (tx, rx) = mpsc::channel();
    spawn_reader(Stream::Stdout, child.stdout.take(), tx.clone());
    spawn_reader(Stream::Stderr, child.stderr.take(), tx);

    let deadline = Instant::now() + timeout;
    let status = loop {
        if let Some(status) = child.try_wait()? {
            break status;
        }

        let now = Instant::now();
        if now >= deadline {
            return Err(timed_out(&mut child, timeout));
        }

        thread::sleep(POLL_INTERVAL.min(deadline - now));
    };

    let mut stdout = Vec::new();
    let mut stderr = Vec::new();
    for _ in 0..2 {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match rx.recv_timeout(remaining) {
            Ok((Stream::Stdout, buf)) => stdout = buf,
            Ok((Stream::Stderr, buf)) => stderr = buf,
            Err(RecvTimeoutError::Timeout) => {
                tracing::warn!(
                    pid = child.id(),
                    "child exited but a descendant still holds its output pipes"
                );
                return Err(timed_out(&mut child, timeout));
            }
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    Ok(Output {
        status,
        stdout,
        stderr,
    })
}

/// Which pipe a reader drained
#[derive(Debug, Clone, Copy)]
enum Stream {
    Stdout,
    Stderr,
}

fn spawn_reader<R>(stream: Stream, handle: Option<R>, tx: Sender<(Stream, Vec<u8>)>)
where
    R: Read + Send + 'static,
{
    // Detached: an orphaned descendant may hold the pipe past the deadline
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut pipe) = handle {
            let _ = pipe.read_to_end(&mut buf);
        }
        let _ = tx.send((stream, buf));
    });
}

fn timed_out(child: &mut Child, timeout: Duration) -> Error {
    terminate(child);
    tracing::warn!(
        pid = child.id(),
        limit_ms = duration_ms(timeout),
        "child process timed out and was killed"
    );
    Error::Timeout(duration_ms(timeout))
}

/// Kill the child and everything in its process group, then reap it
fn terminate(child: &mut Child) {
    #[cfg(unix)]
    {
        // The child leads its own group; negative pid addresses the whole group
        let _ = Command::new("kill")
            .args(["-KILL", "--", &format!("-{}", child.id())])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();
    }
    let _ = child.kill();
    let _ = child.wait();
}

/// Check whether a program can be started (`<program> --version`)
#[must_use]
pub fn is_available(program: &str) -> bool {
    Command::new(program)
        .arg("--version")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .is_ok()
}

/// Runs the target directly, without any telemetry wrapper
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainCapture;

impl OutputCapture for PlainCapture {
    fn capture(
        &self,
        command: &TargetCommand,
        timeout: Option<Duration>,
    ) -> Result<ProcessOutput> {
        run_to_completion(command.to_command(), timeout)
    }
}
