//! Bounded subprocess execution shared by command-backed lookups and the
//! command-backed reasoner.

use std::io::{Read, Write};
use std::process::{Command, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::time::{Duration, Instant};

use thiserror::Error;

const POLL_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Debug, Error)]
pub enum ExecError {
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    #[error("wait failed: {0}")]
    Wait(std::io::Error),

    #[error("{}", exit_message(.code, .stderr))]
    Failed { code: Option<i32>, stderr: String },
}

fn exit_message(code: &Option<i32>, stderr: &str) -> String {
    let hint: String = stderr.trim().chars().take(200).collect();
    match *code {
        Some(code) if hint.is_empty() => format!("exited with code {code}"),
        Some(code) => format!("exited with code {code}: {hint}"),
        None => "terminated by signal".to_string(),
    }
}

/// Run `cmd` to completion, feeding `stdin` if given, and return its stdout.
///
/// The child is killed once `timeout` elapses. Stdin is written from a
/// helper thread so a child that never reads cannot stall the deadline, and
/// output is collected within the same deadline: a background process that
/// keeps the child's stdout open after it exits is reported as a timeout.
pub fn run_with_timeout(
    mut cmd: Command,
    stdin: Option<&str>,
    timeout: Duration,
) -> Result<String, ExecError> {
    let program = cmd.get_program().to_string_lossy().into_owned();
    cmd.stdin(if stdin.is_some() {
        Stdio::piped()
    } else {
        Stdio::null()
    })
    .stdout(Stdio::piped())
    .stderr(Stdio::piped());

    let mut child = cmd
        .spawn()
        .map_err(|source| ExecError::Spawn { program, source })?;

    if let (Some(input), Some(mut pipe)) = (stdin, child.stdin.take()) {
        let input = input.to_string();
        // A child that exits early closes the pipe; that write error is expected.
        std::thread::spawn(move || {
            let _ = pipe.write_all(input.as_bytes());
        });
    }

    let stdout = child.stdout.take().map(drain);
    let stderr = child.stderr.take().map(drain);

    let deadline = Instant::now() + timeout;
    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) if Instant::now() >= deadline => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(ExecError::Timeout(timeout));
            }
            Ok(None) => std::thread::sleep(POLL_INTERVAL),
            Err(e) => return Err(ExecError::Wait(e)),
        }
    };

    let stdout = collect(stdout, deadline).ok_or(ExecError::Timeout(timeout))?;
    if !status.success() {
        return Err(ExecError::Failed {
            code: status.code(),
            stderr: collect(stderr, deadline).unwrap_or_default(),
        });
    }
    Ok(stdout)
}

/// Read a pipe to the end on a helper thread so a chatty child never blocks
/// on a full pipe buffer.
fn drain<P: Read + Send + 'static>(mut pipe: P) -> Receiver<Vec<u8>> {
    let (tx, rx) = mpsc::channel();
    std::thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = pipe.read_to_end(&mut buf);
        let _ = tx.send(buf);
    });
    rx
}

/// Output of a drained pipe, or `None` if it is still open at `deadline`.
fn collect(rx: Option<Receiver<Vec<u8>>>, deadline: Instant) -> Option<String> {
    let Some(rx) = rx else {
        return Some(String::new());
    };
    let remaining = deadline.saturating_duration_since(Instant::now());
    match rx.recv_timeout(remaining) {
        Ok(buf) => Some(String::from_utf8_lossy(&buf).into_owned()),
        Err(RecvTimeoutError::Disconnected) => Some(String::new()),
        Err(RecvTimeoutError::Timeout) => None,
    }
}
