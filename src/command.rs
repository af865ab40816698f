//! # External Command Execution
//!
//! The repository layer never calls `std::process::Command` directly. It goes
//! through the [`CommandRunner`] capability so that tests can inject a fake
//! runner returning scripted results, the same way the repository manager is
//! tested with mock git operations.
//!
//! [`SystemCommandRunner`] is the real implementation. Each invocation blocks
//! the calling thread until the child exits. An optional timeout kills the
//! child once exceeded and reports [`CommandStatus::TimedOut`].

use std::io::Read;
use std::path::Path;
use std::process::{Command, Stdio};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use log::warn;

/// How a finished command ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandStatus {
    /// The process exited with the given code.
    Exited(i32),
    /// The process was terminated by a signal.
    Signaled,
    /// The process exceeded its timeout and was killed.
    TimedOut,
}

/// Captured result of running an external command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub status: CommandStatus,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    /// A successful result with the given stdout.
    pub fn success(stdout: impl Into<String>) -> Self {
        Self {
            status: CommandStatus::Exited(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// A failed result with the given exit code and stderr.
    pub fn failure(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            status: CommandStatus::Exited(code),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == CommandStatus::Exited(0)
    }

    /// The exit code, if the process exited normally.
    pub fn exit_code(&self) -> Option<i32> {
        match self.status {
            CommandStatus::Exited(code) => Some(code),
            CommandStatus::Signaled | CommandStatus::TimedOut => None,
        }
    }
}

/// Capability for running an external executable.
///
/// Returns `Err` only when the process could not be started at all; a
/// non-zero exit is reported through [`CommandOutput::status`].
pub trait CommandRunner: Send + Sync {
    fn run(&self, executable: &str, args: &[String], cwd: &Path)
        -> std::io::Result<CommandOutput>;
}

/// Runs commands as real child processes.
#[derive(Debug, Clone, Default)]
pub struct SystemCommandRunner {
    timeout: Option<Duration>,
}

/// Interval between liveness checks while a timeout is armed.
const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// How long to keep reading pipes once the child itself is gone.
const READER_GRACE: Duration = Duration::from_millis(200);

impl SystemCommandRunner {
    /// A runner that waits indefinitely for each command.
    pub fn new() -> Self {
        Self::default()
    }

    /// A runner that kills commands running longer than `timeout`.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout: Some(timeout),
        }
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }
}

impl CommandRunner for SystemCommandRunner {
    fn run(
        &self,
        executable: &str,
        args: &[String],
        cwd: &Path,
    ) -> std::io::Result<CommandOutput> {
        let Some(timeout) = self.timeout else {
            let output = Command::new(executable)
                .args(args)
                .current_dir(cwd)
                .stdin(Stdio::null())
                .output()?;
            return Ok(CommandOutput {
                status: match output.status.code() {
                    Some(code) => CommandStatus::Exited(code),
                    None => CommandStatus::Signaled,
                },
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        };

        let mut child = Command::new(executable)
            .args(args)
            .current_dir(cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        // Drain both pipes on their own threads so a chatty child can't block
        // on a full pipe while we poll for exit.
        let stdout_reader = child.stdout.take().map(drain);
        let stderr_reader = child.stderr.take().map(drain);

        let started = Instant::now();
        let (status, deadline) = loop {
            if let Some(status) = child.try_wait()? {
                let status = match status.code() {
                    Some(code) => CommandStatus::Exited(code),
                    None => CommandStatus::Signaled,
                };
                let deadline = (started + timeout).max(Instant::now() + READER_GRACE);
                break (status, deadline);
            }
            if started.elapsed() >= timeout {
                warn!(
                    "'{} {}' exceeded {:?}, killing it",
                    executable,
                    args.join(" "),
                    timeout
                );
                child.kill()?;
                child.wait()?;
                break (CommandStatus::TimedOut, Instant::now() + READER_GRACE);
            }
            thread::sleep(POLL_INTERVAL);
        };

        // Grandchildren (ssh, git-remote-https) inherit the pipes and may
        // outlive the kill; whatever they have not closed by the deadline is
        // abandoned.
        Ok(CommandOutput {
            status,
            stdout: collect(stdout_reader, deadline),
            stderr: collect(stderr_reader, deadline),
        })
    }
}

fn drain<R: Read + Send + 'static>(mut pipe: R) -> mpsc::Receiver<Vec<u8>> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let mut buf = Vec::new();
        // A read error just truncates what we report.
        let _ = pipe.read_to_end(&mut buf);
        let _ = tx.send(buf);
    });
    rx
}

fn collect(reader: Option<mpsc::Receiver<Vec<u8>>>, deadline: Instant) -> String {
    reader
        .and_then(|rx| {
            rx.recv_timeout(deadline.saturating_duration_since(Instant::now()))
                .ok()
        })
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
        .unwrap_or_default()
}
