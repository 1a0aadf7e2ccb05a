//! External process execution.
//!
//! [`SystemRunner`] spawns the child with an explicit argument vector,
//! captures stdout/stderr, and enforces a wall-clock timeout plus an
//! optional cancellation token. A non-zero exit status is returned as a
//! normal [`ProcessOutput`]; callers decide what it means.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use crate::settings::DEFAULT_TOOL_TIMEOUT;

/// Maximum stdout or stderr size captured per stream (10 MiB).
const MAX_OUTPUT_BYTES: usize = 10 * 1024 * 1024;

/// A fully specified invocation.
#[derive(Debug, Clone)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    /// Overlaid on the parent environment.
    pub env: Vec<(String, String)>,
    pub working_dir: Option<PathBuf>,
    pub timeout: Duration,
    pub cancel: Option<CancellationToken>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            env: Vec::new(),
            working_dir: None,
            timeout: DEFAULT_TOOL_TIMEOUT,
            cancel: None,
        }
    }

    pub fn with_env(mut self, env: Vec<(String, String)>) -> Self {
        self.env.extend(env);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Program and arguments joined for logging. Never includes `env`.
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Captured result of a finished process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    /// `-1` if the process was killed by a signal.
    pub exit_code: i32,
    /// The process ended on a signal rather than exiting.
    pub signaled: bool,
    pub stdout: String,
    pub stderr: String,
    pub duration_ms: u64,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        !self.signaled && self.exit_code == 0
    }
}

/// Failures to run a process to completion.
#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("Executable not found: {0}")]
    NotFound(String),

    #[error("{program} timed out after {elapsed_ms}ms")]
    Timeout { program: String, elapsed_ms: u64 },

    #[error("{0} was cancelled")]
    Cancelled(String),

    #[error("I/O error running {program}: {source}")]
    Io {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

/// Runs external commands.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, spec: CommandSpec) -> Result<ProcessOutput, ProcessError>;
}

/// [`CommandRunner`] that spawns real child processes.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

#[async_trait]
impl CommandRunner for SystemRunner {
    async fn run(&self, spec: CommandSpec) -> Result<ProcessOutput, ProcessError> {
        let mut cmd = Command::new(&spec.program);
        // `kill_on_drop(true)` ensures the child is killed when dropped on
        // timeout or cancellation.
        cmd.args(&spec.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        for (key, value) in &spec.env {
            cmd.env(key, value);
        }
        if let Some(dir) = &spec.working_dir {
            cmd.current_dir(dir);
        }

        tracing::debug!(command = %spec.display(), timeout_secs = spec.timeout.as_secs(), "Spawning process");

        let start = Instant::now();
        let mut child = cmd.spawn().map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => ProcessError::NotFound(spec.program.clone()),
            _ => ProcessError::Io {
                program: spec.program.clone(),
                source: e,
            },
        })?;

        let stdout_task = tokio::spawn(read_stream(child.stdout.take()));
        let stderr_task = tokio::spawn(read_stream(child.stderr.take()));

        let cancelled = async {
            match &spec.cancel {
                Some(token) => token.cancelled().await,
                None => std::future::pending().await,
            }
        };

        let status = tokio::select! {
            waited = tokio::time::timeout(spec.timeout, child.wait()) => match waited {
                Ok(Ok(status)) => status,
                Ok(Err(e)) => {
                    return Err(ProcessError::Io { program: spec.program.clone(), source: e });
                }
                Err(_elapsed) => {
                    return Err(ProcessError::Timeout {
                        program: spec.program.clone(),
                        elapsed_ms: start.elapsed().as_millis() as u64,
                    });
                }
            },
            _ = cancelled => {
                return Err(ProcessError::Cancelled(spec.program.clone()));
            }
        };

        let stdout_bytes = stdout_task.await.unwrap_or_default();
        let stderr_bytes = stderr_task.await.unwrap_or_default();

        Ok(ProcessOutput {
            exit_code: status.code().unwrap_or(-1),
            signaled: status.code().is_none(),
            stdout: String::from_utf8_lossy(&stdout_bytes).into_owned(),
            stderr: String::from_utf8_lossy(&stderr_bytes).into_owned(),
            duration_ms: start.elapsed().as_millis() as u64,
        })
    }
}

/// Drain an output stream to EOF, keeping at most [`MAX_OUTPUT_BYTES`].
///
/// Bytes past the cap are read and discarded; closing the pipe early would
/// kill the child with SIGPIPE on its next write.
async fn read_stream<R: AsyncRead + Unpin>(handle: Option<R>) -> Vec<u8> {
    let mut buf = Vec::new();
    let Some(mut h) = handle else {
        return buf;
    };
    let mut chunk = [0u8; 8192];
    loop {
        match h.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                let room = MAX_OUTPUT_BYTES.saturating_sub(buf.len());
                buf.extend_from_slice(&chunk[..n.min(room)]);
            }
        }
    }
    buf
}

/// The last `max_chars` characters of `text`, trimmed, for error messages.
pub fn excerpt(text: &str, max_chars: usize) -> String {
    let trimmed = text.trim();
    let count = trimmed.chars().count();
    if count <= max_chars {
        return trimmed.to_string();
    }
    let tail: String = trimmed.chars().skip(count - max_chars).collect();
    format!("...{tail}")
}
