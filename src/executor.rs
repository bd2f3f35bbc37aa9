// executor.rs - Single external command execution
// Purpose: Run one tool with optional stdin and timeout, capture stdout,
//          classify failures without throwing across the task boundary

use std::io;
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tokio::time::timeout;

use crate::tools::SearchPath;

/// How long output readers may keep draining after a timed-out child was killed.
/// A grandchild that inherited the pipe can keep it open indefinitely.
const DRAIN_GRACE: Duration = Duration::from_millis(250);

#[derive(Debug, Error)]
pub enum ExecError {
    #[error("empty command line")]
    EmptyCommand,

    #[error("could not parse command line (unbalanced quotes): {0}")]
    Parse(String),

    #[error("command '{program}' not found. Is it installed correctly?")]
    NotFound { program: String },

    #[error("failed to start '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("exited with code {}: {stderr_line}", .code.map(|c| c.to_string()).unwrap_or_else(|| "signal".to_string()))]
    ExitError {
        code: Option<i32>,
        stderr_line: String,
        stdout: String,
    },

    #[error("timed out after {after:?}")]
    Timeout {
        after: Duration,
        partial_stdout: String,
    },
}

impl ExecError {
    /// Stdout produced before a soft failure, if any.
    pub fn usable_stdout(&self) -> Option<&str> {
        match self {
            ExecError::ExitError { stdout, .. } => Some(stdout),
            ExecError::Timeout { partial_stdout, .. } => Some(partial_stdout),
            _ => None,
        }
    }
}

/// Execute `command_line` (shell-style quoting, no shell involved).
///
/// The program is resolved against `search_path` before anything is spawned.
/// On timeout the child is killed and the stdout captured so far is returned
/// inside [`ExecError::Timeout`].
pub async fn execute(
    command_line: &str,
    stdin_data: Option<&str>,
    limit: Option<Duration>,
    search_path: &SearchPath,
) -> Result<String, ExecError> {
    let args = shlex::split(command_line).ok_or_else(|| ExecError::Parse(command_line.to_string()))?;
    let (program, rest) = args.split_first().ok_or(ExecError::EmptyCommand)?;

    let resolved = search_path.resolve(program).ok_or_else(|| ExecError::NotFound {
        program: program.clone(),
    })?;

    let mut child = Command::new(&resolved)
        .args(rest)
        .env("PATH", search_path.to_env_value())
        .stdin(if stdin_data.is_some() { Stdio::piped() } else { Stdio::null() })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| ExecError::Spawn {
            program: program.clone(),
            source,
        })?;

    if let (Some(data), Some(mut stdin)) = (stdin_data, child.stdin.take()) {
        let data = data.to_string();
        tokio::spawn(async move {
            // A tool that exits without reading everything closes the pipe early
            let _ = stdin.write_all(data.as_bytes()).await;
            let _ = stdin.shutdown().await;
        });
    }

    let stdout = Capture::start(child.stdout.take());
    let stderr = Capture::start(child.stderr.take());

    let status = match limit {
        Some(limit) => match timeout(limit, child.wait()).await {
            Ok(status) => Some(status),
            Err(_) => {
                let _ = child.kill().await;
                None
            }
        },
        None => Some(child.wait().await),
    };

    match status {
        None => Err(ExecError::Timeout {
            after: limit.unwrap_or_default(),
            partial_stdout: stdout.finish(Some(DRAIN_GRACE)).await,
        }),
        Some(Err(source)) => Err(ExecError::Spawn {
            program: program.clone(),
            source,
        }),
        Some(Ok(status)) => {
            let out = stdout.finish(Some(DRAIN_GRACE)).await;
            if status.success() {
                Ok(out)
            } else {
                let err = stderr.finish(Some(DRAIN_GRACE)).await;
                Err(ExecError::ExitError {
                    code: status.code(),
                    stderr_line: err.lines().map(str::trim).find(|l| !l.is_empty()).unwrap_or("").to_string(),
                    stdout: out,
                })
            }
        }
    }
}

/// Background reader that accumulates a child stream into a shared buffer, so
/// whatever arrived is still available if the reader has to be abandoned.
struct Capture {
    buffer: Arc<Mutex<Vec<u8>>>,
    handle: Option<JoinHandle<()>>,
}

impl Capture {
    fn start<R>(stream: Option<R>) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let buffer = Arc::new(Mutex::new(Vec::new()));
        let handle = stream.map(|mut stream| {
            let buffer = Arc::clone(&buffer);
            tokio::spawn(async move {
                let mut chunk = [0u8; 8192];
                loop {
                    match stream.read(&mut chunk).await {
                        Ok(0) | Err(_) => break,
                        Ok(n) => {
                            if let Ok(mut buf) = buffer.lock() {
                                buf.extend_from_slice(&chunk[..n]);
                            }
                        }
                    }
                }
            })
        });
        Self { buffer, handle }
    }

    async fn finish(mut self, grace: Option<Duration>) -> String {
        if let Some(mut handle) = self.handle.take() {
            let finished = match grace {
                Some(grace) => timeout(grace, &mut handle).await.is_ok(),
                None => (&mut handle).await.is_ok(),
            };
            if !finished {
                handle.abort();
            }
        }
        let bytes = self.buffer.lock().map(|b| b.clone()).unwrap_or_default();
        String::from_utf8_lossy(&bytes).into_owned()
    }
}

impl Drop for Capture {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}
