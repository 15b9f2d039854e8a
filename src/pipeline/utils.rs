// Helper functions for adapter implementations

use std::process::Stdio;

use thiserror::Error;
use tokio::io::AsyncReadExt;
use tokio::process::Command as TokioCommand;
use tokio::time::{timeout, Duration as TokioDuration};

/// Failure to run a child process to completion
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} timed out after {secs}s")]
    TimedOut { program: String, secs: u64 },

    #[error("{program}: {message}")]
    Io { program: String, message: String },
}

impl CommandError {
    fn io(program: &str, message: impl Into<String>) -> Self {
        Self::Io {
            program: program.to_string(),
            message: message.into(),
        }
    }
}

async fn drain<R>(mut pipe: R) -> std::io::Result<Vec<u8>>
where
    R: tokio::io::AsyncRead + Unpin,
{
    let mut buf = Vec::new();
    pipe.read_to_end(&mut buf).await?;
    Ok(buf)
}

/// Run a program with a deadline, capturing stdout and stderr.
/// The child is killed when the deadline passes.
pub async fn run_output_with_timeout(
    program: &str,
    args: Vec<String>,
    timeout_secs: u64,
) -> Result<std::process::Output, CommandError> {
    let mut child = TokioCommand::new(program)
        .args(&args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| CommandError::Spawn {
            program: program.to_string(),
            source,
        })?;

    let stdout_pipe = child
        .stdout
        .take()
        .ok_or_else(|| CommandError::io(program, "stdout not captured"))?;
    let stderr_pipe = child
        .stderr
        .take()
        .ok_or_else(|| CommandError::io(program, "stderr not captured"))?;

    let stdout_task = tokio::spawn(drain(stdout_pipe));
    let stderr_task = tokio::spawn(drain(stderr_pipe));

    match timeout(TokioDuration::from_secs(timeout_secs), child.wait()).await {
        Ok(status) => {
            let status = status.map_err(|e| CommandError::io(program, e.to_string()))?;
            let stdout = stdout_task
                .await
                .map_err(|e| CommandError::io(program, e.to_string()))?
                .map_err(|e| CommandError::io(program, e.to_string()))?;
            let stderr = stderr_task
                .await
                .map_err(|e| CommandError::io(program, e.to_string()))?
                .map_err(|e| CommandError::io(program, e.to_string()))?;
            Ok(std::process::Output { status, stdout, stderr })
        }
        Err(_) => {
            let _ = child.kill().await;
            stdout_task.abort();
            stderr_task.abort();
            Err(CommandError::TimedOut {
                program: program.to_string(),
                secs: timeout_secs,
            })
        }
    }
}

/// Last non-empty stderr line, which is where yt-dlp puts its ERROR message
pub fn last_error_line(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    text.lines()
        .rev()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or("no error output")
        .to_string()
}
