use std::path::Path;
use std::process::Stdio;

use log::info;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;

use crate::error::OpsResult;

#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub success: bool,
    pub exit_code: Option<i32>,
    /// Interleaved stdout/stderr transcript, in arrival order per stream.
    pub transcript: String,
}

/// Run a child process, streaming each output line to the log as it arrives
/// and capturing the full transcript for error reporting.
///
/// The child is killed if the returned future is dropped, so a caller racing
/// this against a timer does not leave the process running on its own.
pub async fn stream_command_output(
    command: &str,
    args: &[&str],
    cwd: Option<&Path>,
) -> OpsResult<CommandOutput> {
    let mut cmd = Command::new(command);
    cmd.args(args);
    if let Some(cwd) = cwd {
        cmd.current_dir(cwd);
    }
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());
    cmd.kill_on_drop(true);

    let mut child = cmd.spawn()?;

    let stdout = child
        .stdout
        .take()
        .expect("Child process should have a handle to stdout");
    let stderr = child
        .stderr
        .take()
        .expect("Child process should have a handle to stderr");

    let mut stdout_reader = BufReader::new(stdout).lines();
    let mut stderr_reader = BufReader::new(stderr).lines();

    let stdout_handle = tokio::spawn(async move {
        let mut captured = String::new();
        while let Ok(Some(line)) = stdout_reader.next_line().await {
            info!("[stdout] {}", line);
            captured.push_str(&line);
            captured.push('\n');
        }
        captured
    });

    let stderr_handle = tokio::spawn(async move {
        let mut captured = String::new();
        while let Ok(Some(line)) = stderr_reader.next_line().await {
            info!("[stderr] {}", line);
            captured.push_str(&line);
            captured.push('\n');
        }
        captured
    });

    let status = child.wait().await?;

    let mut transcript = stdout_handle.await.unwrap_or_default();
    transcript.push_str(&stderr_handle.await.unwrap_or_default());

    Ok(CommandOutput {
        success: status.success(),
        exit_code: status.code(),
        transcript,
    })
}

/// Run a child process quietly and return its stdout, or the stderr text as
/// an error.
pub async fn run_captured(command: &str, args: &[&str], cwd: Option<&Path>) -> OpsResult<String> {
    let mut cmd = Command::new(command);
    cmd.args(args);
    if let Some(cwd) = cwd {
        cmd.current_dir(cwd);
    }
    cmd.kill_on_drop(true);

    let output = cmd.output().await?;
    if output.status.success() {
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    } else {
        Err(crate::error::OpsError::Command(std::io::Error::other(
            String::from_utf8_lossy(&output.stderr).to_string(),
        )))
    }
}
