//! Runner side of the job protocol.
//!
//! Every pooled process is `shogun runner`: it reads one [`JobRequest`] per
//! stdin line, runs the `claude` CLI for it, streams the CLI's output back
//! as `OUT:` lines and finishes each job with exactly one `RESULT:` line.
//! Stdout is the protocol channel; logging goes to stderr.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use shogun_core::protocol::{JobRequest, JobResult, progress_line, result_line};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Exit code reported when the CLI overran its time limit.
pub const TIMEOUT_EXIT_CODE: i32 = 124;

#[derive(Debug, Clone)]
pub struct RunnerConfig {
    pub claude_bin: PathBuf,
    pub working_dir: PathBuf,
    pub child_timeout: Duration,
}

enum ChildLine {
    Stdout(String),
    Stderr(String),
}

/// Serve jobs from the process's own stdin/stdout until stdin closes.
pub async fn run_stdio(config: RunnerConfig) -> std::io::Result<()> {
    serve(
        &config,
        BufReader::new(tokio::io::stdin()),
        tokio::io::stdout(),
    )
    .await
}

/// Serve jobs read from `input`, writing protocol lines to `output`.
pub async fn serve<R, W>(config: &RunnerConfig, input: R, mut output: W) -> std::io::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    info!(claude_bin = %config.claude_bin.display(), "Runner ready");
    let mut lines = input.lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let result = match serde_json::from_str::<JobRequest>(line) {
            Ok(request) => run_job(config, &request, &mut output).await?,
            Err(e) => {
                warn!(error = %e, "Invalid job request");
                JobResult {
                    exit_code: 1,
                    output: format!("invalid job request: {e}"),
                }
            }
        };
        let encoded = result_line(&result).map_err(std::io::Error::other)?;
        write_line(&mut output, &encoded).await?;
    }
    info!("Runner input closed");
    Ok(())
}

/// Run the CLI for one request, forwarding its output as progress.
///
/// Only a failure to write to `output` is an error; everything that goes
/// wrong with the CLI itself is reported in the returned result.
async fn run_job<W>(
    config: &RunnerConfig,
    request: &JobRequest,
    output: &mut W,
) -> std::io::Result<JobResult>
where
    W: AsyncWrite + Unpin,
{
    let mut cmd = Command::new(&config.claude_bin);
    cmd.arg("-p")
        .arg(&request.prompt)
        .arg("--append-system-prompt-file")
        .arg(&request.system_prompt_file)
        .current_dir(&config.working_dir)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(model) = request.model.as_deref().filter(|m| !m.trim().is_empty()) {
        cmd.arg("--model").arg(model);
    }

    debug!(model = ?request.model, "Starting CLI");
    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(e) => {
            warn!(error = %e, "Failed to start CLI");
            return Ok(JobResult {
                exit_code: 1,
                output: format!("failed to start {}: {e}", config.claude_bin.display()),
            });
        }
    };

    let (line_tx, mut line_rx) = mpsc::unbounded_channel();
    if let Some(stdout) = child.stdout.take() {
        let tx = line_tx.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if tx.send(ChildLine::Stdout(line)).is_err() {
                    break;
                }
            }
        });
    }
    if let Some(stderr) = child.stderr.take() {
        let tx = line_tx.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if tx.send(ChildLine::Stderr(line)).is_err() {
                    break;
                }
            }
        });
    }
    drop(line_tx);

    let mut stdout_lines = Vec::new();
    let mut stderr_lines = Vec::new();
    let collect = async {
        while let Some(line) = line_rx.recv().await {
            match line {
                ChildLine::Stdout(line) => {
                    write_line(output, &progress_line(&line)).await?;
                    stdout_lines.push(line);
                }
                ChildLine::Stderr(line) => {
                    write_line(output, &progress_line(&format!("[stderr] {line}"))).await?;
                    stderr_lines.push(line);
                }
            }
        }
        child.wait().await
    };

    let finished = tokio::time::timeout(config.child_timeout, collect).await;
    match finished {
        Ok(Ok(status)) => {
            let exit_code = status.code().unwrap_or(1);
            let stdout = stdout_lines.join("\n");
            let text = if exit_code != 0 && !stderr_lines.is_empty() {
                format!("STDERR: {}\nSTDOUT: {stdout}", stderr_lines.join("\n"))
            } else {
                stdout
            };
            info!(exit_code, "CLI finished");
            Ok(JobResult {
                exit_code,
                output: text,
            })
        }
        Ok(Err(e)) => Err(e),
        Err(_) => {
            warn!(timeout_secs = config.child_timeout.as_secs(), "CLI timed out, killing");
            child.kill().await.ok();
            let mut text = format!("timed out after {}s", config.child_timeout.as_secs());
            if !stdout_lines.is_empty() {
                text.push('\n');
                text.push_str(&stdout_lines.join("\n"));
            }
            Ok(JobResult {
                exit_code: TIMEOUT_EXIT_CODE,
                output: text,
            })
        }
    }
}

async fn write_line<W: AsyncWrite + Unpin>(output: &mut W, line: &str) -> std::io::Result<()> {
    output.write_all(line.as_bytes()).await?;
    output.write_all(b"\n").await?;
    output.flush().await
}
