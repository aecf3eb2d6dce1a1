use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command as TokioCommand;
use tracing::{debug, info, warn};

use crate::error::ToolFailure;
use crate::patch::{LinePositionalPatch, PatchStrategy};
use crate::safety;
use crate::tool_args::*;
use crate::types::ToolResult;

pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_MAX_OUTPUT_BYTES: usize = 10 * 1024 * 1024;

const READ_CHUNK: usize = 8 * 1024;

/// Runs the two side-effecting tools the model may call.
#[derive(Clone)]
pub struct ToolExecutor {
    working_directory: PathBuf,
    shell: String,
    default_timeout: Duration,
    max_output_bytes: usize,
    patcher: Arc<dyn PatchStrategy>,
}

impl Default for ToolExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolExecutor {
    pub fn new() -> Self {
        Self {
            working_directory: std::env::current_dir().unwrap_or_else(|_| PathBuf::from("/")),
            shell: detect_shell(),
            default_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            max_output_bytes: DEFAULT_MAX_OUTPUT_BYTES,
            patcher: Arc::new(LinePositionalPatch),
        }
    }

    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    pub fn with_max_output_bytes(mut self, max_output_bytes: usize) -> Self {
        self.max_output_bytes = max_output_bytes;
        self
    }

    pub fn with_patch_strategy(mut self, patcher: Arc<dyn PatchStrategy>) -> Self {
        self.patcher = patcher;
        self
    }

    /// Dispatch a tool call by name. Failures never escape; they come back
    /// as an `error` or `denied` result.
    pub async fn execute(&self, tool_name: &str, raw_args: &str) -> ToolResult {
        let outcome = match tool_name {
            "run_commands" => self.run_commands(raw_args).await,
            "edit_files" => self.edit_files(raw_args).await,
            other => Err(ToolFailure::UnknownTool(other.to_string())),
        };

        outcome.unwrap_or_else(|failure| {
            debug!("Tool {} failed: {}", tool_name, failure);
            ToolResult::from(failure)
        })
    }

    async fn run_commands(&self, raw_args: &str) -> Result<ToolResult, ToolFailure> {
        let args = RunCommandsArgs::parse(raw_args)?;
        let command = args.command.as_str();

        if safety::is_dangerous(command) {
            warn!("Denied dangerous command: {}", command);
            return Err(ToolFailure::SafetyDenial {
                command: command.to_string(),
            });
        }

        let deadline = args
            .timeout_secs()
            .map(Duration::from_secs)
            .unwrap_or(self.default_timeout);

        info!("Executing command: {} (timeout {}s)", command, deadline.as_secs());
        let (status, output) = self.spawn_with_deadline(command, deadline).await?;

        if status.success() {
            Ok(ToolResult::success("Command executed successfully", output))
        } else {
            Err(ToolFailure::Execution {
                status: describe_status(status),
                output,
            })
        }
    }

    /// Run `command` under the shell with stderr folded into stdout, so the
    /// captured output keeps the order the two streams were written in.
    async fn spawn_with_deadline(
        &self,
        command: &str,
        deadline: Duration,
    ) -> Result<(ExitStatus, String), ToolFailure> {
        let mut child = TokioCommand::new(&self.shell)
            .arg("-c")
            .arg(format!("exec 2>&1\n{}", command))
            .current_dir(&self.working_directory)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ToolFailure::Execution {
                status: format!("failed to start {}: {}", self.shell, e),
                output: String::new(),
            })?;

        let stdout = child.stdout.take();
        let cap = self.max_output_bytes;

        let collect = async {
            let (combined, truncated) = read_capped(stdout, cap).await;
            (combined, truncated, child.wait().await)
        };
        let outcome = tokio::time::timeout(deadline, collect).await;

        let (combined, truncated, status) = match outcome {
            Ok(collected) => collected,
            Err(_) => {
                warn!("Command exceeded {}s deadline, killing it", deadline.as_secs());
                if let Err(e) = child.kill().await {
                    debug!("Failed to kill timed out command: {}", e);
                }
                return Err(ToolFailure::Timeout {
                    seconds: deadline.as_secs(),
                });
            }
        };

        let status = status.map_err(|e| ToolFailure::Execution {
            status: e.to_string(),
            output: String::new(),
        })?;

        let mut output = String::from_utf8_lossy(&combined).into_owned();
        if truncated {
            output.push_str(&format!("\n[output truncated at {} bytes]", cap));
        }

        Ok((status, output))
    }

    async fn edit_files(&self, raw_args: &str) -> Result<ToolResult, ToolFailure> {
        let args = EditFilesArgs::parse(raw_args)?;
        let mode = args.mode().ok_or_else(|| {
            ToolFailure::InvalidArguments("Either diff or content is required".to_string())
        })?;

        let full_path = self.working_directory.join(&args.path);
        info!("Editing file: {}", full_path.display());

        let read_failure = |e| ToolFailure::filesystem(format!("Failed to read {}", args.path), e);
        let current = match tokio::fs::read(&full_path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(read_failure(e)),
        };

        // Only patching needs the old text; an overwrite replaces any bytes.
        let updated = match mode {
            EditMode::Patch(diff) => {
                let original = std::str::from_utf8(&current)
                    .map_err(|e| read_failure(std::io::Error::new(ErrorKind::InvalidData, e)))?;
                self.patcher.apply(original, diff)?
            }
            EditMode::Overwrite(content) => content.to_string(),
        };

        write_file(&full_path, &updated)
            .await
            .map_err(|e| ToolFailure::filesystem(format!("Failed to write {}", args.path), e))?;

        let line_delta = line_count(updated.as_bytes()) as i64 - line_count(&current) as i64;
        let byte_delta = updated.len() as i64 - current.len() as i64;

        Ok(ToolResult::success(
            format!(
                "Edited {} ({:+} lines, {:+} bytes)",
                args.path, line_delta, byte_delta
            ),
            format!(
                "{}: {} lines, {} bytes",
                args.path,
                line_count(updated.as_bytes()),
                updated.len()
            ),
        ))
    }

    pub fn set_working_directory(&mut self, path: PathBuf) {
        self.working_directory = path;
        info!("Changed working directory to: {}", self.working_directory.display());
    }

    pub fn get_working_directory(&self) -> &Path {
        &self.working_directory
    }
}

async fn write_file(path: &Path, content: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, content).await
}

/// Line count with `str::lines` semantics, for content that may not be UTF-8.
fn line_count(bytes: &[u8]) -> usize {
    let newlines = bytes.iter().filter(|&&b| b == b'\n').count();
    if bytes.last().map_or(false, |&b| b != b'\n') {
        newlines + 1
    } else {
        newlines
    }
}

/// Read a child pipe to EOF, keeping at most `cap` bytes.
async fn read_capped<R: AsyncRead + Unpin>(reader: Option<R>, cap: usize) -> (Vec<u8>, bool) {
    let mut kept = Vec::new();
    let mut truncated = false;

    let Some(mut reader) = reader else {
        return (kept, truncated);
    };

    let mut chunk = [0u8; READ_CHUNK];
    loop {
        match reader.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => {
                let room = cap.saturating_sub(kept.len());
                if n > room {
                    truncated = true;
                }
                kept.extend_from_slice(&chunk[..n.min(room)]);
            }
            Err(e) => {
                debug!("Stopped reading command output: {}", e);
                break;
            }
        }
    }

    (kept, truncated)
}

fn describe_status(status: ExitStatus) -> String {
    match status.code() {
        Some(code) => format!("exit status {}", code),
        None => status.to_string(),
    }
}

fn detect_shell() -> String {
    let has_bash = std::process::Command::new("bash")
        .arg("--version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .is_ok();

    let shell = if has_bash { "bash" } else { "sh" };
    shell.to_string()
}
