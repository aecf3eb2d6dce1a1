use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::types::{ToolResult, ToolStatus};

pub const DEFAULT_LOG_FILE: &str = "tool_calls.log";
pub const DEFAULT_MAX_ENTRIES: usize = 1000;
pub const DEFAULT_PROJECT_MARKER: &str = "README.md";

/// One tool invocation, as persisted for later fine-tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub model: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub user_query: String,
    /// The assistant message that triggered the call, serialized as JSON.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub model_response: String,
    pub tool_name: String,
    pub arguments: String,
    pub status: ToolStatus,
    pub message: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub output: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub error_details: String,
    pub tools_enabled: bool,
    #[serde(default, skip_serializing_if = "is_unrated")]
    pub rating: u8,
}

fn is_unrated(rating: &u8) -> bool {
    *rating == 0
}

impl LogEntry {
    pub fn new(
        model: impl Into<String>,
        tool_name: impl Into<String>,
        arguments: impl Into<String>,
        result: &ToolResult,
    ) -> Self {
        let error_details = if result.status == ToolStatus::Error {
            result.message.clone()
        } else {
            String::new()
        };

        Self {
            timestamp: Utc::now(),
            model: model.into(),
            user_query: String::new(),
            model_response: String::new(),
            tool_name: tool_name.into(),
            arguments: arguments.into(),
            status: result.status,
            message: result.message.clone(),
            output: result.output_text().to_string(),
            error_details,
            tools_enabled: false,
            rating: 0,
        }
    }

    pub fn with_query(mut self, user_query: impl Into<String>, model_response: impl Into<String>) -> Self {
        self.user_query = user_query.into();
        self.model_response = model_response.into();
        self
    }

    pub fn with_tools_enabled(mut self, tools_enabled: bool) -> Self {
        self.tools_enabled = tools_enabled;
        self
    }

    pub fn with_rating(mut self, rating: u8) -> Self {
        self.rating = rating.min(5);
        self
    }
}

/// Newline-delimited JSON log capped at `max_entries`.
///
/// Every append rewrites the whole file: the existing entries are read back,
/// the new one is pushed, the oldest are dropped and the result is written to
/// a sibling temp file that is renamed over the log.
pub struct InteractionLog {
    path: PathBuf,
    max_entries: usize,
    lock: Mutex<()>,
}

impl InteractionLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            max_entries: DEFAULT_MAX_ENTRIES,
            lock: Mutex::new(()),
        }
    }

    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = max_entries.max(1);
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn append(&self, entry: LogEntry) -> Result<()> {
        let _guard = self.lock.lock().await;

        let mut entries = self.read_entries().await?;
        entries.push(entry);
        if entries.len() > self.max_entries {
            let excess = entries.len() - self.max_entries;
            entries.drain(..excess);
            debug!("Rotated {} old entries out of {}", excess, self.path.display());
        }

        let mut body = String::new();
        for entry in &entries {
            body.push_str(&serde_json::to_string(entry).context("Failed to serialize log entry")?);
            body.push('\n');
        }

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create log directory: {}", parent.display()))?;
        }

        let staging = self.staging_path();
        tokio::fs::write(&staging, body)
            .await
            .with_context(|| format!("Failed to write log file: {}", staging.display()))?;
        tokio::fs::rename(&staging, &self.path)
            .await
            .with_context(|| format!("Failed to replace log file: {}", self.path.display()))?;

        Ok(())
    }

    /// All well-formed entries, oldest first. A missing log is empty.
    pub async fn read_entries(&self) -> Result<Vec<LogEntry>> {
        let data = match tokio::fs::read(&self.path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read log file: {}", self.path.display()))
            }
        };

        Ok(parse_entries(&data))
    }

    fn staging_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| DEFAULT_LOG_FILE.into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

/// Decode NDJSON, silently skipping blank lines and lines that are not
/// UTF-8 or not a valid entry.
pub fn parse_entries(data: &[u8]) -> Vec<LogEntry> {
    let mut skipped = 0usize;
    let entries = data
        .split(|&b| b == b'\n')
        .filter(|line| !line.iter().all(u8::is_ascii_whitespace))
        .filter_map(|line| {
            let entry = std::str::from_utf8(line)
                .ok()
                .and_then(|text| serde_json::from_str::<LogEntry>(text).ok());
            if entry.is_none() {
                skipped += 1;
            }
            entry
        })
        .collect();

    if skipped > 0 {
        warn!("Dropped {} malformed log line(s)", skipped);
    }
    entries
}

/// Where the log lives when no path is configured: next to the first
/// `marker` found walking up from `start`, else beside the executable,
/// else in `start` itself.
pub fn resolve_log_path(start: &Path, marker: &str) -> PathBuf {
    if let Some(root) = start.ancestors().find(|dir| dir.join(marker).is_file()) {
        return root.join(DEFAULT_LOG_FILE);
    }

    if let Some(exe_dir) = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
    {
        return exe_dir.join(DEFAULT_LOG_FILE);
    }

    start.join(DEFAULT_LOG_FILE)
}
