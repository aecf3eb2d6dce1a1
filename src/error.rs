use thiserror::Error;

use crate::types::ToolResult;

/// Failures raised while talking to the inference endpoint. These abort the
/// current task; nothing retries them.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("failed to execute request: {0}")]
    Request(#[from] reqwest::Error),

    #[error("API error (status {status}): {body}")]
    Status { status: u16, body: String },

    #[error("failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("no response from model")]
    NoChoices,
}

/// Everything that can go wrong inside a single tool invocation. None of
/// these escape the dispatcher: each one is folded into a [`ToolResult`].
#[derive(Debug, Error)]
pub enum ToolFailure {
    #[error("Failed to parse {tool} arguments: {reason}")]
    Parse { tool: &'static str, reason: String },

    #[error("{0}")]
    InvalidArguments(String),

    #[error("Command was denied for safety reasons")]
    SafetyDenial { command: String },

    #[error("Command failed: {status}")]
    Execution { status: String, output: String },

    #[error("Command timed out")]
    Timeout { seconds: u64 },

    #[error("{context}: {source}")]
    Filesystem {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to apply diff: {0}")]
    Patch(#[from] PatchError),

    #[error("Unknown tool: {0}")]
    UnknownTool(String),
}

impl ToolFailure {
    pub fn filesystem(context: impl Into<String>, source: std::io::Error) -> Self {
        ToolFailure::Filesystem {
            context: context.into(),
            source,
        }
    }
}

impl From<ToolFailure> for ToolResult {
    fn from(failure: ToolFailure) -> Self {
        match failure {
            ToolFailure::SafetyDenial { .. } => ToolResult::denied(failure.to_string()),
            ToolFailure::Execution { ref output, .. } => {
                let output = output.clone();
                ToolResult::error(failure.to_string()).with_output(output)
            }
            other => ToolResult::error(other.to_string()),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PatchError {
    #[error("line {line_number} has no diff prefix (' ', '+' or '-'): {line:?}")]
    UnrecognizedLine { line_number: usize, line: String },
}
