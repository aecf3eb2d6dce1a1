//! Conversion of the interaction log into chat fine-tuning examples.
//!
//! Each retained log entry becomes one JSONL line of the form
//! `{"messages": [user, assistant(tool_calls), tool?]}`. Entries written
//! before queries were recorded get a best-effort user query rebuilt from
//! the tool call itself.

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use crate::interaction_log::LogEntry;
use crate::types::{ChatMessage, ToolCallRequest, ToolStatus};

pub const DEFAULT_MIN_RATING: u8 = 3;
pub const DEFAULT_OUTPUT_FILE: &str = "finetuning_data.jsonl";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FineTuningExample {
    pub messages: Vec<ChatMessage>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConversionSummary {
    pub converted: usize,
    pub skipped: usize,
    /// Converted entries whose user query had to be reconstructed.
    pub reconstructed: usize,
}

/// Convert NDJSON log text, keeping unrated entries and those rated at
/// least `min_rating`.
pub fn convert_entries(data: &str, min_rating: u8) -> (Vec<FineTuningExample>, ConversionSummary) {
    let mut summary = ConversionSummary::default();
    let mut examples = Vec::new();

    for (index, line) in data.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let entry: LogEntry = match serde_json::from_str(line) {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Failed to parse line {}: {}", index + 1, e);
                summary.skipped += 1;
                continue;
            }
        };

        if entry.rating > 0 && entry.rating < min_rating {
            summary.skipped += 1;
            continue;
        }

        let example = if entry.user_query.is_empty() {
            summary.reconstructed += 1;
            reconstruct_example(&entry)
        } else {
            match recorded_example(&entry) {
                Ok(example) => example,
                Err(e) => {
                    warn!("Failed to create example from line {}: {}", index + 1, e);
                    summary.skipped += 1;
                    continue;
                }
            }
        };

        examples.push(example);
        summary.converted += 1;
    }

    (examples, summary)
}

/// Read `input`, convert it and write JSONL to `output`.
pub async fn convert_log_file(input: &Path, output: &Path, min_rating: u8) -> Result<ConversionSummary> {
    let data = tokio::fs::read(input)
        .await
        .with_context(|| format!("Failed to open input file: {}", input.display()))?;

    // Invalid bytes become U+FFFD; lines that no longer decode are skipped.
    let (examples, summary) = convert_entries(&String::from_utf8_lossy(&data), min_rating);

    let mut body = String::new();
    for example in &examples {
        body.push_str(&serde_json::to_string(example).context("Failed to serialize example")?);
        body.push('\n');
    }

    tokio::fs::write(output, body)
        .await
        .with_context(|| format!("Failed to create output file: {}", output.display()))?;

    info!(
        "Converted {} example(s) from {} into {}",
        summary.converted,
        input.display(),
        output.display()
    );
    Ok(summary)
}

fn recorded_example(entry: &LogEntry) -> Result<FineTuningExample> {
    let response = if entry.model_response.is_empty() {
        ChatMessage::assistant("")
    } else {
        serde_json::from_str::<ChatMessage>(&entry.model_response)
            .context("failed to parse model_response")?
    };

    let tool_calls = if response.has_tool_calls() {
        response.tool_calls
    } else {
        vec![logged_call(entry)]
    };

    let mut messages = vec![
        ChatMessage::user(&entry.user_query),
        ChatMessage::assistant(response.content).with_tool_calls(tool_calls),
    ];
    messages.extend(tool_result_message(entry));

    Ok(FineTuningExample { messages })
}

fn reconstruct_example(entry: &LogEntry) -> FineTuningExample {
    let mut messages = vec![
        ChatMessage::user(reconstruct_user_query(entry)),
        ChatMessage::assistant(assistant_narrative(entry)).with_tool_calls(vec![logged_call(entry)]),
    ];
    messages.extend(tool_result_message(entry));

    FineTuningExample { messages }
}

fn logged_call(entry: &LogEntry) -> ToolCallRequest {
    ToolCallRequest::new("call_1", &entry.tool_name, &entry.arguments)
}

fn tool_result_message(entry: &LogEntry) -> Option<ChatMessage> {
    (entry.status == ToolStatus::Success && !entry.output.is_empty()).then(|| {
        ChatMessage::tool(format!(
            "Tool execution result:\nStatus: {}\nOutput: {}",
            entry.status, entry.output
        ))
    })
}

/// Best-effort guess at what the user asked, from the tool call alone.
pub fn reconstruct_user_query(entry: &LogEntry) -> String {
    let args: Value = serde_json::from_str(&entry.arguments).unwrap_or(Value::Null);
    let field = |name: &str| args.get(name).and_then(Value::as_str);

    match entry.tool_name.as_str() {
        "run_commands" => match field("command") {
            Some(cmd) if cmd.starts_with("who") || cmd.starts_with("w ") => {
                "Check current users".to_string()
            }
            Some(cmd) if cmd.starts_with("pwd") => "What's the current directory?".to_string(),
            Some(cmd) if cmd.starts_with("ls") => "List files in current directory".to_string(),
            Some(cmd) if cmd.starts_with("ps") => "Show running processes".to_string(),
            Some(cmd) => format!("Execute: {}", cmd),
            None => "Execute a command".to_string(),
        },
        "edit_files" => match field("path") {
            Some(path) => format!("Edit file: {}", path),
            None => "Edit a file".to_string(),
        },
        other => format!("Use tool: {}", other),
    }
}

fn assistant_narrative(entry: &LogEntry) -> String {
    let mut response = format!(
        "I'll help you with that. Let me use the {} tool.",
        entry.tool_name
    );

    match entry.status {
        ToolStatus::Success if !entry.output.is_empty() => {
            response.push_str(&format!(
                "\n\nTool execution completed successfully:\n{}",
                entry.output
            ));
        }
        ToolStatus::Error => {
            response.push_str(&format!("\n\nTool execution failed: {}", entry.message));
        }
        _ => {}
    }

    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Role, ToolResult};
    use tempfile::TempDir;

    fn entry(tool: &str, args: &str, result: &ToolResult) -> LogEntry {
        LogEntry::new("qwen2.5-coder:3b", tool, args, result).with_tools_enabled(true)
    }

    fn line(entry: &LogEntry) -> String {
        serde_json::to_string(entry).unwrap() + "\n"
    }

    #[test]
    fn test_recorded_entry_keeps_model_tool_calls() {
        let call = ToolCallRequest::new("call_abc", "run_commands", r#"{"command":"who"}"#);
        let response = ChatMessage::assistant("").with_tool_calls(vec![call.clone()]);
        let logged = entry(
            "run_commands",
            r#"{"command":"who"}"#,
            &ToolResult::success("Command executed successfully", "root pts/0"),
        )
        .with_query("Who is logged in?", serde_json::to_string(&response).unwrap());

        let (examples, summary) = convert_entries(&line(&logged), DEFAULT_MIN_RATING);
        assert_eq!(summary, ConversionSummary { converted: 1, skipped: 0, reconstructed: 0 });

        let messages = &examples[0].messages;
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0], ChatMessage::user("Who is logged in?"));
        assert_eq!(messages[1].role, Role::Assistant);
        assert_eq!(messages[1].tool_calls, vec![call]);
        assert_eq!(
            messages[2].content,
            "Tool execution result:\nStatus: success\nOutput: root pts/0"
        );
    }

    #[test]
    fn test_recovered_command_gets_reconstructed_call() {
        let response = ChatMessage::assistant(r#"{"command": "uptime"}"#);
        let logged = entry(
            "run_commands",
            r#"{"command":"uptime"}"#,
            &ToolResult::error("Command failed: exit status 1"),
        )
        .with_query("How long has it been up?", serde_json::to_string(&response).unwrap());

        let (examples, _) = convert_entries(&line(&logged), DEFAULT_MIN_RATING);
        let messages = &examples[0].messages;
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1].content, r#"{"command": "uptime"}"#);
        assert_eq!(messages[1].tool_calls[0].id, "call_1");
        assert_eq!(messages[1].tool_calls[0].arguments(), r#"{"command":"uptime"}"#);
    }

    #[test]
    fn test_low_ratings_are_skipped() {
        let result = ToolResult::success("ok", "x");
        let data = [
            line(&entry("run_commands", r#"{"command":"ls"}"#, &result).with_rating(1)),
            line(&entry("run_commands", r#"{"command":"ls"}"#, &result).with_rating(2)),
            line(&entry("run_commands", r#"{"command":"ls"}"#, &result).with_rating(3)),
            line(&entry("run_commands", r#"{"command":"ls"}"#, &result)),
        ]
        .concat();

        let (examples, summary) = convert_entries(&data, DEFAULT_MIN_RATING);
        assert_eq!(examples.len(), 2);
        assert_eq!(summary.skipped, 2);

        let (_, summary) = convert_entries(&data, 1);
        assert_eq!(summary.converted, 4);
    }

    #[test]
    fn test_malformed_lines_are_counted() {
        let data = format!(
            "not json\n\n{}",
            line(&entry("run_commands", r#"{"command":"pwd"}"#, &ToolResult::success("ok", "/root")))
        );
        let (examples, summary) = convert_entries(&data, DEFAULT_MIN_RATING);
        assert_eq!(examples.len(), 1);
        assert_eq!(summary, ConversionSummary { converted: 1, skipped: 1, reconstructed: 1 });
    }

    #[test]
    fn test_unparsable_model_response_is_skipped() {
        let logged = entry("run_commands", r#"{"command":"ls"}"#, &ToolResult::success("ok", "a"))
            .with_query("list", "{broken");
        let (examples, summary) = convert_entries(&line(&logged), DEFAULT_MIN_RATING);
        assert!(examples.is_empty());
        assert_eq!(summary.skipped, 1);
    }

    #[test]
    fn test_reconstructed_user_queries() {
        let ok = ToolResult::success("ok", "");
        let query = |tool: &str, args: &str| reconstruct_user_query(&entry(tool, args, &ok));

        assert_eq!(query("run_commands", r#"{"command":"who -a"}"#), "Check current users");
        assert_eq!(query("run_commands", r#"{"command":"w root"}"#), "Check current users");
        assert_eq!(query("run_commands", r#"{"command":"pwd"}"#), "What's the current directory?");
        assert_eq!(query("run_commands", r#"{"command":"ls -la"}"#), "List files in current directory");
        assert_eq!(query("run_commands", r#"{"command":"ps aux"}"#), "Show running processes");
        assert_eq!(query("run_commands", r#"{"command":"df -h"}"#), "Execute: df -h");
        assert_eq!(query("run_commands", "garbage"), "Execute a command");
        assert_eq!(query("edit_files", r#"{"path":"/etc/motd"}"#), "Edit file: /etc/motd");
        assert_eq!(query("edit_files", "{}"), "Edit a file");
        assert_eq!(query("reboot", "{}"), "Use tool: reboot");
    }

    #[test]
    fn test_legacy_entry_narrative() {
        let failed = entry("run_commands", r#"{"command":"false"}"#, &ToolResult::error("Command failed: exit status 1"));
        let (examples, summary) = convert_entries(&line(&failed), DEFAULT_MIN_RATING);
        assert_eq!(summary.reconstructed, 1);

        let assistant = &examples[0].messages[1];
        assert!(assistant.content.starts_with("I'll help you with that. Let me use the run_commands tool."));
        assert!(assistant.content.ends_with("Tool execution failed: Command failed: exit status 1"));
        assert_eq!(assistant.tool_calls[0].name(), "run_commands");
        assert_eq!(examples[0].messages.len(), 2);
    }

    #[tokio::test]
    async fn test_convert_log_file() {
        let temp_dir = TempDir::new().unwrap();
        let input = temp_dir.path().join("tool_calls.log");
        let output = temp_dir.path().join("out.jsonl");
        std::fs::write(
            &input,
            line(&entry("run_commands", r#"{"command":"ls"}"#, &ToolResult::success("ok", "a b"))),
        )
        .unwrap();

        let summary = convert_log_file(&input, &output, DEFAULT_MIN_RATING).await.unwrap();
        assert_eq!(summary.converted, 1);

        let written = std::fs::read_to_string(&output).unwrap();
        let example: FineTuningExample = serde_json::from_str(written.trim()).unwrap();
        assert_eq!(example.messages[0].content, "List files in current directory");
        assert_eq!(example.messages.len(), 3);
    }

    #[tokio::test]
    async fn test_convert_missing_input() {
        let temp_dir = TempDir::new().unwrap();
        let err = convert_log_file(&temp_dir.path().join("nope.log"), &temp_dir.path().join("o"), 3)
            .await
            .unwrap_err();
        assert!(err.to_string().starts_with("Failed to open input file"));
    }
}
