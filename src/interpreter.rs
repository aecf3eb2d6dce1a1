//! Recovery of tool intent from model replies.
//!
//! Small local models often answer with the tool call written into the
//! message text (fenced JSON, a bare `{"command": ...}` object, or a
//! `{"name": ..., "arguments": ...}` envelope) instead of populating
//! `tool_calls`. This module turns such replies back into a command.

use serde_json::{Map, Value};

use crate::safety::{self, CommandVerdict};
use crate::types::{ChatMessage, ToolCallRequest};

/// What the dispatcher should do with one model message.
#[derive(Debug, Clone, PartialEq)]
pub enum Interpretation {
    StructuredToolCalls(Vec<ToolCallRequest>),
    RecoveredCommand {
        command: String,
        verdict: CommandVerdict,
    },
    PlainText(String),
    Empty,
}

pub fn interpret(message: &ChatMessage) -> Interpretation {
    if message.has_tool_calls() {
        return Interpretation::StructuredToolCalls(message.tool_calls.clone());
    }

    if let (Some(command), auto_execute) = parse_command_from_content(&message.content) {
        let verdict = safety::verdict_for(&command, auto_execute);
        return Interpretation::RecoveredCommand { command, verdict };
    }

    if message.content.trim().is_empty() {
        Interpretation::Empty
    } else {
        Interpretation::PlainText(message.content.clone())
    }
}

/// Extract a shell command from free-form reply text.
///
/// Returns the command, if any, and whether it is read-only enough to run
/// without an explicit tool call.
pub fn parse_command_from_content(content: &str) -> (Option<String>, bool) {
    if content.is_empty() {
        return (None, false);
    }

    let mut working = strip_code_fence(content.trim());

    let mut parsed = parse_object(&working);
    if parsed.is_none() {
        if let Some(candidate) = embedded_object(&working).map(str::to_string) {
            if let Some(object) = parse_object(&candidate) {
                working = candidate;
                parsed = Some(object);
            }
        }
    }

    match parsed {
        Some(object) => match extract_command(&object) {
            Some(command) => {
                let auto_execute = safety::is_read_only(&command);
                (Some(command), auto_execute)
            }
            None => (None, false),
        },
        None => (scan_command_lines(&working), false),
    }
}

fn strip_code_fence(content: &str) -> String {
    if !content.starts_with("```") {
        return content.to_string();
    }

    let mut lines: Vec<&str> = content.split('\n').collect();
    if lines.first().map_or(false, |first| first.trim().starts_with("```")) {
        lines.remove(0);
    }
    if lines.last().map_or(false, |last| last.trim() == "```") {
        lines.pop();
    }
    lines.join("\n").trim().to_string()
}

fn parse_object(text: &str) -> Option<Map<String, Value>> {
    serde_json::from_str::<Map<String, Value>>(text).ok()
}

/// The span from the first `{` to the last `}`, if there is one.
fn embedded_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

fn extract_command(object: &Map<String, Value>) -> Option<String> {
    let non_empty = |value: Option<&Value>| {
        value
            .and_then(Value::as_str)
            .filter(|command| !command.is_empty())
            .map(str::to_string)
    };

    // {"command": "users"}
    if let Some(command) = non_empty(object.get("command")) {
        return Some(command);
    }

    match object.get("arguments") {
        // {"name": "run_commands", "arguments": {"command": "cat /etc/passwd"}}
        Some(Value::Object(arguments)) => non_empty(arguments.get("command")),
        // {"arguments": "{\"command\": \"cat /etc/passwd\"}"}
        Some(Value::String(encoded)) => {
            parse_object(encoded).and_then(|arguments| non_empty(arguments.get("command")))
        }
        _ => None,
    }
}

// Last resort for JSON-ish text that does not parse: `"command": ls -la`.
fn scan_command_lines(content: &str) -> Option<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| line.contains("\"command\"") || line.contains("'command'"))
        .find_map(|line| {
            let (_, rest) = line.split_once(':')?;
            let candidate = rest
                .trim()
                .trim_matches(|c| matches!(c, '"' | '\'' | '{' | '}' | '[' | ']'));
            (!candidate.is_empty() && !candidate.contains('{')).then(|| candidate.to_string())
        })
}
