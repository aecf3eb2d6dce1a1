use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde_json::json;
use tracing::{debug, info, warn};

use crate::error::ClientError;
use crate::interaction_log::{InteractionLog, LogEntry};
use crate::interpreter::{interpret, Interpretation};
use crate::rating::RatingProvider;
use crate::safety::CommandVerdict;
use crate::tools::ToolExecutor;
use crate::types::{ChatMessage, ChatRequest, Tool, ToolResult};
use crate::AiProvider;

/// One executed tool call together with the rating it received.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolRun {
    pub tool_name: String,
    pub arguments: String,
    pub result: ToolResult,
    pub rating: u8,
}

/// How a task turn ended.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskOutcome {
    /// The model returned structured tool calls; each was executed in order.
    ToolsExecuted(Vec<ToolRun>),
    /// A command was recovered from the reply text and dispatched (this
    /// includes denied commands, which are logged but never spawned).
    RecoveredExecuted(ToolRun),
    /// A recovered command that is not read-only; shown, not run.
    Suggested(String),
    Answer(String),
    NoAction,
}

/// Drives a single request: one model round-trip, then the tools it asks for.
pub struct TaskManager {
    provider: Arc<dyn AiProvider + Send + Sync>,
    executor: ToolExecutor,
    log: InteractionLog,
    rater: Box<dyn RatingProvider>,
    model: String,
    tools_enabled: bool,
}

impl TaskManager {
    pub fn new(
        provider: Arc<dyn AiProvider + Send + Sync>,
        executor: ToolExecutor,
        log: InteractionLog,
        rater: Box<dyn RatingProvider>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            provider,
            executor,
            log,
            rater,
            model: model.into(),
            tools_enabled: true,
        }
    }

    pub fn with_tools_enabled(mut self, tools_enabled: bool) -> Self {
        self.tools_enabled = tools_enabled;
        self
    }

    pub fn log(&self) -> &InteractionLog {
        &self.log
    }

    pub fn build_request(&self, query: &str) -> ChatRequest {
        ChatRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage::system(system_prompt(self.executor.get_working_directory())),
                ChatMessage::user(query),
            ],
            tools: if self.tools_enabled {
                tool_definitions()
            } else {
                Vec::new()
            },
            stream: false,
        }
    }

    pub async fn execute_task(&self, query: &str) -> Result<TaskOutcome> {
        println!("🚀 Starting task: {}", query);

        let request = self.build_request(query);
        if request.tools.is_empty() {
            debug!("Tools are disabled; the model can only answer in text");
        } else {
            debug!("Offering {} tool(s) to {}", request.tools.len(), self.model);
        }
        debug!(
            "Request: {}",
            serde_json::to_string_pretty(&request).unwrap_or_default()
        );

        println!("🤖 Analyzing task with {}...", self.model);
        let response = self
            .provider
            .chat(&request)
            .await
            .context("failed to get response from model")?;

        debug!(
            "Response: {}",
            serde_json::to_string_pretty(&response).unwrap_or_default()
        );

        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or(ClientError::NoChoices)?;
        debug!("Finish reason: {:?}", choice.finish_reason);

        let message = choice.message;
        let model_response =
            serde_json::to_string(&message).context("Failed to serialize model response")?;

        let outcome = match interpret(&message) {
            Interpretation::StructuredToolCalls(calls) => {
                println!("🔧 Model wants to use {} tool(s)", calls.len());
                let mut runs = Vec::with_capacity(calls.len());
                for call in &calls {
                    debug!("Tool call {}: {} {}", call.id, call.name(), call.arguments());
                    runs.push(
                        self.run_tool(query, &model_response, call.name(), call.arguments())
                            .await,
                    );
                }
                TaskOutcome::ToolsExecuted(runs)
            }
            Interpretation::RecoveredCommand { command, verdict } => {
                info!("Recovered command from reply text: {} ({:?})", command, verdict);
                match verdict {
                    CommandVerdict::SuggestOnly => {
                        println!("💡 Model suggested command: {}", command);
                        println!("💬 To execute this command, you can run: {}", command);
                        TaskOutcome::Suggested(command)
                    }
                    CommandVerdict::AutoExecute | CommandVerdict::Denied => {
                        println!("💡 Detected command suggestion in response: {}", command);
                        let arguments = json!({ "command": command }).to_string();
                        let run = self
                            .run_tool(query, &model_response, "run_commands", &arguments)
                            .await;
                        TaskOutcome::RecoveredExecuted(run)
                    }
                }
            }
            Interpretation::PlainText(text) => {
                println!("💬 Answer:\n{}", text);
                TaskOutcome::Answer(text)
            }
            Interpretation::Empty => {
                println!("✅ Task completed without tool usage");
                TaskOutcome::NoAction
            }
        };

        Ok(outcome)
    }

    /// Execute, report, rate and log one tool invocation.
    async fn run_tool(
        &self,
        query: &str,
        model_response: &str,
        tool_name: &str,
        arguments: &str,
    ) -> ToolRun {
        println!("🛠️  Executing tool: {}", tool_name);
        let result = self.executor.execute(tool_name, arguments).await;

        println!("📊 Tool result: {} - {}", result.status, result.message);
        if let Some(output) = result.output.as_deref().filter(|o| !o.is_empty()) {
            println!("📤 Output:\n{}", output);
        }

        let rating = self.rater.rate(&result);
        if rating > 0 {
            println!("⭐ Rating saved: {}/5 stars", rating);
        }

        let entry = LogEntry::new(&self.model, tool_name, arguments, &result)
            .with_query(query, model_response)
            .with_tools_enabled(self.tools_enabled)
            .with_rating(rating);

        if let Err(e) = self.log.append(entry).await {
            warn!("Failed to record tool call in {}: {:#}", self.log.path().display(), e);
        }

        ToolRun {
            tool_name: tool_name.to_string(),
            arguments: arguments.to_string(),
            result,
            rating,
        }
    }
}

pub fn system_prompt(working_directory: &Path) -> String {
    format!(
        r#"You are a Red Hat Certified System Administrator (RHCSA) assistant.
You help with Linux system administration: files and permissions, packages (dnf, rpm),
services (systemctl), users and groups, networking, SELinux and the firewall.

Whenever a command must run or a file must change, respond with a tool call in the
"tool_calls" array. Never put the JSON for a call into the message text.

Rules:
1. Use "run_commands" for every shell command, including informational questions
   such as "who is logged in?".
2. Use "edit_files" to change files, passing a line diff (" " context, "+" add, "-" remove).
3. The "arguments" field is a JSON-encoded string, e.g. "{{\"command\": \"who\"}}".
4. Tool names must be exactly "run_commands" or "edit_files".

Example: for "Check current users" call run_commands with arguments "{{\"command\": \"who\"}}".

Prefer safe, tested commands and use sudo only when required.

Current working directory: {}"#,
        working_directory.display()
    )
}

pub fn tool_definitions() -> Vec<Tool> {
    vec![
        Tool::function(
            "edit_files",
            "Edit file contents by providing a diff of changes to make",
            json!({
                "type": "object",
                "properties": {
                    "path": {
                        "type": "string",
                        "description": "Path to the file to edit"
                    },
                    "diff": {
                        "type": "string",
                        "description": "Diff content showing changes to make"
                    },
                    "content": {
                        "type": "string",
                        "description": "Full replacement content, used when no diff is given"
                    }
                },
                "required": ["path", "diff"]
            }),
        ),
        Tool::function(
            "run_commands",
            "Execute shell commands on the system",
            json!({
                "type": "object",
                "properties": {
                    "command": {
                        "type": "string",
                        "description": "Command to execute"
                    },
                    "timeout": {
                        "type": "integer",
                        "description": "Timeout in seconds (optional)"
                    }
                },
                "required": ["command"]
            }),
        ),
    ]
}
