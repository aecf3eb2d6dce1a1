use super::*;
use std::sync::{Arc, Mutex};

use assert_matches::assert_matches;
use async_trait::async_trait;
use serde_json::json;
use tempfile::TempDir;

use crate::types::{Choice, Role, Usage};

/// Replies with one canned assistant message and records every request.
struct MockAiProvider {
    reply: ChatMessage,
    requests: Mutex<Vec<ChatRequest>>,
}

impl MockAiProvider {
    fn replying(reply: ChatMessage) -> Arc<Self> {
        Arc::new(Self {
            reply,
            requests: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl AiProvider for MockAiProvider {
    async fn chat(&self, request: &ChatRequest) -> std::result::Result<ChatResponse, ClientError> {
        self.requests.lock().unwrap().push(request.clone());
        Ok(ChatResponse {
            model: request.model.clone(),
            choices: vec![Choice {
                index: 0,
                message: self.reply.clone(),
                finish_reason: Some("stop".to_string()),
            }],
            usage: Usage::default(),
            ..ChatResponse::default()
        })
    }

    async fn list_models(&self) -> std::result::Result<Vec<String>, ClientError> {
        Ok(vec!["mock".to_string()])
    }
}

struct EmptyProvider;

#[async_trait]
impl AiProvider for EmptyProvider {
    async fn chat(&self, _request: &ChatRequest) -> std::result::Result<ChatResponse, ClientError> {
        Ok(ChatResponse::default())
    }

    async fn list_models(&self) -> std::result::Result<Vec<String>, ClientError> {
        Ok(Vec::new())
    }
}

struct FixedRating(u8);

impl RatingProvider for FixedRating {
    fn rate(&self, _result: &ToolResult) -> u8 {
        self.0
    }
}

struct Harness {
    _temp_dir: TempDir,
    workdir: std::path::PathBuf,
    manager: TaskManager,
}

fn harness(provider: Arc<dyn AiProvider + Send + Sync>, rater: Box<dyn RatingProvider>) -> Harness {
    let temp_dir = TempDir::new().unwrap();
    let workdir = temp_dir.path().join("work");
    std::fs::create_dir_all(&workdir).unwrap();

    let mut executor = ToolExecutor::new();
    executor.set_working_directory(workdir.clone());
    let log = InteractionLog::new(temp_dir.path().join("tool_calls.log"));

    let manager = TaskManager::new(provider, executor, log, rater, "qwen2.5-coder:3b");
    Harness {
        _temp_dir: temp_dir,
        workdir,
        manager,
    }
}

fn call(id: &str, name: &str, arguments: serde_json::Value) -> ToolCallRequest {
    ToolCallRequest::new(id, name, arguments.to_string())
}

#[tokio::test]
async fn test_structured_tool_calls_run_in_order_and_are_logged() {
    let reply = ChatMessage::assistant("").with_tool_calls(vec![
        call("call_1", "run_commands", json!({"command": "echo hello"})),
        call("call_2", "no_such_tool", json!({})),
        call("call_3", "edit_files", json!({"path": "notes.txt", "content": "hi\n"})),
    ]);
    let provider = MockAiProvider::replying(reply);
    let h = harness(provider.clone(), Box::new(FixedRating(4)));

    let outcome = h.manager.execute_task("say hello").await.unwrap();

    let runs = match outcome {
        TaskOutcome::ToolsExecuted(runs) => runs,
        other => panic!("unexpected outcome: {:?}", other),
    };
    assert_eq!(runs.len(), 3);
    assert_eq!(runs[0].result.output_text(), "hello\n");
    assert_eq!(runs[1].result.message, "Unknown tool: no_such_tool");
    assert!(runs[2].result.is_success());
    assert_eq!(std::fs::read_to_string(h.workdir.join("notes.txt")).unwrap(), "hi\n");

    let entries = h.manager.log().read_entries().await.unwrap();
    assert_eq!(entries.len(), 3);
    assert_eq!(entries[0].tool_name, "run_commands");
    assert_eq!(entries[0].user_query, "say hello");
    assert_eq!(entries[0].rating, 4);
    assert!(entries[0].tools_enabled);
    assert_eq!(entries[1].status, ToolStatus::Error);
    assert_eq!(entries[1].error_details, "Unknown tool: no_such_tool");
    assert_eq!(entries[2].tool_name, "edit_files");

    let logged_reply: ChatMessage = serde_json::from_str(&entries[0].model_response).unwrap();
    assert_eq!(logged_reply.tool_calls.len(), 3);

    let requests = provider.requests.lock().unwrap();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].messages[0].role, Role::System);
    assert_eq!(requests[0].messages[1], ChatMessage::user("say hello"));
    assert_eq!(requests[0].tools.len(), 2);
    assert!(!requests[0].stream);
}

#[tokio::test]
async fn test_recovered_read_only_command_is_executed_and_logged() {
    let provider = MockAiProvider::replying(ChatMessage::assistant("```json\n{\"command\": \"pwd\"}\n```"));
    let h = harness(provider, Box::new(NoRating));

    let outcome = h.manager.execute_task("Where am I?").await.unwrap();

    let run = match outcome {
        TaskOutcome::RecoveredExecuted(run) => run,
        other => panic!("unexpected outcome: {:?}", other),
    };
    assert_eq!(run.tool_name, "run_commands");
    assert_eq!(run.arguments, r#"{"command":"pwd"}"#);
    assert_eq!(run.result.status, ToolStatus::Success);
    assert!(run.result.output_text().trim_end().ends_with("work"));

    let entries = h.manager.log().read_entries().await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].arguments, r#"{"command":"pwd"}"#);
    assert_eq!(entries[0].rating, 0);
}

#[tokio::test]
async fn test_recovered_dangerous_command_is_denied_and_logged() {
    let provider = MockAiProvider::replying(ChatMessage::assistant("```json\n{\"command\": \"rm -rf /\"}\n```"));
    let h = harness(provider, Box::new(NoRating));

    let outcome = h.manager.execute_task("clean up the disk").await.unwrap();

    let run = match outcome {
        TaskOutcome::RecoveredExecuted(run) => run,
        other => panic!("unexpected outcome: {:?}", other),
    };
    assert_eq!(run.result.status, ToolStatus::Denied);
    assert_eq!(run.result.message, "Command was denied for safety reasons");

    let entries = h.manager.log().read_entries().await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].status, ToolStatus::Denied);
    assert_eq!(entries[0].error_details, "");
}

#[tokio::test]
async fn test_recovered_mutating_command_is_only_suggested() {
    let provider = MockAiProvider::replying(ChatMessage::assistant(
        r#"{"name": "run_commands", "arguments": {"command": "touch suggested.txt"}}"#,
    ));
    let h = harness(provider, Box::new(FixedRating(5)));

    let outcome = h.manager.execute_task("make a file").await.unwrap();

    assert_eq!(outcome, TaskOutcome::Suggested("touch suggested.txt".to_string()));
    assert!(!h.workdir.join("suggested.txt").exists());
    assert!(h.manager.log().read_entries().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_line_scanned_read_only_command_is_not_executed() {
    let provider = MockAiProvider::replying(ChatMessage::assistant(
        "Here you go:\n\"command\": \"ls -la\n(oops)",
    ));
    let h = harness(provider, Box::new(FixedRating(5)));

    let outcome = h.manager.execute_task("what is in here?").await.unwrap();

    assert_eq!(outcome, TaskOutcome::Suggested("ls -la".to_string()));
    assert!(h.manager.log().read_entries().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_plain_text_answer_is_not_logged() {
    let provider = MockAiProvider::replying(ChatMessage::assistant("Use `useradd john` to create the user."));
    let h = harness(provider, Box::new(NoRating));

    let outcome = h.manager.execute_task("how do I add a user?").await.unwrap();

    assert_matches!(outcome, TaskOutcome::Answer(text) if text.contains("useradd john"));
    assert!(h.manager.log().read_entries().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_empty_reply_is_no_action() {
    let provider = MockAiProvider::replying(ChatMessage::assistant(""));
    let h = harness(provider, Box::new(NoRating));

    assert_eq!(h.manager.execute_task("anything").await.unwrap(), TaskOutcome::NoAction);
}

#[tokio::test]
async fn test_tools_disabled_sends_no_tool_definitions() {
    let provider = MockAiProvider::replying(ChatMessage::assistant("Try `uptime`."));
    let mut h = harness(provider.clone(), Box::new(NoRating));
    h.manager = h.manager.with_tools_enabled(false);

    h.manager.execute_task("how long has it been up?").await.unwrap();

    let requests = provider.requests.lock().unwrap();
    assert!(requests[0].tools.is_empty());
    let body = serde_json::to_value(&requests[0]).unwrap();
    assert!(body.get("tools").is_none());
}

#[tokio::test]
async fn test_no_choices_is_an_error() {
    let h = harness(Arc::new(EmptyProvider), Box::new(NoRating));

    let err = h.manager.execute_task("hello?").await.unwrap_err();
    assert_matches!(err.downcast_ref::<ClientError>(), Some(ClientError::NoChoices));
    assert_eq!(err.to_string(), "no response from model");
}

#[tokio::test]
async fn test_logged_session_converts_to_finetuning_examples() {
    let reply = ChatMessage::assistant("").with_tool_calls(vec![call(
        "call_a",
        "run_commands",
        json!({"command": "echo root"}),
    )]);
    let h = harness(MockAiProvider::replying(reply), Box::new(FixedRating(5)));
    h.manager.execute_task("who am I?").await.unwrap();

    let data = std::fs::read_to_string(h.manager.log().path()).unwrap();
    let (examples, summary) = finetune::convert_entries(&data, finetune::DEFAULT_MIN_RATING);

    assert_eq!(summary.converted, 1);
    assert_eq!(summary.reconstructed, 0);
    let messages = &examples[0].messages;
    assert_eq!(messages[0], ChatMessage::user("who am I?"));
    assert_eq!(messages[1].tool_calls[0].id, "call_a");
    assert_eq!(
        messages[2].content,
        "Tool execution result:\nStatus: success\nOutput: root\n"
    );
}
