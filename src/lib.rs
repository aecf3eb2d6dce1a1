//! tinypenguin: a local-LLM system administration assistant.
//!
//! A request goes to an OpenAI-style chat endpoint; the tool calls that come
//! back (or a command recovered from a malformed reply) pass through a
//! pattern-based safety gate and are executed, rated and appended to an
//! NDJSON log that can later be turned into fine-tuning data.

use async_trait::async_trait;

pub mod ai_providers;
pub mod config;
pub mod error;
pub mod finetune;
pub mod interaction_log;
pub mod interpreter;
pub mod patch;
pub mod rating;
pub mod safety;
pub mod task;
pub mod tool_args;
pub mod tools;
pub mod types;

pub use error::{ClientError, PatchError, ToolFailure};
pub use interaction_log::{InteractionLog, LogEntry};
pub use interpreter::{interpret, parse_command_from_content, Interpretation};
pub use patch::{LinePositionalPatch, PatchStrategy};
pub use rating::{NoRating, PromptRating, RatingProvider};
pub use safety::CommandVerdict;
pub use task::{TaskManager, TaskOutcome, ToolRun};
pub use tools::ToolExecutor;
pub use types::{ChatMessage, ChatRequest, ChatResponse, ToolCallRequest, ToolResult, ToolStatus};

// ==================== Supporting Components ====================

/// A chat-completion backend.
#[async_trait]
pub trait AiProvider {
    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, ClientError>;
    async fn list_models(&self) -> Result<Vec<String>, ClientError>;
}

#[cfg(test)]
mod tests;
