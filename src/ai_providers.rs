use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use crate::error::ClientError;
use crate::types::{ChatRequest, ChatResponse};
use crate::AiProvider;

pub const DEFAULT_BASE_URL: &str = "http://localhost:11434/v1";
pub const DEFAULT_MODEL: &str = "qwen2.5-coder:3b";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 120;

// ==================== Local OpenAI-compatible Provider ====================

/// Talks to a locally hosted OpenAI-style endpoint such as Ollama's `/v1`.
pub struct LocalLlmProvider {
    client: Client,
    base_url: String,
}

/// `/models` as served by OpenAI-compatible servers (`data`) or Ollama's
/// native listing (`models`).
#[derive(Deserialize, Default)]
struct ModelList {
    #[serde(default)]
    data: Vec<OpenAiModel>,
    #[serde(default)]
    models: Vec<OllamaModel>,
}

#[derive(Deserialize)]
struct OpenAiModel {
    id: String,
}

#[derive(Deserialize)]
struct OllamaModel {
    name: String,
}

impl LocalLlmProvider {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_timeout(base_url, Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS))
    }

    pub fn with_timeout(base_url: impl Into<String>, timeout: Duration) -> Self {
        let base_url = base_url.into();
        let base_url = if base_url.trim().is_empty() {
            DEFAULT_BASE_URL.to_string()
        } else {
            base_url.trim().trim_end_matches('/').to_string()
        };

        Self {
            client: Client::builder()
                .timeout(timeout)
                .build()
                .unwrap_or_else(|_| Client::new()),
            base_url,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn read_body(response: reqwest::Response) -> Result<String, ClientError> {
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(ClientError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(body)
    }
}

#[async_trait]
impl AiProvider for LocalLlmProvider {
    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, ClientError> {
        let url = format!("{}/chat/completions", self.base_url);
        debug!("POST {} (model {}, {} tool(s))", url, request.model, request.tools.len());

        let response = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .json(request)
            .send()
            .await?;

        let body = Self::read_body(response).await?;
        Ok(serde_json::from_str(&body)?)
    }

    async fn list_models(&self) -> Result<Vec<String>, ClientError> {
        let url = format!("{}/models", self.base_url);
        debug!("GET {}", url);

        let response = self.client.get(&url).send().await?;
        let body = Self::read_body(response).await?;
        let list: ModelList = serde_json::from_str(&body)?;

        Ok(list
            .data
            .into_iter()
            .map(|m| m.id)
            .chain(list.models.into_iter().map(|m| m.name))
            .collect())
    }
}
