use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::ai_providers::{DEFAULT_BASE_URL, DEFAULT_MODEL, DEFAULT_REQUEST_TIMEOUT_SECS};
use crate::interaction_log::{resolve_log_path, DEFAULT_MAX_ENTRIES, DEFAULT_PROJECT_MARKER};
use crate::tools::{DEFAULT_MAX_OUTPUT_BYTES, DEFAULT_TIMEOUT_SECS};

/// Looked up in the current directory when no `--config` is given.
pub const DEFAULT_CONFIG_FILE: &str = "tinypenguin.toml";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub endpoint: EndpointConfig,
    pub tools: ToolsConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointConfig {
    pub url: String,
    pub model: String,
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    pub enabled: bool,
    pub default_timeout_secs: u64,
    pub max_output_bytes: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Tracing filter used when `--debug` is not given.
    pub level: String,
    /// Fixed interaction log path; discovered from `project_marker` when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_log: Option<PathBuf>,
    pub max_entries: usize,
    pub project_marker: String,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
        }
    }
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            default_timeout_secs: DEFAULT_TIMEOUT_SECS,
            max_output_bytes: DEFAULT_MAX_OUTPUT_BYTES,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            tool_log: None,
            max_entries: DEFAULT_MAX_ENTRIES,
            project_marker: DEFAULT_PROJECT_MARKER.to_string(),
        }
    }
}

impl Config {
    /// Load `config_path`, or `./tinypenguin.toml` if it exists, or defaults.
    /// Missing keys take their default values.
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let config_path = match config_path {
            Some(path) => path.to_path_buf(),
            None => {
                let local = PathBuf::from(DEFAULT_CONFIG_FILE);
                if !local.is_file() {
                    return Ok(Self::default());
                }
                local
            }
        };

        let config_str = std::fs::read_to_string(&config_path)
            .with_context(|| format!("Could not read config file: {}", config_path.display()))?;

        toml::from_str(&config_str).with_context(|| {
            format!("Could not parse config file at: {}", config_path.display())
        })
    }

    /// Apply command-line (or environment) values over the file settings.
    pub fn with_overrides(mut self, url: Option<String>, model: Option<String>, tools: Option<bool>) -> Self {
        if let Some(url) = url {
            self.endpoint.url = url;
        }
        if let Some(model) = model {
            self.endpoint.model = model;
        }
        if let Some(enabled) = tools {
            self.tools.enabled = enabled;
        }
        self
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.endpoint.request_timeout_secs.max(1))
    }

    pub fn default_command_timeout(&self) -> Duration {
        Duration::from_secs(self.tools.default_timeout_secs.max(1))
    }

    pub fn tool_log_path(&self, working_directory: &Path) -> PathBuf {
        match &self.logging.tool_log {
            Some(path) => path.clone(),
            None => resolve_log_path(working_directory, &self.logging.project_marker),
        }
    }
}
