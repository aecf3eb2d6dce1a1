use serde::{de::DeserializeOwned, Deserialize};

use crate::error::ToolFailure;

/// Arguments of one tool, decoded from the JSON text the model supplied.
pub trait ToolArgumentParser: Sized + DeserializeOwned {
    /// Tool name used in parse error messages.
    const TOOL: &'static str;

    fn parse_json(args: &str) -> Result<Self, ToolFailure> {
        serde_json::from_str(args.trim()).map_err(|e| ToolFailure::Parse {
            tool: Self::TOOL,
            reason: e.to_string(),
        })
    }

    fn validate(&self) -> Result<(), ToolFailure> {
        Ok(())
    }

    fn parse(args: &str) -> Result<Self, ToolFailure> {
        let parsed = Self::parse_json(args)?;
        parsed.validate()?;
        Ok(parsed)
    }
}

/// Arguments for the run_commands tool
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct RunCommandsArgs {
    #[serde(default)]
    pub command: String,
    /// Seconds; zero or negative means "use the default".
    #[serde(default)]
    pub timeout: Option<i64>,
}

impl RunCommandsArgs {
    pub fn timeout_secs(&self) -> Option<u64> {
        self.timeout.filter(|secs| *secs > 0).map(|secs| secs as u64)
    }
}

impl ToolArgumentParser for RunCommandsArgs {
    const TOOL: &'static str = "run_commands";

    fn validate(&self) -> Result<(), ToolFailure> {
        if self.command.trim().is_empty() {
            return Err(ToolFailure::InvalidArguments("Command is required".to_string()));
        }
        Ok(())
    }
}

/// Arguments for the edit_files tool
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct EditFilesArgs {
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub diff: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
}

/// What an edit_files call asks for once the arguments are validated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditMode<'a> {
    Patch(&'a str),
    Overwrite(&'a str),
}

impl EditFilesArgs {
    /// A non-empty diff takes precedence over full content.
    pub fn mode(&self) -> Option<EditMode<'_>> {
        match (self.diff.as_deref(), self.content.as_deref()) {
            (Some(diff), _) if !diff.is_empty() => Some(EditMode::Patch(diff)),
            (_, Some(content)) => Some(EditMode::Overwrite(content)),
            _ => None,
        }
    }
}

impl ToolArgumentParser for EditFilesArgs {
    const TOOL: &'static str = "edit_files";

    fn validate(&self) -> Result<(), ToolFailure> {
        if self.path.trim().is_empty() {
            return Err(ToolFailure::InvalidArguments("Path is required".to_string()));
        }

        if self.path.contains('\0') {
            return Err(ToolFailure::InvalidArguments(
                "File path cannot contain null bytes".to_string(),
            ));
        }

        if self.mode().is_none() {
            return Err(ToolFailure::InvalidArguments(
                "Either diff or content is required".to_string(),
            ));
        }

        Ok(())
    }
}
