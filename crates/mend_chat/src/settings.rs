//! Workspace settings loaded from `.mend/settings.json`.

use std::path::{Path, PathBuf};

use mend_runner::RunnerConfig;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ChatResult;

/// Workspace-level settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    /// `openai` or `anthropic`
    pub default_provider: String,
    pub default_model: Option<String>,
    /// Chat turns given to the provider as context
    pub history_limit: usize,
    pub repair: RepairSettings,
    pub runner: RunnerConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            default_provider: "openai".to_string(),
            default_model: None,
            history_limit: 5,
            repair: RepairSettings::default(),
            runner: RunnerConfig::default(),
        }
    }
}

/// Bounds for the auto-repair loop and its prompts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RepairSettings {
    pub max_attempts: u32,
    pub max_context_files: usize,
    pub max_file_chars: usize,
    pub max_error_chars: usize,
    pub attempt_output_chars: usize,
}

impl Default for RepairSettings {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            max_context_files: 10,
            max_file_chars: 3000,
            max_error_chars: 3000,
            attempt_output_chars: 500,
        }
    }
}

impl Settings {
    /// Path of the settings file inside a workspace.
    pub fn path(workspace_root: &Path) -> PathBuf {
        workspace_root.join(".mend").join("settings.json")
    }

    /// Load settings, falling back to defaults when the file is absent.
    pub fn load(workspace_root: &Path) -> ChatResult<Self> {
        let path = Self::path(workspace_root);
        if !path.exists() {
            debug!("No settings at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&path)?;
        let settings = serde_json::from_str(&content)?;
        Ok(settings)
    }

    /// Write settings back to the workspace.
    pub fn save(&self, workspace_root: &Path) -> ChatResult<()> {
        let path = Self::path(workspace_root);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}
