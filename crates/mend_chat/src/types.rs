//! Core types shared by the parser, the repair loop and the dispatcher.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One user/assistant exchange in a project's chat transcript.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    #[serde(rename = "userMessage")]
    pub user_message: String,
    #[serde(rename = "aiResponse")]
    pub ai_response: String,
    pub timestamp: DateTime<Utc>,
}

impl ChatTurn {
    pub fn new(user_message: impl Into<String>, ai_response: impl Into<String>) -> Self {
        Self {
            user_message: user_message.into(),
            ai_response: ai_response.into(),
            timestamp: Utc::now(),
        }
    }
}

/// A full-content replacement for one project file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEdit {
    pub path: String,
    pub content: String,
}

impl FileEdit {
    pub fn new(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
        }
    }
}

/// Structured result of parsing generated text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionDirective {
    /// Text of the `EXPLANATION:` section, empty if absent
    pub explanation: String,
    /// Edits in order of appearance; a path may repeat
    #[serde(rename = "fileEdits")]
    pub file_edits: Vec<FileEdit>,
}

impl ActionDirective {
    /// No actionable edit was found.
    pub fn is_empty(&self) -> bool {
        self.file_edits.is_empty()
    }

    /// One edit per path, last occurrence wins, ordered by first appearance.
    pub fn resolved_edits(&self) -> Vec<FileEdit> {
        let mut resolved: Vec<FileEdit> = Vec::with_capacity(self.file_edits.len());
        for edit in &self.file_edits {
            match resolved.iter_mut().find(|e| e.path == edit.path) {
                Some(existing) => existing.content = edit.content.clone(),
                None => resolved.push(edit.clone()),
            }
        }
        resolved
    }
}

/// Outcome of one repair attempt record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AttemptOutcome {
    Success,
    ErrorDetected,
    FixApplied,
    NoFixFound,
}

/// One entry in the repair loop's audit trail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepairAttempt {
    /// 1-based run iteration this entry belongs to
    pub index: u32,
    pub outcome: AttemptOutcome,
    /// Command output, truncated for display
    pub command_output: String,
    /// Files written by a fix; empty unless outcome is `FixApplied`
    pub applied_files: BTreeSet<String>,
    /// Explanation given by the provider for a fix
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub explanation: String,
}

impl RepairAttempt {
    pub fn new(index: u32, outcome: AttemptOutcome, command_output: impl Into<String>) -> Self {
        Self {
            index,
            outcome,
            command_output: command_output.into(),
            applied_files: BTreeSet::new(),
            explanation: String::new(),
        }
    }
}

/// Terminal state of a repair loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RepairStatus {
    /// The command ran without failure
    Success,
    /// Attempts ran out, or the provider offered no fix
    Exhausted,
    /// No command could be determined, or the project cannot be run
    Abandoned,
    /// A provider or persistence failure ended the loop
    Aborted,
}

/// Everything a caller needs to render a repair run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepairReport {
    pub status: RepairStatus,
    pub message: String,
    pub command: Option<String>,
    pub attempts: Vec<RepairAttempt>,
    /// Output of the last run, untruncated
    pub final_output: String,
    /// Set when the completion provider failure ended the loop
    #[serde(default)]
    pub provider_failure: bool,
}

impl RepairReport {
    pub fn success(&self) -> bool {
        self.status == RepairStatus::Success
    }

    /// Highest run iteration reached.
    pub fn runs(&self) -> u32 {
        self.attempts.iter().map(|a| a.index).max().unwrap_or(0)
    }
}

/// Outcome of dispatching a chat instruction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ChatOutcome {
    /// Caller should read and show the file
    ReadFile { path: String },
    /// The file was deleted
    DeleteFile { path: String },
    /// Caller should start the auto-repair loop
    StartAutoRepair,
    /// One file was written
    WriteFile { path: String, content: String },
    /// Several files were written
    WriteMultipleFiles { files: Vec<FileEdit> },
    /// Plain text answer
    PlainResponse { text: String },
}
