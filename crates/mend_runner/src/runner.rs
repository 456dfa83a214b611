//! Command executor trait and types.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::RunnerResult;

/// Result of a synchronous command execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunResult {
    /// Captured stdout
    pub stdout: String,
    /// Captured stderr
    pub stderr: String,
    /// Whether the process reported failure (non-zero exit or signal)
    pub exit_failed: bool,
    /// Exit code, if the process exited normally
    pub exit_code: Option<i32>,
    /// Whether either stream hit the capture limit
    pub truncated: bool,
    /// Execution start time
    pub started_at: DateTime<Utc>,
    /// Duration in milliseconds
    pub duration_ms: u64,
}

impl RunResult {
    /// A finished run with exit code 0.
    pub fn success(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: String::new(),
            exit_failed: false,
            exit_code: Some(0),
            truncated: false,
            started_at: Utc::now(),
            duration_ms: 0,
        }
    }

    /// A finished run with a non-zero exit code.
    pub fn failure(exit_code: i32, stderr: impl Into<String>) -> Self {
        Self {
            stdout: String::new(),
            stderr: stderr.into(),
            exit_failed: true,
            exit_code: Some(exit_code),
            truncated: false,
            started_at: Utc::now(),
            duration_ms: 0,
        }
    }

    /// The output a caller should show: stdout if present, else stderr.
    pub fn output(&self) -> &str {
        if self.stdout.trim().is_empty() {
            &self.stderr
        } else {
            &self.stdout
        }
    }

    /// Get combined output (stdout + stderr).
    pub fn combined_output(&self) -> String {
        if self.stdout.is_empty() {
            self.stderr.clone()
        } else if self.stderr.is_empty() {
            self.stdout.clone()
        } else {
            format!("{}\n{}", self.stdout, self.stderr)
        }
    }
}

/// A long-running command that was detached and registered.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackgroundLaunch {
    pub key: String,
    pub pid: u32,
    pub command: String,
    /// Port detected from the startup banner or the command line
    pub port: Option<u16>,
    pub urls: Vec<String>,
    /// Output collected during the settle window
    pub banner: String,
    /// Whether a ready line was seen before the settle window closed
    pub ready: bool,
    /// False when both output streams closed during the settle window
    pub running: bool,
}

impl BackgroundLaunch {
    /// Human-readable launch summary returned in place of raw output.
    pub fn message(&self) -> String {
        let mut message = if self.running {
            format!("Server started in background (PID: {})", self.pid)
        } else {
            format!("Process {} exited during startup", self.pid)
        };
        match self.port {
            Some(port) => {
                message.push_str(&format!("\nDetected port: {}", port));
                message.push_str("\nAccess URLs:");
                for url in &self.urls {
                    message.push_str(&format!("\n  {}", url));
                }
            }
            None => message.push_str("\nNo port detected yet"),
        }
        if !self.banner.trim().is_empty() {
            message.push_str("\n\n");
            message.push_str(self.banner.trim_end());
        }
        message
    }
}

/// What a classified command produced.
#[derive(Debug, Clone)]
pub enum CommandOutcome {
    Completed(RunResult),
    Background(BackgroundLaunch),
}

/// Synchronous command execution seam.
///
/// The repair loop depends on this trait only, so it can be driven by
/// [`crate::MockExecutor`] in tests.
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    /// Run a command to completion under a wall-clock timeout.
    async fn run(
        &self,
        command: &str,
        working_dir: &Path,
        timeout: Duration,
    ) -> RunnerResult<RunResult>;
}
