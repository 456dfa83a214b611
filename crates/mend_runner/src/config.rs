//! Runner configuration types.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default wall-clock bound for synchronous commands.
pub const DEFAULT_TIMEOUT_SECONDS: u64 = 30;

/// Wall-clock bound for verification runs inside the repair loop.
pub const REPAIR_TIMEOUT_SECONDS: u64 = 15;

/// How long a background command's startup output is collected.
pub const SETTLE_WINDOW_MS: u64 = 2000;

/// Per-stream capture limit (5 MiB).
pub const OUTPUT_CAP_BYTES: usize = 5 * 1024 * 1024;

/// Command runner configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RunnerConfig {
    /// Timeout for generic synchronous commands, in seconds
    pub default_timeout_seconds: u64,
    /// Timeout for auto-repair verification runs, in seconds
    pub repair_timeout_seconds: u64,
    /// Startup output collection window for background commands
    pub settle_window_ms: u64,
    /// Maximum bytes buffered per output stream
    pub output_cap_bytes: usize,
    /// Interpreter that replaces a bare `python` invocation
    pub python_interpreter: Option<String>,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            default_timeout_seconds: DEFAULT_TIMEOUT_SECONDS,
            repair_timeout_seconds: REPAIR_TIMEOUT_SECONDS,
            settle_window_ms: SETTLE_WINDOW_MS,
            output_cap_bytes: OUTPUT_CAP_BYTES,
            python_interpreter: None,
        }
    }
}

impl RunnerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn timeout(mut self, seconds: u64) -> Self {
        self.default_timeout_seconds = seconds;
        self
    }

    pub fn repair_timeout(mut self, seconds: u64) -> Self {
        self.repair_timeout_seconds = seconds;
        self
    }

    pub fn settle_window(mut self, ms: u64) -> Self {
        self.settle_window_ms = ms;
        self
    }

    pub fn output_cap(mut self, bytes: usize) -> Self {
        self.output_cap_bytes = bytes;
        self
    }

    pub fn python(mut self, interpreter: impl Into<String>) -> Self {
        self.python_interpreter = Some(interpreter.into());
        self
    }

    pub fn default_timeout(&self) -> Duration {
        Duration::from_secs(self.default_timeout_seconds)
    }

    pub fn repair_run_timeout(&self) -> Duration {
        Duration::from_secs(self.repair_timeout_seconds)
    }

    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_window_ms)
    }
}
