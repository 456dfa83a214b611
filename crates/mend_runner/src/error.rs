//! Error types for the runner module.

use thiserror::Error;

/// Result type alias for runner operations.
pub type RunnerResult<T> = Result<T, RunnerError>;

/// Errors that can occur during runner operations.
#[derive(Error, Debug)]
pub enum RunnerError {
    #[error("Failed to spawn '{command}': {message}")]
    SpawnFailure { command: String, message: String },

    /// `output` holds whatever the command printed before it was killed.
    #[error("Command timed out after {millis}ms")]
    Timeout { millis: u64, output: String },

    #[error("Process not found: {0}")]
    ProcessNotFound(u32),

    #[error("Failed to terminate process {pid}: {message}")]
    KillFailed { pid: u32, message: String },

    #[error("No preview server running for project: {0}")]
    PreviewNotFound(String),

    #[error("Preview unavailable: {0}")]
    PreviewUnavailable(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl RunnerError {
    pub(crate) fn spawn(command: &str, err: impl std::fmt::Display) -> Self {
        Self::SpawnFailure {
            command: command.to_string(),
            message: err.to_string(),
        }
    }

    pub(crate) fn timeout(limit: std::time::Duration, output: impl Into<String>) -> Self {
        Self::Timeout {
            millis: limit.as_millis() as u64,
            output: output.into(),
        }
    }

    /// Output captured before the failure, if any was kept.
    pub fn partial_output(&self) -> Option<&str> {
        match self {
            Self::Timeout { output, .. } if !output.trim().is_empty() => Some(output),
            _ => None,
        }
    }

    /// Captured output followed by the error message.
    pub fn with_output(&self) -> String {
        match self.partial_output() {
            Some(output) => format!("{}\n\n{}", output.trim_end(), self),
            None => self.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_timeout_reports_milliseconds() {
        let err = RunnerError::timeout(Duration::from_millis(500), "Traceback: partial\n");
        assert_eq!(err.to_string(), "Command timed out after 500ms");
        assert_eq!(err.partial_output(), Some("Traceback: partial\n"));
        assert_eq!(
            err.with_output(),
            "Traceback: partial\n\nCommand timed out after 500ms"
        );

        let silent = RunnerError::timeout(Duration::from_secs(15), "");
        assert_eq!(silent.to_string(), "Command timed out after 15000ms");
        assert_eq!(silent.partial_output(), None);
        assert_eq!(silent.with_output(), silent.to_string());
    }
}
