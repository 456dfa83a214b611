//! Error types for the chat system.

use mend_runner::RunnerError;
use thiserror::Error;

/// Longest provider error body kept in an error message.
pub const PROVIDER_BODY_LIMIT: usize = 500;

/// Chat system errors
#[derive(Error, Debug)]
pub enum ChatError {
    /// Project or file not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Path escapes the project or is otherwise unusable
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// No completion provider is configured
    #[error("LLM not configured. Set OPENAI_API_KEY or ANTHROPIC_API_KEY")]
    LlmNotConfigured,

    /// Completion provider transport, auth or non-2xx failure
    #[error("Completion provider error{}: {body}", status_suffix(.status))]
    ProviderFailure { status: Option<u16>, body: String },

    /// Command execution error
    #[error(transparent)]
    Runner(#[from] RunnerError),

    /// File system error
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

impl ChatError {
    /// Build a provider failure, truncating the body.
    pub fn provider(status: Option<u16>, body: impl AsRef<str>) -> Self {
        Self::ProviderFailure {
            status,
            body: crate::truncate_chars(body.as_ref(), PROVIDER_BODY_LIMIT).to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" {}", s)).unwrap_or_default()
}

/// Result type for chat operations
pub type ChatResult<T> = Result<T, ChatError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_body_is_truncated() {
        let err = ChatError::provider(Some(500), "x".repeat(2000));
        match &err {
            ChatError::ProviderFailure { status, body } => {
                assert_eq!(*status, Some(500));
                assert_eq!(body.chars().count(), PROVIDER_BODY_LIMIT);
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert!(err.to_string().starts_with("Completion provider error 500: xxx"));
        assert_eq!(
            ChatError::provider(None, "connection refused").to_string(),
            "Completion provider error: connection refused"
        );
    }

    #[test]
    fn test_wrapped_errors_convert() {
        let runner: ChatError = RunnerError::PreviewNotFound("demo".to_string()).into();
        assert_eq!(runner.to_string(), "No preview server running for project: demo");
        assert!(std::error::Error::source(&runner).is_none());

        let io: ChatError = std::io::Error::new(std::io::ErrorKind::Other, "disk full").into();
        assert!(matches!(io, ChatError::IoError(_)));
        assert_eq!(io.to_string(), "I/O error: disk full");

        let json: ChatError = serde_json::from_str::<u32>("nope").unwrap_err().into();
        assert!(matches!(json, ChatError::SerializationError(_)));
        assert!(json.to_string().starts_with("Serialization error: "));
    }
}
