//! Mock command executor for testing.
//!
//! Provides a scripted implementation of the [`CommandExecutor`] trait so
//! the repair loop can be exercised without spawning real processes.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::error::{RunnerError, RunnerResult};
use crate::runner::{CommandExecutor, RunResult};

/// Predefined response for one `run` call.
#[derive(Debug, Clone)]
pub enum MockResponse {
    /// Return this result
    Result(RunResult),
    /// Fail with a timeout after printing this partial output
    Timeout(String),
    /// Fail as if the process could not start
    SpawnFailure(String),
}

impl MockResponse {
    pub fn success(stdout: impl Into<String>) -> Self {
        Self::Result(RunResult::success(stdout))
    }

    pub fn failure(exit_code: i32, stderr: impl Into<String>) -> Self {
        Self::Result(RunResult::failure(exit_code, stderr))
    }

    pub fn timeout(partial_output: impl Into<String>) -> Self {
        Self::Timeout(partial_output.into())
    }
}

/// Captured call information for verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedCall {
    pub command: String,
    pub working_dir: PathBuf,
    pub timeout: Duration,
}

/// Mock executor for testing.
///
/// Responses are returned in order; once the script runs out the last
/// response repeats. An empty script always succeeds.
#[derive(Clone, Default)]
pub struct MockExecutor {
    responses: Arc<RwLock<Vec<MockResponse>>>,
    response_index: Arc<AtomicUsize>,
    captured_calls: Arc<RwLock<Vec<CapturedCall>>>,
}

impl MockExecutor {
    /// Create a new mock executor.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a mock response for the next `run` call.
    pub fn add_response(self, response: MockResponse) -> Self {
        self.responses.write().push(response);
        self
    }

    /// Set multiple responses.
    pub fn with_responses(self, responses: Vec<MockResponse>) -> Self {
        *self.responses.write() = responses;
        self
    }

    /// Get all captured calls.
    pub fn get_calls(&self) -> Vec<CapturedCall> {
        self.captured_calls.read().clone()
    }

    /// Get the number of calls made.
    pub fn call_count(&self) -> usize {
        self.captured_calls.read().len()
    }

    /// Clear all captured calls.
    pub fn clear_calls(&self) {
        self.captured_calls.write().clear();
    }

    fn next_response(&self) -> MockResponse {
        let responses = self.responses.read();
        if responses.is_empty() {
            return MockResponse::success("");
        }
        let index = self.response_index.fetch_add(1, Ordering::SeqCst);
        responses
            .get(index.min(responses.len() - 1))
            .cloned()
            .unwrap_or_else(|| MockResponse::success(""))
    }
}

#[async_trait]
impl CommandExecutor for MockExecutor {
    async fn run(
        &self,
        command: &str,
        working_dir: &Path,
        timeout: Duration,
    ) -> RunnerResult<RunResult> {
        self.captured_calls.write().push(CapturedCall {
            command: command.to_string(),
            working_dir: working_dir.to_path_buf(),
            timeout,
        });

        match self.next_response() {
            MockResponse::Result(result) => Ok(result),
            MockResponse::Timeout(output) => Err(RunnerError::timeout(timeout, output)),
            MockResponse::SpawnFailure(message) => Err(RunnerError::SpawnFailure {
                command: command.to_string(),
                message,
            }),
        }
    }
}
