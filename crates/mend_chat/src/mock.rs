//! Scripted completion provider for testing.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::error::{ChatError, ChatResult};
use crate::llm::{CompletionOptions, CompletionProvider};

/// Predefined reply for one `complete` call.
#[derive(Debug, Clone)]
pub enum ScriptedReply {
    Text(String),
    /// Fail with a provider error
    Failure { status: Option<u16>, body: String },
}

impl ScriptedReply {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }

    pub fn failure(status: u16, body: impl Into<String>) -> Self {
        Self::Failure {
            status: Some(status),
            body: body.into(),
        }
    }
}

/// Completion provider that replays a script and records prompts.
///
/// Once the script runs out the last reply repeats. An empty script
/// answers with an empty string.
#[derive(Clone, Default)]
pub struct ScriptedProvider {
    replies: Arc<RwLock<Vec<ScriptedReply>>>,
    reply_index: Arc<AtomicUsize>,
    prompts: Arc<RwLock<Vec<(String, CompletionOptions)>>>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_reply(self, reply: ScriptedReply) -> Self {
        self.replies.write().push(reply);
        self
    }

    pub fn with_replies(self, replies: Vec<ScriptedReply>) -> Self {
        *self.replies.write() = replies;
        self
    }

    /// Prompts received so far, in order.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.read().iter().map(|(p, _)| p.clone()).collect()
    }

    /// Options received with each prompt.
    pub fn options(&self) -> Vec<CompletionOptions> {
        self.prompts.read().iter().map(|(_, o)| o.clone()).collect()
    }

    pub fn call_count(&self) -> usize {
        self.prompts.read().len()
    }

    fn next_reply(&self) -> ScriptedReply {
        let replies = self.replies.read();
        if replies.is_empty() {
            return ScriptedReply::text("");
        }
        let index = self.reply_index.fetch_add(1, Ordering::SeqCst);
        replies
            .get(index.min(replies.len() - 1))
            .cloned()
            .unwrap_or_else(|| ScriptedReply::text(""))
    }
}

#[async_trait]
impl CompletionProvider for ScriptedProvider {
    async fn complete(&self, prompt: &str, options: &CompletionOptions) -> ChatResult<String> {
        self.prompts
            .write()
            .push((prompt.to_string(), options.clone()));

        match self.next_reply() {
            ScriptedReply::Text(text) => Ok(text),
            ScriptedReply::Failure { status, body } => Err(ChatError::provider(status, body)),
        }
    }
}
