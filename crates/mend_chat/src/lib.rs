//! # mend_chat - AI assistant core for mend
//!
//! This crate turns free-form instructions into project changes:
//! - Parsing generated text into structured file edits
//! - Running a project and repairing it until it works
//! - Dispatching chat instructions to reads, deletes, edits or repairs
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐     ┌─────────────────┐     ┌─────────────────┐
//! │    Workspace    │────▶│   Dispatcher    │────▶│   Auto-Repair   │
//! └────────┬────────┘     └────────┬────────┘     └────────┬────────┘
//!          │                       │                       │
//!          │              ┌────────┴────────┐     ┌────────┴────────┐
//!          │              │  Action Parser  │     │ CommandExecutor │
//!          │              └─────────────────┘     └─────────────────┘
//!          ▼                       ▼
//! ┌─────────────────┐     ┌─────────────────┐
//! │  Content Store  │     │   LLM Adapter   │
//! └─────────────────┘     └─────────────────┘
//! ```

pub mod actions;
pub mod detect;
pub mod dispatch;
pub mod error;
pub mod llm;
pub mod mock;
pub mod repair;
pub mod settings;
pub mod store;
pub mod templates;
pub mod types;
pub mod workspace;

pub use actions::parse_actions;
pub use detect::{detect_run_command, shell_quote, RunRule};
pub use dispatch::{classify_intent, ChatDispatcher, Intent};
pub use error::{ChatError, ChatResult};
pub use llm::{CompletionOptions, CompletionProvider, LlmAdapter, LlmProvider};
pub use mock::{ScriptedProvider, ScriptedReply};
pub use repair::{build_repair_prompt, AutoRepair, RepairConfig};
pub use settings::{RepairSettings, Settings};
pub use store::{ContentStore, FsContentStore, MemoryContentStore};
pub use types::*;
pub use workspace::{CommandReply, KillReply, ProcessSummary, StatusReply, Workspace};

/// Longest prefix of `text` holding at most `limit` characters.
pub fn truncate_chars(text: &str, limit: usize) -> &str {
    match text.char_indices().nth(limit) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_chars() {
        assert_eq!(truncate_chars("hello", 3), "hel");
        assert_eq!(truncate_chars("hi", 10), "hi");
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("abc", 0), "");
    }
}
