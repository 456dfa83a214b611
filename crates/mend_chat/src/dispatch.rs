//! Chat action dispatcher.
//!
//! Classifies an instruction, then either hands it back to the caller
//! (read, auto-repair), acts on the content store (delete, edits), or asks
//! the completion provider.

use std::sync::Arc;

use regex::Regex;
use tracing::{debug, info, warn};

use crate::actions::parse_actions;
use crate::error::ChatResult;
use crate::llm::{CompletionOptions, CompletionProvider};
use crate::store::ContentStore;
use crate::templates::{file_name_in, starter_template};
use crate::truncate_chars;
use crate::types::{ChatOutcome, FileEdit};

const FILES_ONLY_PROMPT: &str = r#"You are a coding assistant that edits project files directly.
Respond ONLY with file contents in this format:

EXPLANATION: <one sentence>

FILE: <relative path>
```
<complete file content>
```

Use one FILE block per file. Never give step-by-step instructions or
commands for the user to run; write the files instead."#;

const QUESTION_PROMPT: &str =
    "You are a helpful coding assistant working inside the user's project. Answer concisely.";

/// Characters of each past reply kept in the prompt context.
const HISTORY_REPLY_CHARS: usize = 1000;

const ACTION_VERBS: &str =
    r"(?i)\b(?:create|make|write|edit|modify|update|add|change|fix|implement|build|set\s*up|generate)\b";

const REPAIR_TRIGGERS: &[&str] = &["error", "run", "execute", "test", "console"];

/// What an instruction asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    ReadFile(String),
    DeleteFile(String),
    AutoRepair,
    FileEdit,
    Question,
}

/// Classify an instruction. First match wins.
pub fn classify_intent(instruction: &str, has_project: bool) -> Intent {
    let delete = Regex::new(
        r#"(?i)\b(?:delete|remove)\s+(?:the\s+)?(?:file\s+)?(?:(?:named|called)\s+)?['"`]?([\w][\w./-]*\.\w+)['"`]?"#,
    );
    if let Some(path) = delete.ok().and_then(|re| first_capture(&re, instruction)) {
        return Intent::DeleteFile(path);
    }

    let read = Regex::new(
        r#"(?i)\b(?:read|show|view|open|display)\s+(?:me\s+)?(?:the\s+)?(?:(?:file|contents?\s+of)\s+)?(?:the\s+)?(?:file\s+)?['"`]?([\w][\w./-]*\.\w+)['"`]?"#,
    );
    if let Some(path) = read.ok().and_then(|re| first_capture(&re, instruction)) {
        return Intent::ReadFile(path);
    }

    let lower = instruction.to_lowercase();
    if has_project && lower.contains("fix") && REPAIR_TRIGGERS.iter().any(|t| lower.contains(t)) {
        return Intent::AutoRepair;
    }

    if Regex::new(ACTION_VERBS)
        .map(|re| re.is_match(instruction))
        .unwrap_or(false)
    {
        return Intent::FileEdit;
    }

    Intent::Question
}

fn first_capture(re: &Regex, text: &str) -> Option<String> {
    re.captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// Turns chat instructions into outcomes.
pub struct ChatDispatcher {
    store: Arc<dyn ContentStore>,
    provider: Arc<dyn CompletionProvider>,
    history_limit: usize,
}

impl ChatDispatcher {
    pub fn new(store: Arc<dyn ContentStore>, provider: Arc<dyn CompletionProvider>) -> Self {
        Self {
            store,
            provider,
            history_limit: 5,
        }
    }

    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit;
        self
    }

    /// Dispatch one instruction.
    ///
    /// Writes and deletes are persisted before this returns. Provider
    /// failures propagate.
    pub async fn dispatch(
        &self,
        project: Option<&str>,
        instruction: &str,
        image: Option<&str>,
    ) -> ChatResult<ChatOutcome> {
        let intent = classify_intent(instruction, project.is_some());
        info!("Dispatching chat instruction as {:?}", intent);

        let Some(project) = project else {
            return match intent {
                Intent::Question | Intent::FileEdit => {
                    let text = self.ask(None, instruction, image, QUESTION_PROMPT).await?;
                    Ok(ChatOutcome::PlainResponse { text })
                }
                _ => Ok(ChatOutcome::PlainResponse {
                    text: "Open a project first.".to_string(),
                }),
            };
        };

        let outcome = match intent {
            Intent::ReadFile(path) => return Ok(ChatOutcome::ReadFile { path }),
            Intent::AutoRepair => return Ok(ChatOutcome::StartAutoRepair),
            Intent::DeleteFile(path) => self.delete(project, path).await?,
            Intent::FileEdit => self.edit(project, instruction, image).await?,
            Intent::Question => {
                let text = self
                    .ask(Some(project), instruction, image, QUESTION_PROMPT)
                    .await?;
                ChatOutcome::PlainResponse { text }
            }
        };

        self.store
            .append_chat_turn(project, instruction, &summarize(&outcome))
            .await?;
        Ok(outcome)
    }

    async fn delete(&self, project: &str, path: String) -> ChatResult<ChatOutcome> {
        match self.store.delete_file(project, &path).await {
            Ok(()) => {
                info!("Deleted {} from {}", path, project);
                Ok(ChatOutcome::DeleteFile { path })
            }
            Err(e) if e.is_not_found() => Ok(ChatOutcome::PlainResponse {
                text: format!("File {} was not found.", path),
            }),
            Err(e) => Err(e),
        }
    }

    async fn edit(
        &self,
        project: &str,
        instruction: &str,
        image: Option<&str>,
    ) -> ChatResult<ChatOutcome> {
        let response = self
            .ask(Some(project), instruction, image, FILES_ONLY_PROMPT)
            .await?;
        let directive = parse_actions(&response);
        let mut edits = directive.resolved_edits();

        if edits.is_empty() {
            match file_name_in(instruction)
                .and_then(|path| starter_template(&path).map(|content| FileEdit::new(path, content)))
            {
                Some(edit) => {
                    debug!("No file blocks in response, using starter for {}", edit.path);
                    edits.push(edit);
                }
                None => return Ok(ChatOutcome::PlainResponse { text: response }),
            }
        }

        for edit in &edits {
            self.store
                .write_file(project, &edit.path, &edit.content)
                .await?;
        }
        info!("Wrote {} file(s) to {}", edits.len(), project);

        if edits.len() == 1 {
            let edit = edits.remove(0);
            Ok(ChatOutcome::WriteFile {
                path: edit.path,
                content: edit.content,
            })
        } else {
            Ok(ChatOutcome::WriteMultipleFiles { files: edits })
        }
    }

    async fn ask(
        &self,
        project: Option<&str>,
        instruction: &str,
        image: Option<&str>,
        system: &str,
    ) -> ChatResult<String> {
        let prompt = match project {
            Some(project) => format!("{}\n## Request\n{}", self.context(project).await, instruction),
            None => instruction.to_string(),
        };

        let mut options = CompletionOptions::new().system(system);
        if let Some(image) = image {
            options = options.image(image);
        }
        self.provider.complete(&prompt, &options).await
    }

    /// File list plus the most recent chat turns.
    async fn context(&self, project: &str) -> String {
        let mut context = format!("## Project: {}\n", project);

        match self.store.list_project_files(project).await {
            Ok(files) if !files.is_empty() => {
                context.push_str("\n## Files\n");
                for file in files {
                    context.push_str(&format!("- {}\n", file));
                }
            }
            Ok(_) => {}
            Err(e) => debug!("No file list for {}: {}", project, e),
        }

        match self.store.load_chat_history(project).await {
            Ok(history) if !history.is_empty() => {
                context.push_str("\n## Recent Conversation\n");
                let skip = history.len().saturating_sub(self.history_limit);
                for turn in &history[skip..] {
                    context.push_str(&format!(
                        "User: {}\nAssistant: {}\n",
                        turn.user_message,
                        truncate_chars(&turn.ai_response, HISTORY_REPLY_CHARS)
                    ));
                }
            }
            Ok(_) => {}
            Err(e) => warn!("Failed to load chat history for {}: {}", project, e),
        }

        context
    }
}

/// Text recorded as the assistant side of a chat turn.
fn summarize(outcome: &ChatOutcome) -> String {
    match outcome {
        ChatOutcome::ReadFile { path } => format!("Opened {}", path),
        ChatOutcome::DeleteFile { path } => format!("Deleted {}", path),
        ChatOutcome::StartAutoRepair => "Started auto-repair".to_string(),
        ChatOutcome::WriteFile { path, .. } => format!("Wrote {}", path),
        ChatOutcome::WriteMultipleFiles { files } => {
            let paths: Vec<&str> = files.iter().map(|f| f.path.as_str()).collect();
            format!("Wrote {}", paths.join(", "))
        }
        ChatOutcome::PlainResponse { text } => text.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ChatError;
    use crate::mock::{ScriptedProvider, ScriptedReply};
    use crate::store::MemoryContentStore;
    use async_trait::async_trait;
    use mockall::mock;

    mock! {
        pub Provider {}

        #[async_trait]
        impl CompletionProvider for Provider {
            async fn complete(&self, prompt: &str, options: &CompletionOptions) -> ChatResult<String>;
        }
    }

    #[test]
    fn test_classify_delete_and_read() {
        assert_eq!(
            classify_intent("delete the file foo.txt", true),
            Intent::DeleteFile("foo.txt".to_string())
        );
        assert_eq!(
            classify_intent("please remove `src/old.rs`", true),
            Intent::DeleteFile("src/old.rs".to_string())
        );
        assert_eq!(
            classify_intent("show me the contents of app.py", true),
            Intent::ReadFile("app.py".to_string())
        );
        assert_eq!(
            classify_intent("open index.html", false),
            Intent::ReadFile("index.html".to_string())
        );
    }

    #[test]
    fn test_classify_precedence() {
        // Delete phrasing beats the action verbs
        assert_eq!(
            classify_intent("fix the error and delete tmp.log", true),
            Intent::DeleteFile("tmp.log".to_string())
        );
        assert_eq!(
            classify_intent("fix the error when I run it", true),
            Intent::AutoRepair
        );
        assert_eq!(
            classify_intent("fix the error when I run it", false),
            Intent::FileEdit
        );
        assert_eq!(
            classify_intent("add a footer to the page", true),
            Intent::FileEdit
        );
        assert_eq!(
            classify_intent("what does this function do?", true),
            Intent::Question
        );
        assert_eq!(
            classify_intent("remove the unused import", true),
            Intent::Question
        );
    }

    #[tokio::test]
    async fn test_delete_never_calls_provider() {
        let mut provider = MockProvider::new();
        provider.expect_complete().never();

        let store = Arc::new(MemoryContentStore::new().with_file("demo", "foo.txt", "bye"));
        let dispatcher = ChatDispatcher::new(store.clone(), Arc::new(provider));

        let outcome = dispatcher
            .dispatch(Some("demo"), "delete the file foo.txt", None)
            .await
            .unwrap();

        assert_eq!(
            outcome,
            ChatOutcome::DeleteFile {
                path: "foo.txt".to_string()
            }
        );
        assert!(store.file("demo", "foo.txt").is_none());
    }

    #[tokio::test]
    async fn test_delete_missing_file_is_plain_response() {
        let mut provider = MockProvider::new();
        provider.expect_complete().never();

        let store = Arc::new(MemoryContentStore::new().with_file("demo", "a.py", ""));
        let dispatcher = ChatDispatcher::new(store, Arc::new(provider));

        let outcome = dispatcher
            .dispatch(Some("demo"), "delete ghost.txt", None)
            .await
            .unwrap();
        assert!(matches!(outcome, ChatOutcome::PlainResponse { ref text } if text.contains("ghost.txt")));
    }

    #[tokio::test]
    async fn test_read_does_not_touch_store_history() {
        let provider = ScriptedProvider::new();
        let store = Arc::new(MemoryContentStore::new().with_file("demo", "a.py", "x"));
        let dispatcher = ChatDispatcher::new(store.clone(), Arc::new(provider.clone()));

        let outcome = dispatcher.dispatch(Some("demo"), "show a.py", None).await.unwrap();

        assert_eq!(outcome, ChatOutcome::ReadFile { path: "a.py".to_string() });
        assert_eq!(provider.call_count(), 0);
        assert!(store.load_chat_history("demo").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_edit_writes_parsed_files() {
        let provider = ScriptedProvider::new().add_reply(ScriptedReply::text(
            "EXPLANATION: Added two files.\nFILE: index.html\n```html\n<h1>Hi</h1>\n```\nFILE: style.css\n```css\nh1 { color: red; }\n```",
        ));
        let store = Arc::new(MemoryContentStore::new().with_file("site", "README.md", ""));
        let dispatcher = ChatDispatcher::new(store.clone(), Arc::new(provider.clone()));

        let outcome = dispatcher
            .dispatch(Some("site"), "create a landing page", None)
            .await
            .unwrap();

        match outcome {
            ChatOutcome::WriteMultipleFiles { files } => assert_eq!(files.len(), 2),
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert_eq!(store.file("site", "style.css").as_deref(), Some("h1 { color: red; }"));

        let options = provider.options();
        assert!(options[0].system.as_deref().unwrap_or_default().contains("FILE:"));
        assert!(provider.prompts()[0].contains("- README.md"));
        assert_eq!(store.load_chat_history("site").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_edit_falls_back_to_starter_template() {
        let provider = ScriptedProvider::new().add_reply(ScriptedReply::text(
            "Sure! First open your editor, then type some code.",
        ));
        let store = Arc::new(MemoryContentStore::new());
        let dispatcher = ChatDispatcher::new(store.clone(), Arc::new(provider));

        let outcome = dispatcher
            .dispatch(Some("demo"), "create hello.py", None)
            .await
            .unwrap();

        match outcome {
            ChatOutcome::WriteFile { path, content } => {
                assert_eq!(path, "hello.py");
                assert!(content.contains("def main"));
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert!(store.file("demo", "hello.py").is_some());
    }

    #[tokio::test]
    async fn test_question_uses_recent_history_only() {
        let provider = ScriptedProvider::new().add_reply(ScriptedReply::text("42"));
        let store = Arc::new(MemoryContentStore::new().with_file("demo", "a.py", ""));
        for i in 0..8 {
            store
                .append_chat_turn("demo", &format!("question {}", i), "answer")
                .await
                .unwrap();
        }
        let dispatcher = ChatDispatcher::new(store, Arc::new(provider.clone()));

        let outcome = dispatcher
            .dispatch(Some("demo"), "what is the answer?", Some("data:image/png;base64,AA=="))
            .await
            .unwrap();

        assert_eq!(outcome, ChatOutcome::PlainResponse { text: "42".to_string() });
        let prompt = &provider.prompts()[0];
        assert!(!prompt.contains("question 2"));
        assert!(prompt.contains("question 3"));
        assert!(prompt.contains("question 7"));
        assert!(provider.options()[0].image.is_some());
    }

    #[tokio::test]
    async fn test_provider_failure_propagates() {
        let provider = ScriptedProvider::new().add_reply(ScriptedReply::failure(401, "bad key"));
        let store = Arc::new(MemoryContentStore::new());
        let dispatcher = ChatDispatcher::new(store, Arc::new(provider));

        let err = dispatcher
            .dispatch(Some("demo"), "write a parser", None)
            .await
            .unwrap_err();
        assert!(matches!(err, ChatError::ProviderFailure { status: Some(401), .. }));
    }
}
