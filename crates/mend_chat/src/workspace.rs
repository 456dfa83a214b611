//! Workspace facade: the command-execution surface exposed to callers.
//!
//! One `Workspace` owns the process registry, the preview servers, the
//! content store and the completion provider for a workspace root.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use mend_runner::{
    CommandOutcome, CommandRunner, PreviewInfo, PreviewManager, ProcessRegistry,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::dispatch::ChatDispatcher;
use crate::error::{ChatError, ChatResult};
use crate::llm::{CompletionOptions, CompletionProvider, LlmAdapter};
use crate::repair::{AutoRepair, RepairConfig};
use crate::settings::Settings;
use crate::store::{ContentStore, FsContentStore};
use crate::types::{ChatOutcome, RepairReport};

/// Reply to `run_command`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandReply {
    pub output: String,
    /// Whether the command was detached as a background process
    pub background: bool,
    /// Whether the command failed, timed out or could not start
    pub failed: bool,
    pub url: Option<String>,
    pub pid: Option<u32>,
}

/// Reply to `kill_process`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KillReply {
    pub success: bool,
    pub error: Option<String>,
}

/// Reply to `stop_preview`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusReply {
    pub success: bool,
    pub message: String,
}

/// One entry of `list_processes`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessSummary {
    pub pid: u32,
    pub name: String,
}

/// Stands in when no API key is configured.
struct Unconfigured;

#[async_trait]
impl CompletionProvider for Unconfigured {
    async fn complete(&self, _prompt: &str, _options: &CompletionOptions) -> ChatResult<String> {
        Err(ChatError::LlmNotConfigured)
    }
}

/// Everything needed to serve one workspace.
pub struct Workspace {
    root: PathBuf,
    settings: Settings,
    store: Arc<dyn ContentStore>,
    provider: Arc<dyn CompletionProvider>,
    runner: CommandRunner,
    previews: PreviewManager,
}

impl Workspace {
    /// Open a workspace on disk, loading settings and the LLM adapter.
    pub fn open(root: impl AsRef<Path>) -> ChatResult<Self> {
        let root = root.as_ref().to_path_buf();
        let settings = Settings::load(&root)?;

        let provider: Arc<dyn CompletionProvider> = match LlmAdapter::from_settings(&settings) {
            Ok(adapter) => {
                info!("Using {:?} model {}", adapter.provider(), adapter.model());
                Arc::new(adapter)
            }
            Err(e) => {
                warn!("{}", e);
                Arc::new(Unconfigured)
            }
        };

        let store = Arc::new(FsContentStore::new(&root));
        Ok(Self::new(root, settings, store, provider))
    }

    /// Assemble a workspace from explicit parts.
    pub fn new(
        root: PathBuf,
        settings: Settings,
        store: Arc<dyn ContentStore>,
        provider: Arc<dyn CompletionProvider>,
    ) -> Self {
        let runner = CommandRunner::new(ProcessRegistry::new(), settings.runner.clone());
        Self {
            root,
            settings,
            store,
            provider,
            runner,
            previews: PreviewManager::new(),
        }
    }

    pub fn with_runner(mut self, runner: CommandRunner) -> Self {
        self.runner = runner;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn store(&self) -> &Arc<dyn ContentStore> {
        &self.store
    }

    pub fn runner(&self) -> &CommandRunner {
        &self.runner
    }

    fn project_dir(&self, project: &str) -> ChatResult<PathBuf> {
        self.store
            .project_root(project)
            .ok_or_else(|| ChatError::NotFound(format!("project {}", project)))
    }

    /// Run a command in a project's directory.
    ///
    /// Failures of the command itself are reported in the reply.
    pub async fn run_command(&self, project: &str, command: &str) -> ChatResult<CommandReply> {
        let dir = self.project_dir(project)?;

        let reply = match self.runner.execute(command, &dir, project).await {
            Ok(CommandOutcome::Completed(result)) => CommandReply {
                output: result.output().to_string(),
                background: false,
                failed: result.exit_failed,
                url: None,
                pid: None,
            },
            Ok(CommandOutcome::Background(launch)) => CommandReply {
                output: launch.message(),
                background: true,
                failed: !launch.running,
                url: launch.urls.first().cloned(),
                pid: Some(launch.pid),
            },
            Err(e) => CommandReply {
                output: e.with_output(),
                background: false,
                failed: true,
                url: None,
                pid: None,
            },
        };

        Ok(reply)
    }

    /// Run the auto-repair loop for a project.
    pub async fn start_auto_repair(
        &self,
        project: &str,
        explicit_command: Option<&str>,
    ) -> RepairReport {
        let config = RepairConfig::from_settings(&self.settings);
        AutoRepair::new(
            self.store.clone(),
            self.provider.clone(),
            Arc::new(self.runner.clone()),
        )
        .with_config(config)
        .run(project, explicit_command)
        .await
    }

    pub async fn kill_process(&self, pid: u32) -> KillReply {
        match self.runner.registry().kill(pid).await {
            Ok(_) => KillReply {
                success: true,
                error: None,
            },
            Err(e) => KillReply {
                success: false,
                error: Some(e.to_string()),
            },
        }
    }

    pub fn list_processes(&self) -> Vec<ProcessSummary> {
        self.runner
            .registry()
            .list_all()
            .into_iter()
            .map(|p| ProcessSummary {
                pid: p.pid,
                name: p.command,
            })
            .collect()
    }

    /// Serve a project's directory; reuses a running server.
    pub async fn host_preview(&self, project: &str, port: u16) -> ChatResult<PreviewInfo> {
        let root = self.store.project_root(project);
        Ok(self.previews.host(project, root.as_deref(), port).await?)
    }

    pub async fn stop_preview(&self, project: &str) -> StatusReply {
        match self.previews.stop(project).await {
            Ok(info) => StatusReply {
                success: true,
                message: format!("Stopped preview server on port {}", info.port),
            },
            Err(e) => StatusReply {
                success: false,
                message: e.to_string(),
            },
        }
    }

    /// Dispatch a chat instruction for a project.
    pub async fn chat(
        &self,
        project: &str,
        instruction: &str,
        image: Option<&str>,
    ) -> ChatResult<ChatOutcome> {
        ChatDispatcher::new(self.store.clone(), self.provider.clone())
            .with_history_limit(self.settings.history_limit)
            .dispatch(Some(project), instruction, image)
            .await
    }

    /// Kill every tracked process and stop every preview.
    pub async fn shutdown(&self) {
        for process in self.runner.registry().list_all() {
            if let Err(e) = self.runner.registry().kill(process.pid).await {
                warn!("Failed to stop process {}: {}", process.pid, e);
            }
        }
        for preview in self.previews.list() {
            let _ = self.previews.stop(&preview.project).await;
        }
    }
}
