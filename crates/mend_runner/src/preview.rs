//! Static preview servers, at most one per project.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::Router;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tower_http::services::ServeDir;
use tracing::{info, warn};

use crate::error::{RunnerError, RunnerResult};

/// A running preview server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreviewInfo {
    pub project: String,
    pub port: u16,
    pub url: String,
    /// Directory being served
    pub root: PathBuf,
    pub started_at: DateTime<Utc>,
}

struct PreviewServer {
    info: PreviewInfo,
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

/// Owns the preview servers for all projects.
#[derive(Clone, Default)]
pub struct PreviewManager {
    servers: Arc<Mutex<HashMap<String, PreviewServer>>>,
}

impl PreviewManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `root` for `project` on `127.0.0.1:port` (port 0 picks one).
    ///
    /// If the project already has a server, its details are returned
    /// unchanged. Without an on-disk root the preview is unavailable.
    pub async fn host(
        &self,
        project: &str,
        root: Option<&Path>,
        port: u16,
    ) -> RunnerResult<PreviewInfo> {
        if let Some(existing) = self.get(project) {
            return Ok(existing);
        }

        let root = root.ok_or_else(|| {
            RunnerError::PreviewUnavailable(format!(
                "project '{}' has no on-disk directory",
                project
            ))
        })?;
        if !root.is_dir() {
            return Err(RunnerError::PreviewUnavailable(format!(
                "{} is not a directory",
                root.display()
            )));
        }

        let listener = TcpListener::bind(("127.0.0.1", port)).await?;
        let port = listener.local_addr()?.port();

        let app = Router::new()
            .fallback_service(ServeDir::new(root).append_index_html_on_directories(true));
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let task_project = project.to_string();
        let task = tokio::spawn(async move {
            let shutdown = async {
                let _ = shutdown_rx.await;
            };
            if let Err(e) = axum::serve(listener, app)
                .with_graceful_shutdown(shutdown)
                .await
            {
                warn!("Preview server for '{}' stopped with error: {}", task_project, e);
            }
        });

        let info = PreviewInfo {
            project: project.to_string(),
            port,
            url: format!("http://localhost:{}", port),
            root: root.to_path_buf(),
            started_at: Utc::now(),
        };

        let mut servers = self.servers.lock();
        if let Some(existing) = servers.get(project) {
            // Lost a race with a concurrent host for the same project.
            let _ = shutdown_tx.send(());
            return Ok(existing.info.clone());
        }
        servers.insert(
            project.to_string(),
            PreviewServer {
                info: info.clone(),
                shutdown: shutdown_tx,
                task,
            },
        );

        info!(
            "Preview for '{}' serving {} at {}",
            project,
            info.root.display(),
            info.url
        );
        Ok(info)
    }

    /// Shut down the project's preview server.
    pub async fn stop(&self, project: &str) -> RunnerResult<PreviewInfo> {
        let server = self
            .servers
            .lock()
            .remove(project)
            .ok_or_else(|| RunnerError::PreviewNotFound(project.to_string()))?;

        let _ = server.shutdown.send(());
        if let Err(e) = server.task.await {
            warn!("Preview task for '{}' did not join cleanly: {}", project, e);
        }
        info!("Stopped preview for '{}'", project);
        Ok(server.info)
    }

    pub fn get(&self, project: &str) -> Option<PreviewInfo> {
        self.servers.lock().get(project).map(|s| s.info.clone())
    }

    pub fn list(&self) -> Vec<PreviewInfo> {
        let mut all: Vec<PreviewInfo> = self
            .servers
            .lock()
            .values()
            .map(|s| s.info.clone())
            .collect();
        all.sort_by(|a, b| a.project.cmp(&b.project));
        all
    }
}
