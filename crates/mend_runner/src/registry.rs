//! Registry of detached background processes.
//!
//! Each registered child is owned by a watcher task. The task reaps the
//! process when it exits and is the only place a kill is carried out;
//! the registry talks to it over a channel. One record is kept per key.
//! Registering a second process under a key that is still live terminates
//! the previous process instead of leaking it.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::process::Child;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::error::{RunnerError, RunnerResult};

/// Key used when a process has no owning project.
pub const DEFAULT_KEY: &str = "default";

/// Snapshot of a tracked process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessInfo {
    /// Logical owner, usually a project id
    pub key: String,
    pub pid: u32,
    /// Command line the process was started with
    pub command: String,
    pub started_at: DateTime<Utc>,
}

type KillReply = oneshot::Sender<std::io::Result<()>>;

struct ProcessRecord {
    info: ProcessInfo,
    kill_tx: mpsc::Sender<KillReply>,
}

/// Shared, cloneable handle to the process table.
#[derive(Clone, Default)]
pub struct ProcessRegistry {
    records: Arc<Mutex<HashMap<String, ProcessRecord>>>,
}

impl ProcessRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Take ownership of a spawned child and track it under `key`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn register(
        &self,
        key: impl Into<String>,
        command: impl Into<String>,
        mut child: Child,
    ) -> RunnerResult<ProcessInfo> {
        let key = key.into();
        let command = command.into();
        let pid = child
            .id()
            .ok_or_else(|| RunnerError::spawn(&command, "process exited before registration"))?;

        let info = ProcessInfo {
            key: key.clone(),
            pid,
            command,
            started_at: Utc::now(),
        };
        let (kill_tx, mut kill_rx) = mpsc::channel::<KillReply>(1);

        let previous = self.records.lock().insert(
            key.clone(),
            ProcessRecord {
                info: info.clone(),
                kill_tx,
            },
        );
        if let Some(previous) = previous {
            warn!(
                "Replacing process {} under key '{}'; terminating the previous one",
                previous.info.pid, key
            );
            // Dropping the sender makes the old watcher kill its child.
            drop(previous);
        }
        info!("Registered process {} under key '{}'", pid, key);

        let registry = self.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    status = child.wait() => {
                        match status {
                            Ok(status) => info!("Process {} exited: {}", pid, status),
                            Err(e) => warn!("Failed to wait for process {}: {}", pid, e),
                        }
                        registry.forget(&key, pid);
                        break;
                    }
                    request = kill_rx.recv() => match request {
                        Some(reply) => {
                            let result = child.kill().await;
                            let killed = result.is_ok();
                            let _ = reply.send(result);
                            if killed {
                                break;
                            }
                        }
                        None => {
                            debug!("Record for process {} dropped, terminating", pid);
                            let _ = child.kill().await;
                            break;
                        }
                    },
                }
            }
        });

        Ok(info)
    }

    /// Find a tracked process by PID.
    pub fn find(&self, pid: u32) -> Option<ProcessInfo> {
        self.records
            .lock()
            .values()
            .find(|r| r.info.pid == pid)
            .map(|r| r.info.clone())
    }

    /// Find the process tracked under a key.
    pub fn get(&self, key: &str) -> Option<ProcessInfo> {
        self.records.lock().get(key).map(|r| r.info.clone())
    }

    /// All tracked processes, oldest first.
    pub fn list_all(&self) -> Vec<ProcessInfo> {
        let mut all: Vec<ProcessInfo> = self
            .records
            .lock()
            .values()
            .map(|r| r.info.clone())
            .collect();
        all.sort_by(|a, b| a.started_at.cmp(&b.started_at).then(a.pid.cmp(&b.pid)));
        all
    }

    /// Stop tracking the process under `key`.
    ///
    /// The registry is the only owner of the child, so an untracked process
    /// still running is terminated by its watcher.
    pub fn remove(&self, key: &str) -> Option<ProcessInfo> {
        let removed = self.records.lock().remove(key);
        if let Some(record) = &removed {
            debug!("Removed process {} under key '{}'", record.info.pid, key);
        }
        removed.map(|r| r.info)
    }

    /// Terminate a tracked process.
    ///
    /// A PID that is not tracked yields `ProcessNotFound` and leaves the
    /// registry untouched. A failed signal also leaves the record in place.
    pub async fn kill(&self, pid: u32) -> RunnerResult<ProcessInfo> {
        let (info, kill_tx) = {
            let records = self.records.lock();
            let record = records
                .values()
                .find(|r| r.info.pid == pid)
                .ok_or(RunnerError::ProcessNotFound(pid))?;
            (record.info.clone(), record.kill_tx.clone())
        };

        let (reply_tx, reply_rx) = oneshot::channel();
        if kill_tx.send(reply_tx).await.is_err() {
            return Err(RunnerError::ProcessNotFound(pid));
        }

        match reply_rx.await {
            Ok(Ok(())) => {
                self.forget(&info.key, pid);
                info!("Killed process {} (key '{}')", pid, info.key);
                Ok(info)
            }
            Ok(Err(e)) => Err(RunnerError::KillFailed {
                pid,
                message: e.to_string(),
            }),
            // Watcher finished first: the process exited on its own.
            Err(_) => Err(RunnerError::ProcessNotFound(pid)),
        }
    }

    /// Number of tracked processes.
    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }

    /// Drop the record for `key` only if it still refers to `pid`.
    fn forget(&self, key: &str, pid: u32) {
        let mut records = self.records.lock();
        if records.get(key).map(|r| r.info.pid) == Some(pid) {
            records.remove(key);
        }
    }
}

impl std::fmt::Debug for ProcessRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessRegistry")
            .field("processes", &self.list_all())
            .finish()
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::process::Stdio;
    use std::time::Duration;
    use tokio::process::Command;

    fn spawn_sleep() -> Child {
        Command::new("sleep")
            .arg("30")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .unwrap()
    }

    #[tokio::test]
    async fn test_register_and_find() {
        let registry = ProcessRegistry::new();
        let info = registry.register("demo", "sleep 30", spawn_sleep()).unwrap();

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.find(info.pid), Some(info.clone()));
        assert_eq!(registry.get("demo").map(|i| i.pid), Some(info.pid));

        registry.kill(info.pid).await.unwrap();
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_kill_unknown_pid_leaves_registry_unchanged() {
        let registry = ProcessRegistry::new();
        let info = registry.register("demo", "sleep 30", spawn_sleep()).unwrap();
        let before = registry.list_all();

        let result = registry.kill(info.pid.wrapping_add(100_000)).await;
        assert!(matches!(result, Err(RunnerError::ProcessNotFound(_))));
        assert_eq!(registry.list_all(), before);

        registry.kill(info.pid).await.unwrap();
    }

    #[tokio::test]
    async fn test_second_registration_replaces_first() {
        let registry = ProcessRegistry::new();
        let first = registry.register("demo", "sleep 30", spawn_sleep()).unwrap();
        let second = registry.register("demo", "sleep 30", spawn_sleep()).unwrap();

        assert_eq!(registry.len(), 1);
        assert!(registry.find(first.pid).is_none());
        assert_eq!(registry.get("demo").map(|i| i.pid), Some(second.pid));

        registry.kill(second.pid).await.unwrap();
    }

    #[tokio::test]
    async fn test_natural_exit_removes_record() {
        let registry = ProcessRegistry::new();
        let child = Command::new("true").spawn().unwrap();
        let _ = registry.register("short", "true", child);

        for _ in 0..50 {
            if registry.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(registry.is_empty());
    }
}
