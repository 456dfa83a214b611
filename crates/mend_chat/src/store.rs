//! Content store: project files and chat transcripts.
//!
//! On disk, a workspace is laid out as:
//! ```text
//! <root>/
//! ├── projects/<project>/            # Project files
//! └── .mend/chat/<project>/
//!     └── history.jsonl              # Append-only chat turns
//! ```

use std::collections::{BTreeMap, HashMap};
use std::io::{BufRead, BufReader, Write};
use std::fs::{self, File, OpenOptions};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::error::{ChatError, ChatResult};
use crate::types::ChatTurn;

/// Directories never listed as project files.
const SKIPPED_DIRS: &[&str] = &[".git", "node_modules", "target", "__pycache__"];

/// Persistence for project files and chat history.
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Relative paths of every file in the project, sorted.
    async fn list_project_files(&self, project: &str) -> ChatResult<Vec<String>>;

    async fn read_file(&self, project: &str, path: &str) -> ChatResult<String>;

    /// Create or replace a file, creating parent directories.
    async fn write_file(&self, project: &str, path: &str, content: &str) -> ChatResult<()>;

    async fn delete_file(&self, project: &str, path: &str) -> ChatResult<()>;

    async fn append_chat_turn(&self, project: &str, user: &str, ai: &str) -> ChatResult<()>;

    /// Chat turns, oldest first.
    async fn load_chat_history(&self, project: &str) -> ChatResult<Vec<ChatTurn>>;

    /// Directory commands for the project run in, if it lives on disk.
    fn project_root(&self, _project: &str) -> Option<PathBuf> {
        None
    }
}

/// Check a project-relative path and return it as a `PathBuf`.
pub fn validate_path(path: &str) -> ChatResult<PathBuf> {
    let trimmed = path.trim();
    if trimmed.is_empty() {
        return Err(ChatError::InvalidPath(path.to_string()));
    }

    let candidate = Path::new(trimmed);
    let safe = candidate
        .components()
        .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
    if !safe {
        return Err(ChatError::InvalidPath(path.to_string()));
    }

    Ok(candidate.to_path_buf())
}

fn validate_project(project: &str) -> ChatResult<()> {
    let valid = !project.is_empty()
        && !project.starts_with('.')
        && !project.contains(&['/', '\\'][..]);
    if valid {
        Ok(())
    } else {
        Err(ChatError::InvalidPath(project.to_string()))
    }
}

/// Filesystem-backed content store.
#[derive(Debug, Clone)]
pub struct FsContentStore {
    root: PathBuf,
}

impl FsContentStore {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// Get the workspace root path
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn project_dir(&self, project: &str) -> PathBuf {
        self.root.join("projects").join(project)
    }

    fn history_path(&self, project: &str) -> PathBuf {
        self.root
            .join(".mend")
            .join("chat")
            .join(project)
            .join("history.jsonl")
    }

    fn file_path(&self, project: &str, path: &str) -> ChatResult<PathBuf> {
        validate_project(project)?;
        Ok(self.project_dir(project).join(validate_path(path)?))
    }

    /// Create an empty project directory.
    pub fn create_project(&self, project: &str) -> ChatResult<PathBuf> {
        validate_project(project)?;
        let dir = self.project_dir(project);
        fs::create_dir_all(&dir)?;
        info!("Created project {} at {}", project, dir.display());
        Ok(dir)
    }

    /// Names of all projects in the workspace, sorted.
    pub fn list_projects(&self) -> ChatResult<Vec<String>> {
        let dir = self.root.join("projects");
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut projects = Vec::new();
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                projects.push(entry.file_name().to_string_lossy().to_string());
            }
        }
        projects.sort();
        Ok(projects)
    }
}

#[async_trait]
impl ContentStore for FsContentStore {
    async fn list_project_files(&self, project: &str) -> ChatResult<Vec<String>> {
        validate_project(project)?;
        let dir = self.project_dir(project);
        if !dir.is_dir() {
            return Err(ChatError::NotFound(format!("project {}", project)));
        }

        let mut files = Vec::new();
        let walker = WalkDir::new(&dir).into_iter().filter_entry(|e| {
            if e.depth() == 0 || !e.file_type().is_dir() {
                return true;
            }
            let name = e.file_name().to_string_lossy();
            !name.starts_with('.') && !SKIPPED_DIRS.contains(&name.as_ref())
        });

        for entry in walker.filter_map(|e| e.ok()) {
            if !entry.file_type().is_file() {
                continue;
            }
            if let Ok(relative) = entry.path().strip_prefix(&dir) {
                files.push(relative.to_string_lossy().replace('\\', "/"));
            }
        }

        files.sort();
        Ok(files)
    }

    async fn read_file(&self, project: &str, path: &str) -> ChatResult<String> {
        let full = self.file_path(project, path)?;
        match tokio::fs::read_to_string(&full).await {
            Ok(content) => Ok(content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(ChatError::NotFound(format!("{}/{}", project, path)))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn write_file(&self, project: &str, path: &str, content: &str) -> ChatResult<()> {
        let full = self.file_path(project, path)?;
        if let Some(parent) = full.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&full, content).await?;
        debug!("Wrote {} ({} bytes)", full.display(), content.len());
        Ok(())
    }

    async fn delete_file(&self, project: &str, path: &str) -> ChatResult<()> {
        let full = self.file_path(project, path)?;
        match tokio::fs::remove_file(&full).await {
            Ok(()) => {
                info!("Deleted {}", full.display());
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(ChatError::NotFound(format!("{}/{}", project, path)))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn append_chat_turn(&self, project: &str, user: &str, ai: &str) -> ChatResult<()> {
        validate_project(project)?;
        let history_path = self.history_path(project);
        if let Some(parent) = history_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(history_path)?;

        let json = serde_json::to_string(&ChatTurn::new(user, ai))?;
        writeln!(file, "{}", json)?;

        Ok(())
    }

    async fn load_chat_history(&self, project: &str) -> ChatResult<Vec<ChatTurn>> {
        validate_project(project)?;
        let history_path = self.history_path(project);

        if !history_path.exists() {
            return Ok(Vec::new());
        }

        let file = File::open(history_path)?;
        let reader = BufReader::new(file);

        let mut turns = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if !line.trim().is_empty() {
                turns.push(serde_json::from_str(&line)?);
            }
        }

        Ok(turns)
    }

    fn project_root(&self, project: &str) -> Option<PathBuf> {
        validate_project(project).ok()?;
        let dir = self.project_dir(project);
        dir.is_dir().then_some(dir)
    }
}

/// In-memory content store.
///
/// With a root set, `project_root` reports `<root>/<project>` so commands
/// have a working directory; files are not mirrored there.
#[derive(Debug, Clone, Default)]
pub struct MemoryContentStore {
    files: Arc<RwLock<HashMap<String, BTreeMap<String, String>>>>,
    history: Arc<RwLock<HashMap<String, Vec<ChatTurn>>>>,
    root: Option<PathBuf>,
}

impl MemoryContentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_root(mut self, root: impl AsRef<Path>) -> Self {
        self.root = Some(root.as_ref().to_path_buf());
        self
    }

    /// Seed a file.
    pub fn with_file(self, project: &str, path: &str, content: &str) -> Self {
        self.files
            .write()
            .entry(project.to_string())
            .or_default()
            .insert(path.to_string(), content.to_string());
        self
    }

    pub fn create_project(&self, project: &str) {
        self.files.write().entry(project.to_string()).or_default();
    }

    /// Current content of a file, bypassing the async API.
    pub fn file(&self, project: &str, path: &str) -> Option<String> {
        self.files.read().get(project)?.get(path).cloned()
    }
}

#[async_trait]
impl ContentStore for MemoryContentStore {
    async fn list_project_files(&self, project: &str) -> ChatResult<Vec<String>> {
        self.files
            .read()
            .get(project)
            .map(|files| files.keys().cloned().collect())
            .ok_or_else(|| ChatError::NotFound(format!("project {}", project)))
    }

    async fn read_file(&self, project: &str, path: &str) -> ChatResult<String> {
        self.file(project, path)
            .ok_or_else(|| ChatError::NotFound(format!("{}/{}", project, path)))
    }

    async fn write_file(&self, project: &str, path: &str, content: &str) -> ChatResult<()> {
        validate_path(path)?;
        self.files
            .write()
            .entry(project.to_string())
            .or_default()
            .insert(path.to_string(), content.to_string());
        Ok(())
    }

    async fn delete_file(&self, project: &str, path: &str) -> ChatResult<()> {
        self.files
            .write()
            .get_mut(project)
            .and_then(|files| files.remove(path))
            .map(|_| ())
            .ok_or_else(|| ChatError::NotFound(format!("{}/{}", project, path)))
    }

    async fn append_chat_turn(&self, project: &str, user: &str, ai: &str) -> ChatResult<()> {
        self.history
            .write()
            .entry(project.to_string())
            .or_default()
            .push(ChatTurn::new(user, ai));
        Ok(())
    }

    async fn load_chat_history(&self, project: &str) -> ChatResult<Vec<ChatTurn>> {
        Ok(self.history.read().get(project).cloned().unwrap_or_default())
    }

    fn project_root(&self, project: &str) -> Option<PathBuf> {
        self.root.as_ref().map(|root| root.join(project))
    }
}
