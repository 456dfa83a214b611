//! Shell command runner.
//!
//! Commands are classified as either synchronous (run to completion under a
//! wall-clock timeout, output captured) or long-running (detached, startup
//! output collected for a settle window, process handed to the
//! [`ProcessRegistry`]).

use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use regex::Regex;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::RunnerConfig;
use crate::error::{RunnerError, RunnerResult};
use crate::registry::ProcessRegistry;
use crate::runner::{BackgroundLaunch, CommandExecutor, CommandOutcome, RunResult};
use crate::shim::PlatformShim;

/// Static file servers and the port they bind when none is given.
const STATIC_SERVERS: &[(&str, u16)] = &[
    ("http.server", 8000),
    ("simplehttpserver", 8000),
    ("http-server", 8080),
    ("live-server", 8080),
    ("npx serve", 3000),
];

/// Application entry points that mark a `run` command as a server.
const ENTRY_POINTS: &[&str] = &[
    "app.py",
    "server.py",
    "main.py",
    "manage.py",
    "server.js",
    "app.js",
    "index.js",
    "main.go",
];

/// Startup lines that signal a server is accepting connections.
const READY_MARKERS: &[&str] = &["listening", "serving", "running on", "started", "ready"];

/// How long stream readers may keep draining after the process exits.
const DRAIN_GRACE: Duration = Duration::from_secs(2);

/// How a command will be executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    /// Run to completion under a timeout
    Synchronous,
    /// Detach and track in the registry
    LongRunning,
}

/// Classify a command by its text.
pub fn classify(command: &str) -> CommandKind {
    let lower = command.to_lowercase();

    if STATIC_SERVERS.iter().any(|(marker, _)| lower.contains(marker)) {
        return CommandKind::LongRunning;
    }

    let has_run = lower
        .split(|c: char| c.is_whitespace() || c == ':')
        .any(|token| token == "run" || token == "runserver");
    if has_run && ENTRY_POINTS.iter().any(|entry| lower.contains(entry)) {
        return CommandKind::LongRunning;
    }

    CommandKind::Synchronous
}

/// Find the port a server is (or will be) listening on.
///
/// The startup banner wins over the command line; a known static server
/// without an explicit port falls back to its default.
pub fn detect_port(banner: &str, command: &str) -> Option<u16> {
    let banner_patterns = [
        r"(?i)(?:localhost|127\.0\.0\.1|0\.0\.0\.0|\[::\]):(\d{2,5})",
        r"(?i)\bport\s*:?\s*(\d{2,5})",
    ];
    let command_patterns = [
        r"(?:--port[=\s]+|-p\s+)(\d{2,5})",
        r"http\.server\s+(\d{2,5})",
        r"\s(\d{4,5})\s*$",
    ];

    let first_match = |patterns: &[&str], text: &str| {
        patterns.iter().find_map(|pattern| {
            let re = Regex::new(pattern).ok()?;
            re.captures(text)?.get(1)?.as_str().parse::<u16>().ok()
        })
    };

    first_match(&banner_patterns[..], banner)
        .or_else(|| first_match(&command_patterns[..], command))
        .or_else(|| {
            let lower = command.to_lowercase();
            STATIC_SERVERS
                .iter()
                .find(|(marker, _)| lower.contains(marker))
                .map(|(_, port)| *port)
        })
}

fn is_ready_line(line: &str) -> bool {
    let lower = line.to_lowercase();
    READY_MARKERS.iter().any(|marker| lower.contains(marker))
}

/// Build a shell invocation for the current platform.
fn shell_command(command: &str, working_dir: &Path) -> Command {
    let (shell, shell_arg) = if cfg!(windows) {
        ("cmd", "/C")
    } else {
        ("sh", "-c")
    };

    let mut cmd = Command::new(shell);
    cmd.arg(shell_arg)
        .arg(command)
        .current_dir(working_dir)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    // On Windows, use CREATE_NO_WINDOW to prevent terminal window from showing
    #[cfg(windows)]
    {
        const CREATE_NO_WINDOW: u32 = 0x08000000;
        cmd.creation_flags(CREATE_NO_WINDOW);
    }

    cmd
}

/// Bytes captured from one output stream.
#[derive(Debug, Default)]
struct Captured {
    bytes: Vec<u8>,
    truncated: bool,
}

/// Capture buffer shared between a reader task and the runner, so bytes
/// already read survive when the task is abandoned.
type SharedCapture = Arc<Mutex<Captured>>;

fn snapshot(capture: &SharedCapture) -> (String, bool) {
    let captured = capture.lock();
    (
        String::from_utf8_lossy(&captured.bytes).into_owned(),
        captured.truncated,
    )
}

/// Read a stream to the end into `capture`, keeping at most `cap` bytes.
///
/// Bytes past the cap are drained and discarded so the child never blocks
/// on a full pipe.
async fn read_capped<R: AsyncRead + Unpin>(mut reader: R, cap: usize, capture: SharedCapture) {
    let mut chunk = [0u8; 8192];

    loop {
        match reader.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                let mut captured = capture.lock();
                let room = cap.saturating_sub(captured.bytes.len());
                captured.bytes.extend_from_slice(&chunk[..n.min(room)]);
                if n > room {
                    captured.truncated = true;
                }
            }
        }
    }
}

/// Spawn a capped reader for an optional stream.
fn spawn_reader<R>(stream: Option<R>, cap: usize) -> (SharedCapture, JoinHandle<()>)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let capture = SharedCapture::default();
    let sink = Arc::clone(&capture);
    let task = tokio::spawn(async move {
        if let Some(stream) = stream {
            read_capped(stream, cap, sink).await;
        }
    });
    (capture, task)
}

/// Forward lines to the settle-window collector, then keep draining.
async fn forward_lines<R: AsyncRead + Unpin>(reader: R, tx: mpsc::UnboundedSender<String>) {
    let mut lines = BufReader::new(reader).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        let _ = tx.send(line);
    }
}

/// Executes shell commands and tracks the long-running ones.
#[derive(Debug, Clone)]
pub struct CommandRunner {
    registry: ProcessRegistry,
    shim: PlatformShim,
    config: RunnerConfig,
}

impl CommandRunner {
    /// Create a runner that registers background processes in `registry`.
    pub fn new(registry: ProcessRegistry, config: RunnerConfig) -> Self {
        let shim = PlatformShim::from_override(config.python_interpreter.as_deref());
        Self {
            registry,
            shim,
            config,
        }
    }

    /// Replace the platform shim.
    pub fn with_shim(mut self, shim: PlatformShim) -> Self {
        self.shim = shim;
        self
    }

    pub fn registry(&self) -> &ProcessRegistry {
        &self.registry
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    pub fn shim(&self) -> &PlatformShim {
        &self.shim
    }

    /// Classify and execute a command on behalf of `key`.
    pub async fn execute(
        &self,
        command: &str,
        working_dir: &Path,
        key: &str,
    ) -> RunnerResult<CommandOutcome> {
        match classify(command) {
            CommandKind::LongRunning => self
                .spawn_background(command, working_dir, key)
                .await
                .map(CommandOutcome::Background),
            CommandKind::Synchronous => self
                .run(command, working_dir, self.config.default_timeout())
                .await
                .map(CommandOutcome::Completed),
        }
    }

    /// Detach a long-running command and register it under `key`.
    pub async fn spawn_background(
        &self,
        command: &str,
        working_dir: &Path,
        key: &str,
    ) -> RunnerResult<BackgroundLaunch> {
        let command_line = self.shim.apply(command);
        info!("Starting background command for '{}': {}", key, command_line);

        let mut child = shell_command(&command_line, working_dir)
            .spawn()
            .map_err(|e| RunnerError::spawn(&command_line, e))?;

        let (line_tx, mut line_rx) = mpsc::unbounded_channel();
        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(forward_lines(stdout, line_tx.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(forward_lines(stderr, line_tx.clone()));
        }
        drop(line_tx);

        let info = self.registry.register(key, &command_line, child)?;

        let deadline = tokio::time::Instant::now() + self.config.settle();
        let mut banner = String::new();
        let mut ready = false;
        let mut running = true;
        loop {
            match tokio::time::timeout_at(deadline, line_rx.recv()).await {
                Ok(Some(line)) => {
                    if banner.len() < self.config.output_cap_bytes {
                        banner.push_str(&line);
                        banner.push('\n');
                    }
                    if is_ready_line(&line) {
                        ready = true;
                        break;
                    }
                }
                Ok(None) => {
                    running = false;
                    break;
                }
                Err(_) => break,
            }
        }

        if !ready && running {
            debug!(
                "No ready signal from PID {} within {}ms; slow servers may not have printed yet",
                info.pid, self.config.settle_window_ms
            );
        }

        let port = detect_port(&banner, &command_line);
        let urls = port
            .map(|p| {
                vec![
                    format!("http://localhost:{}", p),
                    format!("http://127.0.0.1:{}", p),
                ]
            })
            .unwrap_or_default();

        Ok(BackgroundLaunch {
            key: info.key,
            pid: info.pid,
            command: info.command,
            port,
            urls,
            banner,
            ready,
            running,
        })
    }
}

#[async_trait]
impl CommandExecutor for CommandRunner {
    async fn run(
        &self,
        command: &str,
        working_dir: &Path,
        timeout: Duration,
    ) -> RunnerResult<RunResult> {
        let command_line = self.shim.apply(command);
        debug!("Executing in {}: {}", working_dir.display(), command_line);

        let mut child = shell_command(&command_line, working_dir)
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| RunnerError::spawn(&command_line, e))?;

        let cap = self.config.output_cap_bytes;
        let (stdout, mut stdout_task) = spawn_reader(child.stdout.take(), cap);
        let (stderr, mut stderr_task) = spawn_reader(child.stderr.take(), cap);

        let started_at = Utc::now();
        let start = Instant::now();

        let status = match tokio::time::timeout(timeout, child.wait()).await {
            Ok(Ok(status)) => status,
            Ok(Err(e)) => {
                return Err(RunnerError::spawn(&command_line, e));
            }
            Err(_) => {
                warn!(
                    "Command exceeded {:?}, terminating: {}",
                    timeout, command_line
                );
                let _ = child.kill().await;
                stdout_task.abort();
                stderr_task.abort();
                let partial = RunResult {
                    stdout: snapshot(&stdout).0,
                    stderr: snapshot(&stderr).0,
                    ..RunResult::success("")
                };
                return Err(RunnerError::timeout(timeout, partial.combined_output()));
            }
        };

        // A grandchild may still hold the pipes open; stop waiting after the
        // grace period and keep what was read so far.
        let drain_deadline = tokio::time::Instant::now() + DRAIN_GRACE;
        for task in [&mut stdout_task, &mut stderr_task] {
            if tokio::time::timeout_at(drain_deadline, &mut *task).await.is_err() {
                debug!("Output stream still open after exit: {}", command_line);
                task.abort();
            }
        }
        let (stdout, stdout_truncated) = snapshot(&stdout);
        let (stderr, stderr_truncated) = snapshot(&stderr);

        let duration_ms = start.elapsed().as_millis() as u64;
        let exit_failed = !status.success();

        if exit_failed {
            error!(
                "Command failed with {} after {}ms: {}",
                status, duration_ms, command_line
            );
        } else {
            info!("Command completed in {}ms: {}", duration_ms, command_line);
        }

        Ok(RunResult {
            stdout,
            stderr,
            exit_failed,
            exit_code: status.code(),
            truncated: stdout_truncated || stderr_truncated,
            started_at,
            duration_ms,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_static_servers() {
        assert_eq!(classify("python -m http.server 8000"), CommandKind::LongRunning);
        assert_eq!(classify("npx http-server ."), CommandKind::LongRunning);
        assert_eq!(classify("npx serve dist"), CommandKind::LongRunning);
    }

    #[test]
    fn test_classify_run_with_entry_point() {
        assert_eq!(classify("flask --app app.py run"), CommandKind::LongRunning);
        assert_eq!(classify("go run main.go"), CommandKind::LongRunning);
        assert_eq!(classify("python manage.py runserver"), CommandKind::LongRunning);
    }

    #[test]
    fn test_classify_synchronous() {
        assert_eq!(classify("python app.py"), CommandKind::Synchronous);
        assert_eq!(classify("npm run build"), CommandKind::Synchronous);
        assert_eq!(classify("ls -la"), CommandKind::Synchronous);
        assert_eq!(classify("python runner.py"), CommandKind::Synchronous);
    }

    #[test]
    fn test_detect_port_from_banner() {
        let banner = "Serving HTTP on 0.0.0.0 port 8123 (http://0.0.0.0:8123/) ...";
        assert_eq!(detect_port(banner, "python3 -m http.server"), Some(8123));
        assert_eq!(
            detect_port(" * Running on http://127.0.0.1:5000", "flask run"),
            Some(5000)
        );
    }

    #[test]
    fn test_detect_port_from_command() {
        assert_eq!(detect_port("", "npm start -- --port 4200"), Some(4200));
        assert_eq!(detect_port("", "python3 -m http.server 9001"), Some(9001));
        assert_eq!(detect_port("", "python3 -m http.server"), Some(8000));
        assert_eq!(detect_port("", "node server.js"), None);
    }

    #[test]
    fn test_ready_markers() {
        assert!(is_ready_line("Server listening on port 3000"));
        assert!(is_ready_line(" * Running on http://127.0.0.1:5000"));
        assert!(!is_ready_line("Compiling..."));
    }

    #[tokio::test]
    async fn test_read_capped_truncates() {
        let data = vec![b'x'; 100];
        let capture = SharedCapture::default();
        read_capped(&data[..], 10, Arc::clone(&capture)).await;
        let (text, truncated) = snapshot(&capture);
        assert_eq!(text.len(), 10);
        assert!(truncated);

        let capture = SharedCapture::default();
        read_capped(&data[..], 1000, Arc::clone(&capture)).await;
        let (text, truncated) = snapshot(&capture);
        assert_eq!(text.len(), 100);
        assert!(!truncated);
    }
}
