//! CLI command definitions.
//!
//! Each subcommand maps to one operation of the workspace surface.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use mend_chat::{AttemptOutcome, ChatOutcome, ContentStore, RepairReport, RepairStatus, Workspace};
use thiserror::Error;

pub mod chat;
pub mod preview;
pub mod repair;
pub mod run;
pub mod shell;

/// mend - AI assistant that runs and repairs projects
#[derive(Parser)]
#[command(name = "mend")]
#[command(version, about = "mend - run, chat with and auto-repair code projects")]
#[command(long_about = r#"
mend keeps a workspace of projects under <workspace>/projects/ and can run
them, serve them, edit them through chat, and repair them automatically.

COMMANDS:
  run      → Run a command in a project (servers keep running until Ctrl-C)
  repair   → Run the project and let the assistant fix it until it works
  chat     → Send one instruction to the assistant
  preview  → Serve a project's files over HTTP
  shell    → Interactive session keeping processes alive between commands

EXIT CODES:
  0 - Success
  1 - General error
  2 - Invalid arguments, not found, or nothing to run
  3 - Repair exhausted
  4 - Completion provider failure
"#)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Workspace root
    #[arg(short, long, global = true, env = "MEND_WORKSPACE", default_value = ".")]
    pub workspace: PathBuf,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a command in a project's directory
    Run(run::RunArgs),

    /// Run a project and repair it until it succeeds
    Repair(repair::RepairArgs),

    /// Send an instruction to the assistant
    Chat(chat::ChatArgs),

    /// Serve a project's files
    Preview(preview::PreviewArgs),

    /// Start an interactive session
    Shell(shell::ShellArgs),
}

/// The repair loop ended without success.
#[derive(Debug, Error)]
#[error("auto-repair did not succeed: {message}")]
pub struct RepairFailed {
    pub status: RepairStatus,
    /// The completion provider failure ended the loop
    pub provider_failure: bool,
    pub message: String,
}

impl From<&RepairReport> for RepairFailed {
    fn from(report: &RepairReport) -> Self {
        Self {
            status: report.status,
            provider_failure: report.provider_failure,
            message: report.message.clone(),
        }
    }
}

pub fn open_workspace(path: &Path) -> Result<Workspace> {
    Workspace::open(path)
        .with_context(|| format!("Failed to open workspace at {}", path.display()))
}

/// Print a repair report, attempt by attempt.
pub fn print_report(report: &RepairReport) {
    if let Some(command) = &report.command {
        println!("Command: {}", command);
    }

    for attempt in &report.attempts {
        let label = match attempt.outcome {
            AttemptOutcome::Success => "✅ success",
            AttemptOutcome::ErrorDetected => "❌ error detected",
            AttemptOutcome::FixApplied => "🔧 fix applied",
            AttemptOutcome::NoFixFound => "⚠️  no fix found",
        };
        println!("  [{}] {}", attempt.index, label);

        if !attempt.explanation.is_empty() {
            println!("      {}", attempt.explanation);
        }
        for file in &attempt.applied_files {
            println!("      - {}", file);
        }
        if attempt.outcome == AttemptOutcome::ErrorDetected {
            for line in attempt.command_output.lines().take(5) {
                println!("      | {}", line);
            }
        }
    }

    println!();
    println!("{}", report.message);
}

/// Turn a repair report into the command's result.
pub fn finish_report(report: &RepairReport) -> Result<()> {
    if report.success() {
        Ok(())
    } else {
        Err(RepairFailed::from(report).into())
    }
}

/// Print a chat outcome; returns true when the caller should start a repair.
pub async fn print_outcome(
    workspace: &Workspace,
    project: &str,
    outcome: &ChatOutcome,
) -> Result<bool> {
    match outcome {
        ChatOutcome::ReadFile { path } => {
            match workspace.store().read_file(project, path).await {
                Ok(content) => {
                    println!("── {} ──", path);
                    println!("{}", content);
                }
                Err(e) if e.is_not_found() => println!("File {} was not found.", path),
                Err(e) => return Err(e.into()),
            }
        }
        ChatOutcome::DeleteFile { path } => println!("🗑️  Deleted {}", path),
        ChatOutcome::StartAutoRepair => return Ok(true),
        ChatOutcome::WriteFile { path, .. } => println!("📝 Wrote {}", path),
        ChatOutcome::WriteMultipleFiles { files } => {
            println!("📝 Wrote {} files:", files.len());
            for file in files {
                println!("   - {}", file.path);
            }
        }
        ChatOutcome::PlainResponse { text } => println!("{}", text),
    }
    Ok(false)
}
