//! Repair command - Run a project and fix it until it works.

use std::path::Path;

use anyhow::Result;
use clap::Args;
use tracing::info;

use super::{finish_report, open_workspace, print_report};

#[derive(Args)]
pub struct RepairArgs {
    /// Project to repair
    #[arg(short, long)]
    project: String,

    /// Command to run instead of the detected one
    #[arg(short, long)]
    command: Option<String>,

    /// Print the report as JSON
    #[arg(long)]
    json: bool,
}

pub async fn execute(workspace: &Path, args: RepairArgs) -> Result<()> {
    let ws = open_workspace(workspace)?;
    info!("Starting auto-repair for {}", args.project);

    let report = ws
        .start_auto_repair(&args.project, args.command.as_deref())
        .await;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }

    finish_report(&report)
}
