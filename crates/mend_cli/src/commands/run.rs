//! Run command - Run a shell command in a project.

use std::path::Path;

use anyhow::Result;
use clap::Args;
use tracing::info;

use super::open_workspace;

#[derive(Args)]
pub struct RunArgs {
    /// Command to run
    command: String,

    /// Project to run it in
    #[arg(short, long)]
    project: String,
}

pub async fn execute(workspace: &Path, args: RunArgs) -> Result<()> {
    let ws = open_workspace(workspace)?;
    info!("Running '{}' in {}", args.command, args.project);

    let reply = ws.run_command(&args.project, &args.command).await?;
    println!("{}", reply.output);

    if reply.background && !reply.failed {
        println!();
        println!("Press Ctrl-C to stop.");
        tokio::signal::ctrl_c().await?;
        ws.shutdown().await;
        return Ok(());
    }

    if reply.failed {
        anyhow::bail!("Command failed: {}", args.command);
    }
    Ok(())
}
