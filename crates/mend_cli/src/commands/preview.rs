//! Preview command - Serve a project's files until Ctrl-C.

use std::path::Path;

use anyhow::Result;
use clap::Args;

use super::open_workspace;

#[derive(Args)]
pub struct PreviewArgs {
    /// Project to serve
    #[arg(short, long)]
    project: String,

    /// Port to listen on (0 picks a free port)
    #[arg(long, default_value_t = 0)]
    port: u16,
}

pub async fn execute(workspace: &Path, args: PreviewArgs) -> Result<()> {
    let ws = open_workspace(workspace)?;

    let preview = ws.host_preview(&args.project, args.port).await?;
    println!("🌐 Serving {} at {}", preview.root.display(), preview.url);
    println!("Press Ctrl-C to stop.");

    tokio::signal::ctrl_c().await?;
    let reply = ws.stop_preview(&args.project).await;
    println!("{}", reply.message);
    Ok(())
}
