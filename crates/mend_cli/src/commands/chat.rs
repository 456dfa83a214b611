//! Chat command - Send one instruction to the assistant.

use std::path::Path;

use anyhow::Result;
use clap::Args;

use super::{finish_report, open_workspace, print_outcome, print_report};

#[derive(Args)]
pub struct ChatArgs {
    /// What to ask or tell the assistant
    instruction: String,

    /// Project the instruction is about
    #[arg(short, long)]
    project: String,

    /// Image to attach, as a data URL
    #[arg(long)]
    image_url: Option<String>,
}

pub async fn execute(workspace: &Path, args: ChatArgs) -> Result<()> {
    let ws = open_workspace(workspace)?;

    let outcome = ws
        .chat(&args.project, &args.instruction, args.image_url.as_deref())
        .await?;

    if print_outcome(&ws, &args.project, &outcome).await? {
        println!("🔁 Starting auto-repair...");
        let report = ws.start_auto_repair(&args.project, None).await;
        print_report(&report);
        return finish_report(&report);
    }

    Ok(())
}
