//! Shell command - Interactive session over one workspace.
//!
//! Background processes and preview servers live as long as the session.

use std::path::Path;

use anyhow::Result;
use clap::Args;
use tokio::io::{AsyncBufReadExt, BufReader};

use mend_chat::Workspace;

use super::{open_workspace, print_outcome, print_report};

#[derive(Args)]
pub struct ShellArgs {
    /// Project the session works on
    #[arg(short, long)]
    project: String,
}

/// One line of shell input.
#[derive(Debug, PartialEq, Eq)]
enum ShellCommand {
    Run(String),
    Repair(Option<String>),
    Ps,
    Kill(u32),
    Preview(u16),
    StopPreview,
    Quit,
    Help,
    Chat(String),
    Invalid(String),
}

fn parse_line(line: &str) -> Option<ShellCommand> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    if !line.starts_with('/') {
        return Some(ShellCommand::Chat(line.to_string()));
    }

    let (name, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
    let rest = rest.trim();

    let command = match name {
        "/run" if !rest.is_empty() => ShellCommand::Run(rest.to_string()),
        "/run" => ShellCommand::Invalid("usage: /run <command>".to_string()),
        "/repair" => ShellCommand::Repair((!rest.is_empty()).then(|| rest.to_string())),
        "/ps" => ShellCommand::Ps,
        "/kill" => match rest.parse() {
            Ok(pid) => ShellCommand::Kill(pid),
            Err(_) => ShellCommand::Invalid("usage: /kill <pid>".to_string()),
        },
        "/preview" if rest.is_empty() => ShellCommand::Preview(0),
        "/preview" => match rest.parse() {
            Ok(port) => ShellCommand::Preview(port),
            Err(_) => ShellCommand::Invalid("usage: /preview [port]".to_string()),
        },
        "/stop-preview" => ShellCommand::StopPreview,
        "/quit" | "/exit" => ShellCommand::Quit,
        "/help" => ShellCommand::Help,
        other => ShellCommand::Invalid(format!("unknown command {}, try /help", other)),
    };
    Some(command)
}

const HELP: &str = "Commands:
  /run <command>     Run a command in the project
  /repair [command]  Run and auto-repair the project
  /ps                List background processes
  /kill <pid>        Kill a background process
  /preview [port]    Serve the project's files
  /stop-preview      Stop the preview server
  /quit              Leave the shell
Anything else is sent to the assistant.";

pub async fn execute(workspace: &Path, args: ShellArgs) -> Result<()> {
    let ws = open_workspace(workspace)?;
    println!("mend shell for project '{}'. Type /help for commands.", args.project);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        eprint!("mend> ");
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let Some(command) = parse_line(&line) else {
            continue;
        };
        if command == ShellCommand::Quit {
            break;
        }
        if let Err(e) = handle(&ws, &args.project, command).await {
            eprintln!("Error: {:#}", e);
        }
    }

    ws.shutdown().await;
    Ok(())
}

async fn handle(ws: &Workspace, project: &str, command: ShellCommand) -> Result<()> {
    match command {
        ShellCommand::Run(command) => {
            let reply = ws.run_command(project, &command).await?;
            println!("{}", reply.output);
        }
        ShellCommand::Repair(command) => {
            let report = ws.start_auto_repair(project, command.as_deref()).await;
            print_report(&report);
        }
        ShellCommand::Ps => {
            let processes = ws.list_processes();
            if processes.is_empty() {
                println!("No background processes.");
            }
            for process in processes {
                println!("{:>8}  {}", process.pid, process.name);
            }
        }
        ShellCommand::Kill(pid) => {
            let reply = ws.kill_process(pid).await;
            match reply.error {
                None => println!("Killed {}", pid),
                Some(error) => println!("{}", error),
            }
        }
        ShellCommand::Preview(port) => {
            let preview = ws.host_preview(project, port).await?;
            println!("🌐 Preview at {}", preview.url);
        }
        ShellCommand::StopPreview => {
            println!("{}", ws.stop_preview(project).await.message);
        }
        ShellCommand::Help => println!("{}", HELP),
        ShellCommand::Invalid(message) => println!("{}", message),
        ShellCommand::Chat(instruction) => {
            let outcome = ws.chat(project, &instruction, None).await?;
            if print_outcome(ws, project, &outcome).await? {
                let report = ws.start_auto_repair(project, None).await;
                print_report(&report);
            }
        }
        ShellCommand::Quit => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_line() {
        assert_eq!(parse_line("   "), None);
        assert_eq!(
            parse_line("/run python app.py"),
            Some(ShellCommand::Run("python app.py".to_string()))
        );
        assert_eq!(parse_line("/repair"), Some(ShellCommand::Repair(None)));
        assert_eq!(parse_line("/kill 42"), Some(ShellCommand::Kill(42)));
        assert!(matches!(parse_line("/kill x"), Some(ShellCommand::Invalid(_))));
        assert_eq!(parse_line("/preview"), Some(ShellCommand::Preview(0)));
        assert_eq!(parse_line("/preview 8080"), Some(ShellCommand::Preview(8080)));
        assert_eq!(parse_line("/stop-preview"), Some(ShellCommand::StopPreview));
        assert_eq!(parse_line("/quit"), Some(ShellCommand::Quit));
        assert_eq!(
            parse_line("add a README"),
            Some(ShellCommand::Chat("add a README".to_string()))
        );
    }
}
