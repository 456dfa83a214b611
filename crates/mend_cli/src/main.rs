//! mend CLI - Main entry point.
//!
//! Exit codes:
//! - 0: Success
//! - 1: General error
//! - 2: Invalid arguments, not found, or nothing to run
//! - 3: Repair exhausted
//! - 4: Completion provider failure

use std::process::ExitCode;

use clap::Parser;
use mend_chat::{ChatError, RepairStatus};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod commands;

use commands::{Cli, Commands, RepairFailed};

/// CI-friendly exit codes
pub struct ExitCodes;

impl ExitCodes {
    pub const SUCCESS: u8 = 0;
    pub const GENERAL_ERROR: u8 = 1;
    pub const INVALID_ARGS: u8 = 2;
    pub const REPAIR_EXHAUSTED: u8 = 3;
    pub const PROVIDER_FAILURE: u8 = 4;
}

/// Default log directives for the verbosity flags.
fn log_directives(verbose: bool, quiet: bool) -> &'static str {
    if verbose {
        "mend=debug,warn"
    } else if quiet {
        "warn"
    } else {
        "mend=info,warn"
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // RUST_LOG wins over the flags
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_directives(cli.verbose, cli.quiet)));
    let log_result = tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .try_init();

    if log_result.is_err() {
        // Logging already initialized, continue
    }

    let workspace = cli.workspace;
    let result = match cli.command {
        Commands::Run(args) => commands::run::execute(&workspace, args).await,
        Commands::Repair(args) => commands::repair::execute(&workspace, args).await,
        Commands::Chat(args) => commands::chat::execute(&workspace, args).await,
        Commands::Preview(args) => commands::preview::execute(&workspace, args).await,
        Commands::Shell(args) => commands::shell::execute(&workspace, args).await,
    };

    match result {
        Ok(()) => ExitCode::from(ExitCodes::SUCCESS),
        Err(e) => {
            let exit_code = categorize_error(&e);
            eprintln!("Error: {:#}", e);
            ExitCode::from(exit_code)
        }
    }
}

/// Categorize error to determine exit code
fn categorize_error(e: &anyhow::Error) -> u8 {
    if let Some(failed) = e.downcast_ref::<RepairFailed>() {
        return match failed.status {
            RepairStatus::Aborted if failed.provider_failure => ExitCodes::PROVIDER_FAILURE,
            RepairStatus::Abandoned => ExitCodes::INVALID_ARGS,
            RepairStatus::Exhausted => ExitCodes::REPAIR_EXHAUSTED,
            _ => ExitCodes::GENERAL_ERROR,
        };
    }

    if let Some(chat) = e.downcast_ref::<ChatError>() {
        return match chat {
            ChatError::ProviderFailure { .. } | ChatError::LlmNotConfigured => {
                ExitCodes::PROVIDER_FAILURE
            }
            ChatError::NotFound(_) | ChatError::InvalidPath(_) => ExitCodes::INVALID_ARGS,
            _ => ExitCodes::GENERAL_ERROR,
        };
    }

    let msg = e.to_string().to_lowercase();
    if msg.contains("argument") || msg.contains("not found") {
        ExitCodes::INVALID_ARGS
    } else {
        ExitCodes::GENERAL_ERROR
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_categorize_error() {
        let provider: anyhow::Error = ChatError::provider(Some(500), "oops").into();
        assert_eq!(categorize_error(&provider), ExitCodes::PROVIDER_FAILURE);

        let missing: anyhow::Error = ChatError::NotFound("project demo".to_string()).into();
        assert_eq!(categorize_error(&missing), ExitCodes::INVALID_ARGS);

        let repair = |status, provider_failure| -> anyhow::Error {
            RepairFailed {
                status,
                provider_failure,
                message: "gave up".to_string(),
            }
            .into()
        };
        assert_eq!(
            categorize_error(&repair(RepairStatus::Exhausted, false)),
            ExitCodes::REPAIR_EXHAUSTED
        );
        assert_eq!(
            categorize_error(&repair(RepairStatus::Aborted, true)),
            ExitCodes::PROVIDER_FAILURE
        );
        assert_eq!(
            categorize_error(&repair(RepairStatus::Abandoned, false)),
            ExitCodes::INVALID_ARGS
        );
        assert_eq!(
            categorize_error(&repair(RepairStatus::Aborted, false)),
            ExitCodes::GENERAL_ERROR
        );

        let other = anyhow::anyhow!("disk on fire");
        assert_eq!(categorize_error(&other), ExitCodes::GENERAL_ERROR);
    }

    #[test]
    fn test_log_directives() {
        assert_eq!(log_directives(false, false), "mend=info,warn");
        assert_eq!(log_directives(true, false), "mend=debug,warn");
        assert_eq!(log_directives(false, true), "warn");
    }
}
