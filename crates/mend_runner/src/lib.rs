//! # mend_runner
//!
//! Process supervision for mend.
//!
//! This crate runs shell commands on behalf of projects, either to
//! completion under a timeout or detached as long-running servers, and
//! keeps track of every detached process so it can be listed and killed.
//!
//! # Features
//!
//! - **Command Runner**: classifies commands and runs them synchronously or in the background
//! - **Process Registry**: one tracked process per project key, with kill support
//! - **Platform Shim**: rewrites generic `python` invocations for the host
//! - **Preview Servers**: static file servers for project directories
//! - **Mock Executor**: for testing without spawning processes
//!
//! # Example
//!
//! ```rust,no_run
//! use mend_runner::{CommandExecutor, CommandRunner, ProcessRegistry, RunnerConfig};
//! use std::path::Path;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = RunnerConfig::default();
//!     let runner = CommandRunner::new(ProcessRegistry::new(), config.clone());
//!
//!     let result = runner
//!         .run("python app.py", Path::new("."), config.default_timeout())
//!         .await?;
//!     println!("Failed: {}", result.exit_failed);
//!
//!     Ok(())
//! }
//! ```

pub mod command;
pub mod config;
pub mod error;
pub mod mock;
pub mod preview;
pub mod registry;
pub mod runner;
pub mod shim;

pub use command::{classify, detect_port, CommandKind, CommandRunner};
pub use config::RunnerConfig;
pub use error::{RunnerError, RunnerResult};
pub use mock::{CapturedCall, MockExecutor, MockResponse};
pub use preview::{PreviewInfo, PreviewManager};
pub use registry::{ProcessInfo, ProcessRegistry, DEFAULT_KEY};
pub use runner::{BackgroundLaunch, CommandExecutor, CommandOutcome, RunResult};
pub use shim::PlatformShim;
