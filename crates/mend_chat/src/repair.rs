//! Auto-repair loop.
//!
//! Runs a project's command, and on failure asks the completion provider
//! for corrected files, writes them, and runs again. Every terminal state
//! carries the full attempt history.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use mend_runner::{CommandExecutor, RunnerConfig};
use tracing::{debug, info, warn};

use crate::actions::parse_actions;
use crate::detect::detect_run_command;
use crate::llm::{CompletionOptions, CompletionProvider};
use crate::settings::Settings;
use crate::store::ContentStore;
use crate::truncate_chars;
use crate::types::{AttemptOutcome, RepairAttempt, RepairReport, RepairStatus};

const REPAIR_SYSTEM_PROMPT: &str = "You are an expert developer fixing a program that fails when run. \
Reply only in the requested format. Return complete file contents, never fragments.";

/// Upper bounds that settings cannot raise.
pub const MAX_ATTEMPTS: u32 = 5;
pub const MAX_CONTEXT_FILES: usize = 10;
pub const MAX_FILE_CHARS: usize = 3000;
pub const MAX_ERROR_CHARS: usize = 3000;

/// Bounds for one repair run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepairConfig {
    /// Run iterations before giving up
    pub max_attempts: u32,
    /// Project files embedded in a repair prompt
    pub max_context_files: usize,
    /// Characters kept per embedded file
    pub max_file_chars: usize,
    /// Characters of error output embedded in a prompt
    pub max_error_chars: usize,
    /// Characters of output kept on each attempt record
    pub attempt_output_chars: usize,
    /// Wall-clock bound for each verification run
    pub run_timeout: Duration,
}

impl Default for RepairConfig {
    fn default() -> Self {
        Self::from_settings(&Settings::default())
    }
}

impl RepairConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            max_attempts: settings.repair.max_attempts.clamp(1, MAX_ATTEMPTS),
            max_context_files: settings.repair.max_context_files.min(MAX_CONTEXT_FILES),
            max_file_chars: settings.repair.max_file_chars.min(MAX_FILE_CHARS),
            max_error_chars: settings.repair.max_error_chars.min(MAX_ERROR_CHARS),
            attempt_output_chars: settings.repair.attempt_output_chars,
            run_timeout: settings.runner.repair_run_timeout(),
        }
    }

    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.clamp(1, MAX_ATTEMPTS);
        self
    }

    pub fn run_timeout(mut self, timeout: Duration) -> Self {
        self.run_timeout = timeout;
        self
    }

    pub fn with_runner(mut self, runner: &RunnerConfig) -> Self {
        self.run_timeout = runner.repair_run_timeout();
        self
    }
}

/// Build the prompt asking for a fix.
///
/// At most `max_context_files` files are embedded, each cut to
/// `max_file_chars`; the error output is cut to `max_error_chars`.
pub fn build_repair_prompt(
    command: &str,
    error_output: &str,
    files: &[(String, String)],
    config: &RepairConfig,
) -> String {
    let mut prompt = format!(
        "## Run Command\n{}\n\n## Error Output\n```\n{}\n```\n\n## Project Files\n",
        command,
        truncate_chars(error_output.trim(), config.max_error_chars)
    );

    for (path, content) in files.iter().take(config.max_context_files) {
        prompt.push_str(&format!(
            "\n### {}\n```\n{}\n```\n",
            path,
            truncate_chars(content, config.max_file_chars)
        ));
    }

    prompt.push_str(
        r#"
## Output Format
Reply with ONLY the following, and nothing else:

EXPLANATION: <one or two sentences on what was wrong>

FILE: <relative path of a file that must change>
```
<complete corrected file content>
```

Repeat the FILE block for every file that must change. Omit files that
are already correct. Do not add any other text.
"#,
    );

    prompt
}

/// Order files so those named in the error output come first.
fn prioritize(files: Vec<String>, error_output: &str) -> Vec<String> {
    let (mut named, rest): (Vec<String>, Vec<String>) = files.into_iter().partition(|f| {
        let name = f.rsplit('/').next().unwrap_or(f);
        error_output.contains(f.as_str()) || error_output.contains(name)
    });
    named.extend(rest);
    named
}

/// Drives run, analyze, fix and retry for one project.
pub struct AutoRepair {
    store: Arc<dyn ContentStore>,
    provider: Arc<dyn CompletionProvider>,
    executor: Arc<dyn CommandExecutor>,
    config: RepairConfig,
}

impl AutoRepair {
    pub fn new(
        store: Arc<dyn ContentStore>,
        provider: Arc<dyn CompletionProvider>,
        executor: Arc<dyn CommandExecutor>,
    ) -> Self {
        Self {
            store,
            provider,
            executor,
            config: RepairConfig::default(),
        }
    }

    pub fn with_config(mut self, config: RepairConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &RepairConfig {
        &self.config
    }

    /// Run the loop to a terminal state.
    pub async fn run(&self, project: &str, explicit_command: Option<&str>) -> RepairReport {
        let mut attempts = Vec::new();

        let files = match self.store.list_project_files(project).await {
            Ok(files) => files,
            Err(e) if e.is_not_found() => {
                return report(
                    RepairStatus::Abandoned,
                    format!("Project not found: {}", project),
                    None,
                    attempts,
                    String::new(),
                );
            }
            Err(e) => {
                return report(
                    RepairStatus::Aborted,
                    e.to_string(),
                    None,
                    attempts,
                    String::new(),
                );
            }
        };

        let command = match explicit_command.map(str::trim).filter(|c| !c.is_empty()) {
            Some(command) => command.to_string(),
            None => match detect_run_command(&files) {
                Some(command) => command,
                None => {
                    info!("No run command detected for project {}", project);
                    return report(
                        RepairStatus::Abandoned,
                        "Could not determine how to run this project. Please specify a run command.".to_string(),
                        None,
                        attempts,
                        String::new(),
                    );
                }
            },
        };

        let Some(working_dir) = self.store.project_root(project) else {
            return report(
                RepairStatus::Abandoned,
                format!("Project {} has no directory to run commands in", project),
                Some(command),
                attempts,
                String::new(),
            );
        };

        info!("Auto-repair for {} using: {}", project, command);
        let mut final_output = String::new();

        for index in 1..=self.config.max_attempts {
            let (failed, output) = self.execute(&command, &working_dir).await;
            final_output = output.clone();

            if !failed {
                info!("Attempt {}: command succeeded", index);
                attempts.push(RepairAttempt::new(
                    index,
                    AttemptOutcome::Success,
                    self.clip(&output),
                ));
                let message = if index == 1 {
                    "Command ran successfully, nothing to fix".to_string()
                } else {
                    format!("Fixed after {} attempts", index)
                };
                return report(RepairStatus::Success, message, Some(command), attempts, final_output);
            }

            warn!("Attempt {}: command failed", index);
            attempts.push(RepairAttempt::new(
                index,
                AttemptOutcome::ErrorDetected,
                self.clip(&output),
            ));

            if index == self.config.max_attempts {
                break;
            }

            let current = self
                .store
                .list_project_files(project)
                .await
                .unwrap_or_else(|_| files.clone());
            let context = self.gather_context(project, &current, &output).await;
            let prompt = build_repair_prompt(&command, &output, &context, &self.config);
            let options = CompletionOptions::new().system(REPAIR_SYSTEM_PROMPT);

            let response = match self.provider.complete(&prompt, &options).await {
                Ok(response) => response,
                Err(e) => {
                    warn!("Completion provider failed during repair: {}", e);
                    return RepairReport {
                        provider_failure: true,
                        ..report(
                            RepairStatus::Aborted,
                            e.to_string(),
                            Some(command),
                            attempts,
                            final_output,
                        )
                    };
                }
            };

            let directive = parse_actions(&response);
            if directive.is_empty() {
                info!("Attempt {}: provider returned no file edits", index);
                attempts.push(RepairAttempt::new(index, AttemptOutcome::NoFixFound, ""));
                return report(
                    RepairStatus::Exhausted,
                    "No fix could be extracted from the response".to_string(),
                    Some(command),
                    attempts,
                    final_output,
                );
            }

            let mut applied = BTreeSet::new();
            for edit in directive.resolved_edits() {
                if let Err(e) = self.store.write_file(project, &edit.path, &edit.content).await {
                    warn!("Failed to write {}: {}", edit.path, e);
                    return report(
                        RepairStatus::Aborted,
                        format!("Failed to apply fix to {}: {}", edit.path, e),
                        Some(command),
                        attempts,
                        final_output,
                    );
                }
                applied.insert(edit.path);
            }

            info!("Attempt {}: applied fix to {} file(s)", index, applied.len());
            let mut attempt = RepairAttempt::new(index, AttemptOutcome::FixApplied, "");
            attempt.applied_files = applied;
            attempt.explanation = directive.explanation;
            attempts.push(attempt);
        }

        report(
            RepairStatus::Exhausted,
            format!(
                "Could not fix the program after {} attempts",
                self.config.max_attempts
            ),
            Some(command),
            attempts,
            final_output,
        )
    }

    /// Run once; timeouts and spawn failures count as failed runs.
    async fn execute(&self, command: &str, working_dir: &Path) -> (bool, String) {
        match self.executor.run(command, working_dir, self.config.run_timeout).await {
            Ok(result) if result.exit_failed => {
                let output = result.combined_output();
                if output.trim().is_empty() {
                    let code = result
                        .exit_code
                        .map(|c| c.to_string())
                        .unwrap_or_else(|| "signal".to_string());
                    (true, format!("Process exited with failure ({})", code))
                } else {
                    (true, output)
                }
            }
            Ok(result) => (false, result.output().to_string()),
            Err(e) => (true, e.with_output()),
        }
    }

    async fn gather_context(
        &self,
        project: &str,
        files: &[String],
        error_output: &str,
    ) -> Vec<(String, String)> {
        let mut context = Vec::new();
        for path in prioritize(files.to_vec(), error_output) {
            if context.len() >= self.config.max_context_files {
                break;
            }
            match self.store.read_file(project, &path).await {
                Ok(content) => context.push((path, content)),
                Err(e) => debug!("Skipping {} in repair context: {}", path, e),
            }
        }
        context
    }

    fn clip(&self, output: &str) -> String {
        truncate_chars(output, self.config.attempt_output_chars).to_string()
    }
}

fn report(
    status: RepairStatus,
    message: String,
    command: Option<String>,
    attempts: Vec<RepairAttempt>,
    final_output: String,
) -> RepairReport {
    RepairReport {
        status,
        message,
        command,
        attempts,
        final_output,
        provider_failure: false,
    }
}
