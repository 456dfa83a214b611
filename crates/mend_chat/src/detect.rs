//! Run-command detection from a project's file names.
//!
//! Rules are evaluated in priority order; the first rule that selects a
//! file decides the command. Adding a language means adding a rule.

use std::borrow::Cow;
use std::path::Path;

/// One `(predicate over file names) -> command template` rule.
///
/// Templates may use `{file}`, `{stem}` and `{dir}` (`.` at the root).
/// Substituted values are shell-quoted when they are not plain words.
#[derive(Debug, Clone, Copy)]
pub struct RunRule {
    pub language: &'static str,
    pub select: fn(&[&str]) -> Option<String>,
    pub template: &'static str,
}

impl RunRule {
    /// Command for this file set, if the rule applies.
    pub fn apply(&self, files: &[&str]) -> Option<String> {
        let file = (self.select)(files)?;
        let path = Path::new(&file);
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        let dir = path
            .parent()
            .map(|p| p.to_string_lossy().to_string())
            .filter(|p| !p.is_empty())
            .unwrap_or_else(|| ".".to_string());

        Some(
            self.template
                .replace("{file}", &shell_quote(&file))
                .replace("{stem}", &shell_quote(&stem))
                .replace("{dir}", &shell_quote(&dir)),
        )
    }
}

/// Built-in rules, highest priority first.
pub const RUN_RULES: &[RunRule] = &[
    RunRule {
        language: "python",
        select: python_entry,
        template: "python {file}",
    },
    RunRule {
        language: "go",
        select: go_module,
        template: "go run .",
    },
    RunRule {
        language: "go",
        select: go_main,
        template: "go run {file}",
    },
    RunRule {
        language: "node",
        select: node_server,
        template: "node {file}",
    },
    RunRule {
        language: "java",
        select: java_main,
        template: "javac {file} && java -cp {dir} {stem}",
    },
];

/// Pick a run command for a project from its file names.
pub fn detect_run_command<S: AsRef<str>>(files: &[S]) -> Option<String> {
    let files: Vec<&str> = files.iter().map(|f| f.as_ref()).collect();
    RUN_RULES.iter().find_map(|rule| rule.apply(&files))
}

/// Quote a value for `sh -c` (or `cmd /C` on Windows) unless it is a plain word.
pub fn shell_quote(value: &str) -> Cow<'_, str> {
    let plain = !value.is_empty()
        && value.chars().all(|c| {
            c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-' | '/' | '+' | ':' | '@' | ',')
        });
    if plain {
        Cow::Borrowed(value)
    } else if cfg!(windows) {
        Cow::Owned(format!("\"{}\"", value.replace('"', "")))
    } else {
        Cow::Owned(format!("'{}'", value.replace('\'', r"'\''")))
    }
}

fn depth(path: &str) -> usize {
    path.matches('/').count()
}

fn file_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// Shallowest, then lexicographically first, file accepted by `pred`.
fn shallowest(files: &[&str], pred: impl Fn(&str) -> bool) -> Option<String> {
    files
        .iter()
        .copied()
        .filter(|f| pred(f))
        .min_by(|a, b| depth(a).cmp(&depth(b)).then_with(|| a.cmp(b)))
        .map(str::to_string)
}

/// First name in `names` present anywhere, preferring earlier names.
fn named(files: &[&str], names: &[&str]) -> Option<String> {
    names
        .iter()
        .find_map(|name| shallowest(files, |f| file_name(f) == *name))
}

fn python_entry(files: &[&str]) -> Option<String> {
    named(files, &["main.py", "app.py"]).or_else(|| shallowest(files, |f| f.ends_with(".py")))
}

fn go_module(files: &[&str]) -> Option<String> {
    files
        .iter()
        .find(|f| **f == "go.mod")
        .map(|f| f.to_string())
}

fn go_main(files: &[&str]) -> Option<String> {
    named(files, &["main.go"])
}

fn node_server(files: &[&str]) -> Option<String> {
    named(files, &["server.js", "app.js", "index.js"])
}

fn java_main(files: &[&str]) -> Option<String> {
    named(files, &["Main.java"]).or_else(|| shallowest(files, |f| f.ends_with(".java")))
}
