//! Platform interpreter substitution.
//!
//! Generated commands say `python`; the host may only provide `python3`
//! (or the reverse on Windows). The shim rewrites the interpreter token
//! at every command position before the command reaches the shell.

use regex::Regex;

/// Rewrites generic interpreter invocations to the platform's own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformShim {
    python: String,
}

impl Default for PlatformShim {
    fn default() -> Self {
        Self::detect()
    }
}

impl PlatformShim {
    /// Shim for the current platform.
    pub fn detect() -> Self {
        let python = if cfg!(windows) { "python" } else { "python3" };
        Self::with_python(python)
    }

    /// Shim with an explicit interpreter name.
    pub fn with_python(python: impl Into<String>) -> Self {
        Self {
            python: python.into(),
        }
    }

    /// Shim built from an optional override, falling back to detection.
    pub fn from_override(python: Option<&str>) -> Self {
        python.map(Self::with_python).unwrap_or_else(Self::detect)
    }

    pub fn python(&self) -> &str {
        &self.python
    }

    /// Rewrite `python` at each command position (start of line, or after
    /// `&&`, `||`, `;`, `|`).
    pub fn apply(&self, command: &str) -> String {
        if self.python == "python" {
            return command.to_string();
        }
        let Ok(re) = Regex::new(r"(^|&&|\|\||;|\|)(\s*)python(\s|$)") else {
            return command.to_string();
        };
        re.replace_all(command, |caps: &regex::Captures<'_>| {
            format!("{}{}{}{}", &caps[1], &caps[2], self.python, &caps[3])
        })
        .into_owned()
    }
}
