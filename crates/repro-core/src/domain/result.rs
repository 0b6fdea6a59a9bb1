//! Per-command and per-artifact outcomes.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// A verification performed against a command's output.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CommandCheck {
    /// Literal substring containment in stdout.
    StdoutContains { snippet: String, passed: bool },
}

impl CommandCheck {
    pub fn passed(&self) -> bool {
        match self {
            CommandCheck::StdoutContains { passed, .. } => *passed,
        }
    }
}

/// Outcome of executing one submitted command.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CommandResult {
    /// Submitted argv.
    pub command: Vec<String>,

    /// Exit code (-1 when the process could not be spawned or was killed).
    pub exit_code: i32,

    /// Captured stdout.
    pub stdout: String,

    /// Captured stderr.
    pub stderr: String,

    /// Wall-clock duration in milliseconds.
    pub duration_ms: u64,

    /// Verification outcomes.
    pub checks: Vec<CommandCheck>,
}

impl CommandResult {
    /// Exit code 0 and every check passed.
    pub fn passed(&self) -> bool {
        self.exit_code == 0 && self.checks.iter().all(CommandCheck::passed)
    }

    /// Argv joined by spaces.
    pub fn command_line(&self) -> String {
        self.command.join(" ")
    }

    /// Snippets whose stdout check failed.
    pub fn missing_snippets(&self) -> impl Iterator<Item = &str> {
        self.checks.iter().filter_map(|check| match check {
            CommandCheck::StdoutContains { snippet, passed } if !passed => Some(snippet.as_str()),
            _ => None,
        })
    }
}

/// Outcome of checking one expected artifact.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ArtifactResult {
    /// Expectation path, relative to the workspace.
    pub path: String,

    pub success: bool,

    /// "Match", "Artifact missing", or the joined mismatch list.
    pub details: String,

    /// Resolved absolute location.
    pub actual_path: PathBuf,
}
