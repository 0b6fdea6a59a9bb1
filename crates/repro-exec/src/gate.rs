//! Pass/fail verdict over command and artifact outcomes.

use repro_core::domain::{ArtifactResult, CommandResult, EvaluationStatus};
use serde::{Deserialize, Serialize};

pub const PASS_NOTE: &str = "Commands and artifacts matched expectations";
pub const COMMAND_FAILURE_NOTE: &str = "One or more commands failed or logs were incomplete";

/// Gate evaluation verdict.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GateVerdict {
    pub status: EvaluationStatus,

    /// Individual reasons for failure (empty if passed).
    pub violations: Vec<String>,

    /// Summary note attached to the evaluation.
    pub message: String,
}

impl GateVerdict {
    pub fn passed(&self) -> bool {
        self.status == EvaluationStatus::Pass
    }
}

/// Verdict rules for one attempt.
pub struct ReproGate;

impl ReproGate {
    /// Pass iff every command exited 0 with all checks passing and every
    /// artifact matched. An attempt with no commands and no artifacts passes.
    pub fn evaluate(commands: &[CommandResult], artifacts: &[ArtifactResult]) -> GateVerdict {
        let mut violations = Vec::new();

        for cmd in commands {
            if cmd.exit_code != 0 {
                violations.push(format!(
                    "Command `{}` exited with {}",
                    cmd.command_line(),
                    cmd.exit_code
                ));
            }
            for snippet in cmd.missing_snippets() {
                violations.push(format!(
                    "Command `{}` stdout is missing `{snippet}`",
                    cmd.command_line()
                ));
            }
        }

        let failing: Vec<&str> = artifacts
            .iter()
            .filter(|a| !a.success)
            .map(|a| a.path.as_str())
            .collect();
        for artifact in artifacts.iter().filter(|a| !a.success) {
            violations.push(format!("Artifact {}: {}", artifact.path, artifact.details));
        }

        let commands_ok = commands.iter().all(CommandResult::passed);
        if commands_ok && failing.is_empty() {
            return GateVerdict {
                status: EvaluationStatus::Pass,
                violations,
                message: PASS_NOTE.to_string(),
            };
        }

        let mut details = Vec::new();
        if !commands_ok {
            details.push(COMMAND_FAILURE_NOTE.to_string());
        }
        if !failing.is_empty() {
            details.push(format!("Artifacts did not match: {}", failing.join(", ")));
        }
        GateVerdict {
            status: EvaluationStatus::Fail,
            violations,
            message: details.join("; "),
        }
    }
}
