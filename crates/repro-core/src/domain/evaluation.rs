//! Aggregate outcome of one evaluation attempt.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::result::{ArtifactResult, CommandResult};
use crate::review::ReviewNote;

/// Note used when the submission has no entry for a requested experiment.
pub const SUBMISSION_MISSING_NOTE: &str = "submission missing";

/// Pass/fail verdict of an attempt.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EvaluationStatus {
    Pass,
    Fail,
}

impl fmt::Display for EvaluationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EvaluationStatus::Pass => write!(f, "pass"),
            EvaluationStatus::Fail => write!(f, "fail"),
        }
    }
}

/// Progress of a single attempt through the evaluation pipeline.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AttemptState {
    Pending,
    FilesApplied,
    CommandsExecuted,
    ArtifactsChecked,
    Verdicted(EvaluationStatus),
}

impl AttemptState {
    /// Next step in the fixed sequence. Stops at `ArtifactsChecked`, which
    /// only [`AttemptState::conclude`] leaves.
    pub fn next(self) -> Self {
        match self {
            AttemptState::Pending => AttemptState::FilesApplied,
            AttemptState::FilesApplied => AttemptState::CommandsExecuted,
            AttemptState::CommandsExecuted => AttemptState::ArtifactsChecked,
            other => other,
        }
    }

    /// Record the verdict. Only valid once artifacts are checked; any other
    /// state is returned unchanged.
    pub fn conclude(self, verdict: EvaluationStatus) -> Self {
        match self {
            AttemptState::ArtifactsChecked => AttemptState::Verdicted(verdict),
            other => other,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, AttemptState::Verdicted(_))
    }
}

impl fmt::Display for AttemptState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttemptState::Pending => write!(f, "pending"),
            AttemptState::FilesApplied => write!(f, "files_applied"),
            AttemptState::CommandsExecuted => write!(f, "commands_executed"),
            AttemptState::ArtifactsChecked => write!(f, "artifacts_checked"),
            AttemptState::Verdicted(status) => write!(f, "verdicted:{status}"),
        }
    }
}

/// Everything observed during one attempt at one experiment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExperimentEvaluation {
    pub id: String,
    pub status: EvaluationStatus,

    /// Workspace directory, absent when the attempt never got one.
    pub workspace: Option<PathBuf>,

    /// Relative paths written from the submission, in order.
    pub files_written: Vec<String>,

    pub command_results: Vec<CommandResult>,
    pub artifact_results: Vec<ArtifactResult>,

    /// Opaque reviewer output.
    pub reviews: Vec<ReviewNote>,

    /// Opaque scorer output.
    pub score: Value,

    pub notes: String,
    pub variant: String,

    /// 1 for the initial attempt, 2 for the corrected one.
    pub attempt: u32,

    /// Where the run record was persisted.
    pub record_path: Option<PathBuf>,
}

impl ExperimentEvaluation {
    /// A failed attempt that produced no execution data.
    pub fn failed(
        id: impl Into<String>,
        notes: impl Into<String>,
        variant: impl Into<String>,
        attempt: u32,
    ) -> Self {
        Self {
            id: id.into(),
            status: EvaluationStatus::Fail,
            workspace: None,
            files_written: Vec::new(),
            command_results: Vec::new(),
            artifact_results: Vec::new(),
            reviews: Vec::new(),
            score: Value::Object(Default::default()),
            notes: notes.into(),
            variant: variant.into(),
            attempt,
            record_path: None,
        }
    }

    /// Fail verdict for a requested experiment without a submission entry.
    pub fn submission_missing(id: impl Into<String>, attempt: u32) -> Self {
        Self::failed(id, SUBMISSION_MISSING_NOTE, "unspecified", attempt)
    }

    pub fn passed(&self) -> bool {
        self.status == EvaluationStatus::Pass
    }

    /// Label this result as the outcome of a correction.
    pub fn mark_corrected(&mut self) {
        self.notes = format!("{} (after correction)", self.notes);
    }

    /// Paths of artifacts that did not match.
    pub fn failing_artifacts(&self) -> impl Iterator<Item = &str> {
        self.artifact_results
            .iter()
            .filter(|a| !a.success)
            .map(|a| a.path.as_str())
    }
}
