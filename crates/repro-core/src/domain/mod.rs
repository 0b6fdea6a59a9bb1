//! Domain models for reproduction evaluation.
//!
//! Canonical definitions for the core entities:
//! - `ExperimentSpec`: immutable description of a reproduction task
//! - `Submission`: files and commands provided by a participant
//! - `CommandResult` / `ArtifactResult`: per-step outcomes
//! - `ExperimentEvaluation`: aggregate outcome of one attempt

pub mod error;
pub mod evaluation;
pub mod result;
pub mod spec;
pub mod submission;

pub use error::{ReproError, Result};
pub use evaluation::{
    AttemptState, EvaluationStatus, ExperimentEvaluation, SUBMISSION_MISSING_NOTE,
};
pub use result::{ArtifactResult, CommandCheck, CommandResult};
pub use spec::{ArtifactExpectation, ArtifactKind, CommandExpectation, ExperimentSpec};
pub use submission::{Submission, SubmissionEntry, SubmittedFile};
