//! Repro Core Library
//!
//! Building blocks for evaluating reproductions of computational
//! experiments: the experiment registry, isolated workspaces, artifact
//! comparison, code review heuristics, run records and reports.

pub mod compare;
pub mod domain;
pub mod obs;
pub mod record;
pub mod registry;
pub mod report;
pub mod review;
pub mod telemetry;
pub mod variant;
pub mod workspace;

pub use compare::{check_artifact, compare_values, is_close, Comparison, Mismatch, MismatchKind};

pub use domain::{
    ArtifactExpectation, ArtifactKind, ArtifactResult, AttemptState, CommandCheck,
    CommandExpectation, CommandResult, EvaluationStatus, ExperimentEvaluation, ExperimentSpec,
    ReproError, Result, Submission, SubmissionEntry, SubmittedFile, SUBMISSION_MISSING_NOTE,
};

pub use obs::ExperimentSpan;
pub use record::{read_record, FsRecordSink, MemoryRecordSink, RecordSink, RunRecord};
pub use registry::ExperimentRegistry;
pub use report::{render_experiment_report, BatchReport};
pub use review::{HeuristicReviewer, ReviewNote, Reviewer};
pub use telemetry::init_tracing;
pub use variant::{choose_variant, VariantStrategy};
pub use workspace::{Workspace, WorkspaceSettings, DEFAULT_SEARCH_PATH_VAR};

/// Crate version, kept in lockstep across the workspace.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
