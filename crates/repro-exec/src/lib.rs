//! Repro Exec - running and judging reproduction attempts
//!
//! Provides the evaluation orchestrator that:
//! - Executes submitted commands inside isolated workspaces
//! - Turns command and artifact outcomes into a verdict
//! - Requests one corrected submission when an attempt fails

pub mod config;
pub mod correction;
pub mod fakes;
pub mod gate;
pub mod orchestrator;
pub mod plan;
pub mod runner;
pub mod scoring;
pub mod transport;

// Re-export key types
pub use config::EvaluatorConfig;
pub use correction::{build_brief, CorrectionPolicy};
pub use fakes::StaticTransport;
pub use gate::{GateVerdict, ReproGate};
pub use orchestrator::Evaluator;
pub use plan::EvaluationPlan;
pub use runner::CommandRunner;
pub use scoring::{ScoreInput, Scorer, UnavailableScorer};
pub use transport::{LocalSolutionSource, SubmissionRequest, SubmissionTransport};
