//! Structured observability hooks for the evaluation lifecycle.
//!
//! This module provides:
//! - Experiment-scoped tracing spans via `ExperimentSpan`
//! - Emission functions for key lifecycle events: attempt start, command
//!   finish, artifact check, verdict, correction request
//!
//! Events are emitted at `info!` level (filter with `RUST_LOG`).

use std::future::Future;

use tracing::{info, warn, Instrument};

use crate::domain::EvaluationStatus;

/// Span tagging everything logged during one attempt with its experiment id
/// and attempt number.
///
/// # Example
///
/// ```ignore
/// let eval = ExperimentSpan::new("linear_regression", 1)
///     .run(evaluator.evaluate_attempt(spec, entry, 1))
///     .await;
/// ```
pub struct ExperimentSpan {
    span: tracing::Span,
}

impl ExperimentSpan {
    pub fn new(experiment_id: &str, attempt: u32) -> Self {
        Self {
            span: tracing::info_span!("repro.experiment", experiment_id = %experiment_id, attempt = attempt),
        }
    }

    /// Drive `fut` to completion inside the span.
    pub async fn run<F: Future>(self, fut: F) -> F::Output {
        fut.instrument(self.span).await
    }

    /// Enter the span for synchronous work; exits on drop.
    pub fn enter(self) -> tracing::span::EnteredSpan {
        self.span.entered()
    }
}

pub fn emit_attempt_started(experiment_id: &str, attempt: u32, variant: &str) {
    info!(
        event = "attempt.started",
        experiment_id = %experiment_id,
        attempt = attempt,
        variant = %variant,
    );
}

/// Emit event: a command finished (or failed to spawn).
pub fn emit_command_finished(experiment_id: &str, command: &str, exit_code: i32, duration_ms: u64) {
    info!(
        event = "command.finished",
        experiment_id = %experiment_id,
        command = %command,
        exit_code = exit_code,
        duration_ms = duration_ms,
    );
}

pub fn emit_artifact_checked(experiment_id: &str, path: &str, success: bool) {
    info!(
        event = "artifact.checked",
        experiment_id = %experiment_id,
        path = %path,
        success = success,
    );
}

/// Emit event: an attempt reached its verdict.
pub fn emit_verdict(experiment_id: &str, attempt: u32, status: EvaluationStatus, notes: &str) {
    info!(
        event = "attempt.verdict",
        experiment_id = %experiment_id,
        attempt = attempt,
        status = %status,
        notes = %notes,
    );
}

pub fn emit_correction_requested(experiment_id: &str, next_attempt: u32, brief_len: usize) {
    info!(
        event = "correction.requested",
        experiment_id = %experiment_id,
        next_attempt = next_attempt,
        brief_len = brief_len,
    );
}

/// Emit event: an attempt aborted on a structural error (warning level).
pub fn emit_attempt_aborted(experiment_id: &str, attempt: u32, error: &dyn std::fmt::Display) {
    warn!(event = "attempt.aborted", experiment_id = %experiment_id, attempt = attempt, error = %error);
}
