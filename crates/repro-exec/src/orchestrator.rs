//! Evaluation orchestration.
//!
//! One attempt walks `Pending -> FilesApplied -> CommandsExecuted ->
//! ArtifactsChecked -> Verdicted`. A failed verdict triggers at most
//! `CorrectionPolicy::max_attempts - 1` correction round trips through the
//! transport.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use repro_core::domain::{AttemptState, EvaluationStatus};
use repro_core::obs::{self, ExperimentSpan};
use repro_core::{
    check_artifact, BatchReport, ExperimentEvaluation, ExperimentRegistry, ExperimentSpec,
    FsRecordSink, HeuristicReviewer, RecordSink, Result, Reviewer, RunRecord, Submission,
    SubmissionEntry, Workspace, WorkspaceSettings,
};
use tracing::{debug, info, warn};

use crate::config::EvaluatorConfig;
use crate::correction::{build_brief, CorrectionPolicy};
use crate::gate::ReproGate;
use crate::plan::EvaluationPlan;
use crate::runner::CommandRunner;
use crate::scoring::{ScoreInput, Scorer, UnavailableScorer};
use crate::transport::{SubmissionRequest, SubmissionTransport};

/// Drives attempts, verdicts and corrections for a registry of experiments.
pub struct Evaluator {
    registry: Arc<ExperimentRegistry>,
    settings: WorkspaceSettings,
    runner: CommandRunner,
    reviewer: Arc<dyn Reviewer>,
    scorer: Arc<dyn Scorer>,
    sink: Arc<dyn RecordSink>,
    policy: CorrectionPolicy,
}

impl Evaluator {
    /// Evaluator with heuristic review, no scoring backend and records
    /// written under `config.log_dir`.
    pub fn new(registry: Arc<ExperimentRegistry>, config: &EvaluatorConfig) -> Self {
        Self {
            registry,
            settings: config.workspace_settings(),
            runner: CommandRunner::new(config.max_concurrent_commands, config.command_timeout),
            reviewer: Arc::new(HeuristicReviewer),
            scorer: Arc::new(UnavailableScorer::default()),
            sink: Arc::new(FsRecordSink::new(&config.log_dir)),
            policy: CorrectionPolicy::default(),
        }
    }

    pub fn with_runner(mut self, runner: CommandRunner) -> Self {
        self.runner = runner;
        self
    }

    pub fn with_reviewer(mut self, reviewer: Arc<dyn Reviewer>) -> Self {
        self.reviewer = reviewer;
        self
    }

    pub fn with_scorer(mut self, scorer: Arc<dyn Scorer>) -> Self {
        self.scorer = scorer;
        self
    }

    pub fn with_record_sink(mut self, sink: Arc<dyn RecordSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn with_policy(mut self, policy: CorrectionPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn registry(&self) -> &ExperimentRegistry {
        &self.registry
    }

    pub fn policy(&self) -> CorrectionPolicy {
        self.policy
    }

    /// Request the initial submission for `plan`, evaluate every experiment
    /// in order and assemble the final report.
    pub async fn run_plan(
        &self,
        plan: &EvaluationPlan,
        transport: &dyn SubmissionTransport,
    ) -> Result<BatchReport> {
        let started = Instant::now();
        info!(experiments = ?plan.experiments, variant = ?plan.solution_variant, "evaluation plan started");

        let request = SubmissionRequest::initial(&self.registry, plan)?;
        let submission = transport.request(&request).await?;
        let results = self
            .evaluate_batch(&plan.experiments, &submission, transport)
            .await?;

        let report = BatchReport::new(results, started.elapsed());
        info!(
            success = report.success(),
            elapsed_ms = report.elapsed.as_millis() as u64,
            "evaluation plan finished"
        );
        Ok(report)
    }

    /// Evaluate `ids` against `submission`. Unknown ids are rejected before
    /// anything runs; after that, one experiment failing never stops the
    /// others.
    pub async fn evaluate_batch(
        &self,
        ids: &[String],
        submission: &Submission,
        transport: &dyn SubmissionTransport,
    ) -> Result<Vec<ExperimentEvaluation>> {
        let specs = ids
            .iter()
            .map(|id| self.registry.get(id))
            .collect::<Result<Vec<_>>>()?;

        let mut results = Vec::with_capacity(specs.len());
        for spec in specs {
            let result = self
                .evaluate_experiment(spec, submission.entry(&spec.id), transport)
                .await;
            results.push(result);
        }
        Ok(results)
    }

    /// Evaluate one experiment, requesting corrections while the policy
    /// allows. The latest attempt's result is returned.
    pub async fn evaluate_experiment(
        &self,
        spec: &ExperimentSpec,
        entry: Option<&SubmissionEntry>,
        transport: &dyn SubmissionTransport,
    ) -> ExperimentEvaluation {
        let mut current = match entry {
            Some(entry) => self.evaluate_attempt(spec, entry, 1).await,
            None => {
                warn!(experiment_id = %spec.id, "submission missing");
                let missing = ExperimentEvaluation::submission_missing(&spec.id, 1);
                obs::emit_verdict(&spec.id, 1, missing.status, &missing.notes);
                missing
            }
        };

        while !current.passed() && self.policy.allows_retry(current.attempt) {
            let brief = build_brief(&current);
            let next_attempt = current.attempt + 1;
            obs::emit_correction_requested(&spec.id, next_attempt, brief.len());
            debug!(experiment_id = %spec.id, brief = %brief, "correction brief");

            let request = SubmissionRequest::correction(spec, brief);
            let corrected_entry = match transport.request(&request).await {
                Ok(submission) => submission.entry(&spec.id).cloned(),
                Err(e) => {
                    warn!(experiment_id = %spec.id, error = %e, "correction request failed");
                    current.notes = format!("{} (correction request failed: {e})", current.notes);
                    break;
                }
            };
            let Some(corrected_entry) = corrected_entry else {
                warn!(experiment_id = %spec.id, "correction returned no submission");
                current.notes = format!("{} (correction returned no submission)", current.notes);
                break;
            };

            let mut next = self
                .evaluate_attempt(spec, &corrected_entry, next_attempt)
                .await;
            next.mark_corrected();
            current = next;
        }
        current
    }

    /// Run one full attempt and persist its record. Structural errors
    /// (workspace, containment, malformed submission) become a failed
    /// verdict whose note is the error message.
    pub async fn evaluate_attempt(
        &self,
        spec: &ExperimentSpec,
        entry: &SubmissionEntry,
        attempt: u32,
    ) -> ExperimentEvaluation {
        let variant = entry.variant_label().to_string();
        obs::emit_attempt_started(&spec.id, attempt, &variant);

        let mut eval = ExperimentEvaluation::failed(&spec.id, String::new(), &variant, attempt);
        let outcome = ExperimentSpan::new(&spec.id, attempt)
            .run(self.run_cycle(spec, entry, &mut eval))
            .await;
        if let Err(e) = outcome {
            obs::emit_attempt_aborted(&spec.id, attempt, &e);
            eval.status = EvaluationStatus::Fail;
            eval.notes = e.to_string();
        }

        let record = RunRecord::from_evaluation(&eval, Utc::now());
        match self.sink.persist(&record).await {
            Ok(path) => eval.record_path = Some(path),
            Err(e) => warn!(experiment_id = %spec.id, error = %e, "failed to persist run record"),
        }

        obs::emit_verdict(&spec.id, attempt, eval.status, &eval.notes);
        eval
    }

    async fn run_cycle(
        &self,
        spec: &ExperimentSpec,
        entry: &SubmissionEntry,
        eval: &mut ExperimentEvaluation,
    ) -> Result<()> {
        let mut state = AttemptState::Pending;

        let workspace = Workspace::create(spec, &self.settings)?;
        eval.workspace = Some(workspace.root().to_path_buf());

        // files are validated and written before commands are looked at
        let files = entry.files()?;
        eval.files_written = workspace.apply_submission(&files)?;
        state = state.next();
        debug!(state = %state, files = eval.files_written.len());

        let commands = entry.commands()?;
        eval.command_results = self
            .runner
            .run_all(&spec.id, &workspace, &commands, &spec.commands)
            .await;
        state = state.next();
        debug!(state = %state, commands = eval.command_results.len());

        eval.artifact_results = spec
            .artifact_expectations()
            .map(|expectation| {
                let result = check_artifact(&workspace, expectation);
                obs::emit_artifact_checked(&spec.id, &result.path, result.success);
                result
            })
            .collect();
        state = state.next();
        debug!(state = %state, artifacts = eval.artifact_results.len());

        eval.reviews = self.reviewer.review(workspace.root(), &spec.review_targets);
        eval.score = self
            .scorer
            .score(ScoreInput {
                spec,
                commands: &eval.command_results,
                artifacts: &eval.artifact_results,
                reviews: &eval.reviews,
            })
            .await;

        let verdict = ReproGate::evaluate(&eval.command_results, &eval.artifact_results);
        state = state.conclude(verdict.status);
        debug!(state = %state, violations = ?verdict.violations);

        eval.status = verdict.status;
        eval.notes = verdict.message;
        Ok(())
    }
}
