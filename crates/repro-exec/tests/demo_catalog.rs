//! Runs the bundled `demos/` catalog end to end.

use std::path::PathBuf;
use std::sync::Arc;

use repro_core::{ExperimentRegistry, MemoryRecordSink};
use repro_exec::{EvaluationPlan, Evaluator, EvaluatorConfig, LocalSolutionSource};
use tempfile::tempdir;

fn demos_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../demos")
}

fn evaluator(runs: &std::path::Path) -> Evaluator {
    let registry =
        ExperimentRegistry::from_manifest(&demos_dir().join("experiments.toml")).unwrap();
    Evaluator::new(
        Arc::new(registry),
        &EvaluatorConfig::new(runs.join("runs"), runs.join("logs")),
    )
    .with_record_sink(Arc::new(MemoryRecordSink::new()))
}

#[tokio::test]
async fn good_variant_passes_first_time() {
    let dir = tempdir().unwrap();
    let evaluator = evaluator(dir.path());
    let plan = EvaluationPlan::new(evaluator.registry(), Vec::new(), Some("good".into())).unwrap();
    let transport = LocalSolutionSource::new(demos_dir().join("solutions"));

    let report = evaluator.run_plan(&plan, &transport).await.unwrap();
    let result = &report.results[0];
    assert!(report.success(), "{}", result.notes);
    assert_eq!(result.attempt, 1);
    assert_eq!(result.variant, "good");
}

#[tokio::test]
async fn bad_variant_is_corrected() {
    let dir = tempdir().unwrap();
    let evaluator = evaluator(dir.path());
    let plan = EvaluationPlan::new(
        evaluator.registry(),
        vec!["toy_mean".to_string()],
        Some("bad".into()),
    )
    .unwrap();
    let transport = LocalSolutionSource::new(demos_dir().join("solutions"));

    let report = evaluator.run_plan(&plan, &transport).await.unwrap();
    let result = &report.results[0];
    assert!(result.passed(), "{}", result.notes);
    assert_eq!(result.attempt, 2);
    assert!(result.notes.ends_with("(after correction)"));
}
