//! Correction briefs and the bounded correction policy.

use repro_core::ExperimentEvaluation;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Variant requested for corrected submissions.
pub const CORRECTION_VARIANT: &str = "good";

/// How many attempts an experiment may consume, including the first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorrectionPolicy {
    pub max_attempts: u32,
}

impl Default for CorrectionPolicy {
    fn default() -> Self {
        Self { max_attempts: 2 }
    }
}

impl CorrectionPolicy {
    /// A policy that never requests corrections.
    pub fn disabled() -> Self {
        Self { max_attempts: 1 }
    }

    /// Whether a failed `attempt` may be followed by another one.
    pub fn allows_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}

/// Deterministic, human-readable list of what went wrong in `eval`.
pub fn build_brief(eval: &ExperimentEvaluation) -> String {
    let mut lines = vec![
        format!("Experiment `{}` requires a corrected submission.", eval.id),
        "Key issues detected:".to_string(),
    ];

    if eval.command_results.is_empty() && eval.artifact_results.is_empty() {
        lines.push(format!("- Attempt aborted: {}.", eval.notes));
    }

    for cmd in &eval.command_results {
        if cmd.exit_code != 0 {
            lines.push(format!(
                "- Command `{}` exited with {}.",
                cmd.command_line(),
                cmd.exit_code
            ));
        }
        for snippet in cmd.missing_snippets() {
            lines.push(format!("- Expected stdout snippet missing: `{snippet}`."));
        }
    }

    for artifact in eval.artifact_results.iter().filter(|a| !a.success) {
        lines.push(format!(
            "- Artifact {} mismatch: {}.",
            artifact.path, artifact.details
        ));
    }

    if eval.score.get("verdict").and_then(Value::as_str) == Some("fail") {
        let analysis = eval
            .score
            .get("analysis")
            .and_then(Value::as_str)
            .unwrap_or("scorer flagged failure");
        lines.push(format!("- Metric verdict: {analysis}."));
    }

    if !eval.reviews.is_empty() {
        lines.push("Code review notes:".to_string());
        for review in &eval.reviews {
            lines.push(format!("  • {}: {}", review.path, review.summary));
        }
    }

    lines.push("Please address these issues and resubmit a corrected implementation.".to_string());
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use repro_core::domain::{ArtifactResult, CommandCheck, CommandResult};
    use repro_core::ReviewNote;
    use serde_json::json;
    use std::path::PathBuf;

    #[test]
    fn test_policy_bound() {
        let policy = CorrectionPolicy::default();
        assert!(policy.allows_retry(1));
        assert!(!policy.allows_retry(2));
        assert!(!CorrectionPolicy::disabled().allows_retry(1));
    }

    #[test]
    fn test_brief_lists_every_issue_in_order() {
        let mut eval = ExperimentEvaluation::failed("toy_mean", "x", "bad", 1);
        eval.command_results = vec![CommandResult {
            command: vec!["python".into(), "run.py".into()],
            exit_code: 1,
            stdout: String::new(),
            stderr: "Traceback".into(),
            duration_ms: 3,
            checks: vec![CommandCheck::StdoutContains {
                snippet: "Mean:".into(),
                passed: false,
            }],
        }];
        eval.artifact_results = vec![
            ArtifactResult {
                path: "out.json".into(),
                success: false,
                details: "mean expected 10 ±0.1, got 12".into(),
                actual_path: PathBuf::from("out.json"),
            },
            ArtifactResult {
                path: "ok.json".into(),
                success: true,
                details: "Match".into(),
                actual_path: PathBuf::from("ok.json"),
            },
        ];
        eval.score = json!({"verdict": "fail", "analysis": "mean is off"});
        eval.reviews = vec![ReviewNote {
            path: "run.py".into(),
            heuristics: json!({}),
            summary: "No comments found.".into(),
            feedback: String::new(),
        }];

        let brief = build_brief(&eval);
        let expected = "\
Experiment `toy_mean` requires a corrected submission.
Key issues detected:
- Command `python run.py` exited with 1.
- Expected stdout snippet missing: `Mean:`.
- Artifact out.json mismatch: mean expected 10 ±0.1, got 12.
- Metric verdict: mean is off.
Code review notes:
  • run.py: No comments found.
Please address these issues and resubmit a corrected implementation.";
        assert_eq!(brief, expected);
        assert_eq!(build_brief(&eval), brief);
    }

    #[test]
    fn test_brief_for_missing_submission() {
        let eval = ExperimentEvaluation::submission_missing("crop_yield", 1);
        let brief = build_brief(&eval);
        assert!(brief.contains("- Attempt aborted: submission missing."));
        assert!(brief.ends_with("resubmit a corrected implementation."));
    }

    #[test]
    fn test_error_verdict_is_not_cited() {
        let mut eval = ExperimentEvaluation::failed("x", "n", "v", 1);
        eval.score = json!({"verdict": "error", "analysis": "no key"});
        assert!(!build_brief(&eval).contains("Metric verdict"));
    }
}
