//! Human-readable reports.
//!
//! Two renderings:
//! - per-experiment report, printed after every attempt
//! - final batch report (`=== Reproduction Audit Complete ===`)

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::ExperimentEvaluation;

const STDOUT_PREVIEW_WIDTH: usize = 140;
const STDERR_PREVIEW_WIDTH: usize = 120;
const ANALYSIS_PREVIEW_WIDTH: usize = 240;
const FEEDBACK_PREVIEW_WIDTH: usize = 220;

/// Render the detailed report for one attempt.
pub fn render_experiment_report(eval: &ExperimentEvaluation) -> String {
    let workspace = eval
        .workspace
        .as_ref()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "n/a".to_string());

    let mut lines = vec![
        format!("Experiment: {}", eval.id),
        format!(
            "Status   : {} ({})",
            eval.status.to_string().to_uppercase(),
            eval.notes
        ),
        format!("Variant  : {}", eval.variant),
        format!("Attempt  : {}", eval.attempt),
        format!("Workspace: {workspace}"),
    ];

    if eval.files_written.is_empty() {
        lines.push("Files    : <none provided>".to_string());
    } else {
        lines.push("Files    :".to_string());
        lines.extend(eval.files_written.iter().map(|path| format!("  • {path}")));
    }

    if !eval.command_results.is_empty() {
        lines.push("Commands :".to_string());
        for cmd in &eval.command_results {
            lines.push(format!(
                "  • `{}` -> rc={} ({:.2}s)",
                cmd.command_line(),
                cmd.exit_code,
                cmd.duration_ms as f64 / 1000.0
            ));
            let stdout = shorten(&cmd.stdout, STDOUT_PREVIEW_WIDTH);
            if !stdout.is_empty() {
                lines.push(format!("      stdout: {stdout}"));
            }
            let stderr = shorten(&cmd.stderr, STDERR_PREVIEW_WIDTH);
            if !stderr.is_empty() {
                lines.push(format!("      stderr: {stderr}"));
            }
        }
    }

    if !eval.artifact_results.is_empty() {
        lines.push("Artifacts:".to_string());
        for artifact in &eval.artifact_results {
            let marker = if artifact.success { "ok" } else { "mismatch" };
            lines.push(format!("  • {}: {marker} ({})", artifact.path, artifact.details));
        }
    }

    if let Some(line) = score_line(&eval.score) {
        lines.push(line);
        if let Some(analysis) = eval.score.get("analysis").and_then(Value::as_str) {
            if !analysis.is_empty() {
                lines.push(format!("  analysis: {}", shorten(analysis, ANALYSIS_PREVIEW_WIDTH)));
            }
        }
        lines.extend(metrics_list(&eval.score).into_iter().map(|item| format!("    • {item}")));
    }

    if !eval.reviews.is_empty() {
        lines.push("Reviews  :".to_string());
        for review in &eval.reviews {
            lines.push(format!("  • {}: {}", review.path, review.summary));
            if !review.feedback.is_empty() {
                lines.push(format!(
                    "      feedback: {}",
                    shorten(&review.feedback, FEEDBACK_PREVIEW_WIDTH)
                ));
            }
        }
    }

    let record = eval
        .record_path
        .as_ref()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "n/a".to_string());
    lines.push(format!("Log file : {record}"));
    lines.join("\n")
}

fn score_line(score: &Value) -> Option<String> {
    let obj = score.as_object().filter(|o| !o.is_empty())?;
    let name = obj
        .get("metric_name")
        .and_then(Value::as_str)
        .unwrap_or("metric");
    let value = match obj.get("metric_value") {
        None | Some(Value::Null) => "n/a".to_string(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    };
    let verdict = obj.get("verdict").and_then(Value::as_str).unwrap_or("n/a");
    let conf = obj
        .get("confidence")
        .and_then(Value::as_f64)
        .map(|c| format!(", conf={c:.2}"))
        .unwrap_or_default();
    Some(format!("Score    : {name}={value} ({verdict}{conf})"))
}

fn metrics_list(score: &Value) -> Vec<String> {
    score
        .get("metrics_list")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .map(|i| i.as_str().map(str::to_string).unwrap_or_else(|| i.to_string()))
                .collect()
        })
        .unwrap_or_default()
}

/// Collapse whitespace and cut at a word boundary, appending ` [...]`.
pub fn shorten(text: &str, width: usize) -> String {
    const PLACEHOLDER: &str = " [...]";
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() <= width {
        return collapsed;
    }
    let budget = width.saturating_sub(PLACEHOLDER.len());
    let mut kept = String::new();
    for word in collapsed.split(' ') {
        let extra = if kept.is_empty() { 0 } else { 1 };
        if kept.chars().count() + extra + word.chars().count() > budget {
            break;
        }
        if extra == 1 {
            kept.push(' ');
        }
        kept.push_str(word);
    }
    if kept.is_empty() {
        return PLACEHOLDER.trim_start().to_string();
    }
    kept.push_str(PLACEHOLDER);
    kept
}

/// Final outcome of a batch run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BatchReport {
    pub results: Vec<ExperimentEvaluation>,
    pub elapsed: Duration,
}

impl BatchReport {
    pub fn new(results: Vec<ExperimentEvaluation>, elapsed: Duration) -> Self {
        Self { results, elapsed }
    }

    /// True when every requested experiment passed.
    pub fn success(&self) -> bool {
        self.results.iter().all(ExperimentEvaluation::passed)
    }

    pub fn render(&self) -> String {
        let mut lines = vec![
            "=== Reproduction Audit Complete ===".to_string(),
            format!("Elapsed: {:.2}s", self.elapsed.as_secs_f64()),
            String::new(),
            "Experiment Outcomes:".to_string(),
        ];
        for result in &self.results {
            let label = if result.passed() { "PASS" } else { "FAIL" };
            lines.push(format!("- {}: {label} ({})", result.id, result.notes));
            let items = metrics_list(&result.score);
            if !items.is_empty() {
                lines.push("    metrics:".to_string());
                lines.extend(items.into_iter().map(|item| format!("      - {item}")));
            }
        }
        lines.push(String::new());
        lines.push("Detailed logs are available at:".to_string());
        for result in &self.results {
            let path = result
                .record_path
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "n/a".to_string());
            lines.push(format!("  • {}: {path}", result.id));
        }
        lines.push(String::new());
        lines.join("\n")
    }
}
