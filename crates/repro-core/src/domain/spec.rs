//! Experiment specifications and their expectations.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::error::{ReproError, Result};
use crate::workspace::{list_files, normalize_relative};

const PREVIEW_MAX_CHARS: usize = 600;
const README_FALLBACK: &str = "README not available for this experiment.";

/// How an artifact on disk is compared against its expected value.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    /// Parse the file as JSON and compare structurally.
    Json,

    /// Compare whitespace-trimmed file content for exact equality.
    Text,
}

/// An artifact an experiment is expected to produce.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ArtifactExpectation {
    /// Path relative to the workspace root.
    pub path: String,

    /// Comparison mode.
    pub kind: ArtifactKind,

    /// Expected value tree (or text for [`ArtifactKind::Text`]).
    pub expected: Value,

    /// Combined absolute and relative numeric tolerance. `None` means exact.
    #[serde(default)]
    pub tolerance: Option<f64>,
}

impl ArtifactExpectation {
    /// Expect a JSON artifact at `path`.
    pub fn json(path: impl Into<String>, expected: Value) -> Self {
        Self {
            path: path.into(),
            kind: ArtifactKind::Json,
            expected,
            tolerance: None,
        }
    }

    /// Expect a text artifact at `path`.
    pub fn text(path: impl Into<String>, expected: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            kind: ArtifactKind::Text,
            expected: Value::String(expected.into()),
            tolerance: None,
        }
    }

    /// Set the numeric tolerance.
    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = Some(tolerance);
        self
    }

    /// Effective tolerance (0 when unset).
    pub fn effective_tolerance(&self) -> f64 {
        self.tolerance.unwrap_or(0.0)
    }
}

/// Expectations for one submitted command.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct CommandExpectation {
    /// Human-readable description of what the command should do.
    pub description: String,

    /// Substrings that must all appear in stdout.
    #[serde(default)]
    pub expected_stdout: Vec<String>,

    /// Artifacts produced by this command.
    #[serde(default)]
    pub artifacts: Vec<ArtifactExpectation>,
}

impl CommandExpectation {
    /// Create an expectation with a description and no checks.
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            ..Self::default()
        }
    }

    /// Require a stdout substring.
    pub fn expect_stdout(mut self, snippet: impl Into<String>) -> Self {
        self.expected_stdout.push(snippet.into());
        self
    }

    /// Attach an artifact expectation.
    pub fn with_artifact(mut self, artifact: ArtifactExpectation) -> Self {
        self.artifacts.push(artifact);
        self
    }
}

/// Immutable description of one reproduction task.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExperimentSpec {
    pub id: String,
    pub title: String,
    pub summary: String,

    /// Extra instructions passed along with the contract.
    #[serde(default)]
    pub request_notes: String,

    /// Hint for the external scorer about which metric matters.
    #[serde(default)]
    pub score_guidance: String,

    /// Directory copied into every fresh workspace.
    pub workspace_template: PathBuf,

    /// Extra search paths injected into the command environment.
    #[serde(default)]
    pub dependencies: Vec<PathBuf>,

    /// Ordered command expectations.
    #[serde(default)]
    pub commands: Vec<CommandExpectation>,

    /// Relative paths handed to the reviewer.
    #[serde(default)]
    pub review_targets: Vec<String>,
}

impl ExperimentSpec {
    /// Create a spec with an identity and template directory.
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        workspace_template: impl Into<PathBuf>,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            summary: String::new(),
            request_notes: String::new(),
            score_guidance: String::new(),
            workspace_template: workspace_template.into(),
            dependencies: Vec::new(),
            commands: Vec::new(),
            review_targets: Vec::new(),
        }
    }

    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = summary.into();
        self
    }

    pub fn with_request_notes(mut self, notes: impl Into<String>) -> Self {
        self.request_notes = notes.into();
        self
    }

    pub fn with_score_guidance(mut self, guidance: impl Into<String>) -> Self {
        self.score_guidance = guidance.into();
        self
    }

    pub fn with_dependency(mut self, path: impl Into<PathBuf>) -> Self {
        self.dependencies.push(path.into());
        self
    }

    pub fn with_command(mut self, expectation: CommandExpectation) -> Self {
        self.commands.push(expectation);
        self
    }

    pub fn with_review_target(mut self, path: impl Into<String>) -> Self {
        self.review_targets.push(path.into());
        self
    }

    /// All artifact expectations across every command, in declaration order.
    pub fn artifact_expectations(&self) -> impl Iterator<Item = &ArtifactExpectation> {
        self.commands.iter().flat_map(|cmd| cmd.artifacts.iter())
    }

    /// Check structural invariants: non-empty id, relative in-workspace
    /// artifact paths, non-negative tolerances.
    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(self.invalid("id cannot be empty"));
        }
        for artifact in self.artifact_expectations() {
            if normalize_relative(&artifact.path).is_none() {
                return Err(self.invalid(format!(
                    "artifact path must stay inside the workspace: {}",
                    artifact.path
                )));
            }
            if let Some(tol) = artifact.tolerance {
                if !tol.is_finite() || tol < 0.0 {
                    return Err(self.invalid(format!(
                        "tolerance for {} must be a non-negative number",
                        artifact.path
                    )));
                }
            }
        }
        Ok(())
    }

    fn invalid(&self, reason: impl Into<String>) -> ReproError {
        ReproError::InvalidSpec {
            id: self.id.clone(),
            reason: reason.into(),
        }
    }

    /// Template README, trimmed, or a fixed fallback.
    pub fn readme(&self) -> String {
        std::fs::read_to_string(self.workspace_template.join("README.md"))
            .map(|text| text.trim().to_string())
            .unwrap_or_else(|_| README_FALLBACK.to_string())
    }

    /// Sorted relative file list of the template.
    pub fn repo_manifest(&self) -> Vec<String> {
        list_files(&self.workspace_template)
            .map(|files| {
                files
                    .iter()
                    .map(|rel| rel_to_string(rel))
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default()
    }

    /// Payload describing the task to the submitting agent.
    pub fn contract_payload(&self) -> Value {
        let previews: Vec<Value> = self
            .review_targets
            .iter()
            .filter_map(|target| {
                let content = std::fs::read_to_string(self.workspace_template.join(target)).ok()?;
                Some(json!({
                    "path": target,
                    "preview": preview(&content, PREVIEW_MAX_CHARS),
                }))
            })
            .collect();

        let expected_artifacts: Vec<&ArtifactExpectation> = self.artifact_expectations().collect();

        json!({
            "id": self.id,
            "title": self.title,
            "summary": self.summary,
            "notes": self.request_notes,
            "readme": self.readme(),
            "manifest": self.repo_manifest(),
            "file_previews": previews,
            "score_guidance": self.score_guidance,
            "expected_artifacts": expected_artifacts,
        })
    }
}

fn rel_to_string(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

/// Truncate to `max_chars` characters, ending in `...` when cut.
pub(crate) fn preview(content: &str, max_chars: usize) -> String {
    if content.chars().count() <= max_chars {
        return content.to_string();
    }
    let cut: String = content.chars().take(max_chars.saturating_sub(3)).collect();
    format!("{cut}...")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample_spec(template: &Path) -> ExperimentSpec {
        ExperimentSpec::new("linear_regression", "Linear Regression Recovery", template)
            .with_summary("Fit a noisy linear model")
            .with_score_guidance("Prioritize RMSE")
            .with_review_target("run_experiment.py")
            .with_command(
                CommandExpectation::new("Fit the model")
                    .expect_stdout("Slope:")
                    .with_artifact(
                        ArtifactExpectation::json("artifacts/metrics.json", json!({"rmse": 0.5}))
                            .with_tolerance(0.02),
                    ),
            )
    }

    #[test]
    fn test_validate_accepts_relative_artifacts() {
        let spec = sample_spec(Path::new("/tmp/template"));
        assert!(spec.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_escaping_artifact_path() {
        let spec = ExperimentSpec::new("x", "X", "/tmp/t").with_command(
            CommandExpectation::new("escape")
                .with_artifact(ArtifactExpectation::json("../outside.json", json!({}))),
        );
        let err = spec.validate().unwrap_err();
        assert!(matches!(err, ReproError::InvalidSpec { .. }));
    }

    #[test]
    fn test_validate_rejects_negative_tolerance() {
        let spec = ExperimentSpec::new("x", "X", "/tmp/t").with_command(
            CommandExpectation::new("neg").with_artifact(
                ArtifactExpectation::json("out.json", json!(1)).with_tolerance(-0.1),
            ),
        );
        assert!(spec.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_empty_id() {
        let spec = ExperimentSpec::new("  ", "X", "/tmp/t");
        assert!(spec.validate().is_err());
    }

    #[test]
    fn test_readme_fallback_when_missing() {
        let dir = tempdir().unwrap();
        let spec = sample_spec(dir.path());
        assert_eq!(spec.readme(), README_FALLBACK);
    }

    #[test]
    fn test_contract_payload_fields() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("README.md"), "  # Linear\n\n").unwrap();
        std::fs::create_dir_all(dir.path().join("data")).unwrap();
        std::fs::write(dir.path().join("data/points.csv"), "x,y\n1,2\n").unwrap();
        std::fs::write(dir.path().join("run_experiment.py"), "print('hi')\n").unwrap();

        let payload = sample_spec(dir.path()).contract_payload();
        assert_eq!(payload["id"], "linear_regression");
        assert_eq!(payload["readme"], "# Linear");
        assert_eq!(
            payload["manifest"],
            json!(["README.md", "data/points.csv", "run_experiment.py"])
        );
        assert_eq!(payload["file_previews"][0]["path"], "run_experiment.py");
        assert_eq!(payload["expected_artifacts"][0]["path"], "artifacts/metrics.json");
        assert_eq!(payload["expected_artifacts"][0]["kind"], "json");
        assert_eq!(payload["score_guidance"], "Prioritize RMSE");
    }

    #[test]
    fn test_preview_truncates_long_content() {
        let long = "a".repeat(700);
        let cut = preview(&long, 600);
        assert_eq!(cut.chars().count(), 600);
        assert!(cut.ends_with("..."));
        assert_eq!(preview("short", 600), "short");
    }

    #[test]
    fn test_artifact_expectations_flatten_in_order() {
        let spec = ExperimentSpec::new("x", "X", "/tmp/t")
            .with_command(
                CommandExpectation::new("a")
                    .with_artifact(ArtifactExpectation::json("a.json", json!({}))),
            )
            .with_command(
                CommandExpectation::new("b").with_artifact(ArtifactExpectation::text("b.txt", "ok")),
            );
        let paths: Vec<&str> = spec.artifact_expectations().map(|a| a.path.as_str()).collect();
        assert_eq!(paths, vec!["a.json", "b.txt"]);
    }
}
