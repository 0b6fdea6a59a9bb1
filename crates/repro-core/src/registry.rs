//! Experiment registry and manifest loading.
//!
//! The registry is built once at startup and shared read-only (typically
//! behind an `Arc`) by the orchestrator and transport adapters.
//!
//! Manifest format (`experiments.toml`), paths relative to the manifest:
//!
//! ```toml
//! [[experiment]]
//! id = "linear_regression"
//! title = "Linear Regression Recovery"
//! template = "experiments/linear_regression/workspace"
//! dependencies = ["shared_libs/repro_utils"]
//! review_targets = ["run_experiment.py"]
//!
//! [[experiment.command]]
//! description = "Fit the linear model and emit metrics"
//! expected_stdout = ["Slope:", "RMSE:"]
//!
//! [[experiment.command.artifact]]
//! path = "artifacts/metrics.json"
//! kind = "json"
//! expected_file = "experiments/linear_regression/expected/metrics.json"
//! tolerance = 0.02
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_json::Value;
use tracing::info;

use crate::domain::{
    ArtifactExpectation, ArtifactKind, CommandExpectation, ExperimentSpec, ReproError, Result,
};

/// Immutable catalog of experiment specifications.
#[derive(Debug, Clone, Default)]
pub struct ExperimentRegistry {
    specs: Vec<ExperimentSpec>,
    index: HashMap<String, usize>,
}

impl ExperimentRegistry {
    /// Build a registry, validating every spec and rejecting duplicate ids.
    pub fn new(specs: Vec<ExperimentSpec>) -> Result<Self> {
        let mut index = HashMap::with_capacity(specs.len());
        for (pos, spec) in specs.iter().enumerate() {
            spec.validate()?;
            if index.insert(spec.id.clone(), pos).is_some() {
                return Err(ReproError::InvalidSpec {
                    id: spec.id.clone(),
                    reason: "duplicate experiment id".to_string(),
                });
            }
        }
        Ok(Self { specs, index })
    }

    /// Load a registry from an `experiments.toml` manifest.
    pub fn from_manifest(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let base = path.parent().unwrap_or_else(|| Path::new("."));
        let registry = Self::from_manifest_str(&text, base)?;
        info!(manifest = %path.display(), experiments = registry.len(), "registry loaded");
        Ok(registry)
    }

    /// Parse manifest text, resolving relative paths against `base`.
    pub fn from_manifest_str(text: &str, base: &Path) -> Result<Self> {
        let manifest: Manifest = toml::from_str(text)?;
        let specs = manifest
            .experiment
            .into_iter()
            .map(|entry| entry.into_spec(base))
            .collect::<Result<Vec<_>>>()?;
        Self::new(specs)
    }

    /// Look up a spec by id.
    pub fn get(&self, id: &str) -> Result<&ExperimentSpec> {
        self.index
            .get(id)
            .map(|&pos| &self.specs[pos])
            .ok_or_else(|| ReproError::UnknownExperiment(id.to_string()))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    /// Experiment ids in registration order.
    pub fn ids(&self) -> Vec<&str> {
        self.specs.iter().map(|s| s.id.as_str()).collect()
    }

    pub fn specs(&self) -> &[ExperimentSpec] {
        &self.specs
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Manifest schema
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct Manifest {
    #[serde(default)]
    experiment: Vec<ManifestExperiment>,
}

#[derive(Debug, Deserialize)]
struct ManifestExperiment {
    id: String,
    title: String,
    #[serde(default)]
    summary: String,
    #[serde(default)]
    notes: String,
    #[serde(default)]
    score_guidance: String,
    template: PathBuf,
    #[serde(default)]
    dependencies: Vec<PathBuf>,
    #[serde(default)]
    review_targets: Vec<String>,
    #[serde(default)]
    command: Vec<ManifestCommand>,
}

#[derive(Debug, Deserialize)]
struct ManifestCommand {
    description: String,
    #[serde(default)]
    expected_stdout: Vec<String>,
    #[serde(default)]
    artifact: Vec<ManifestArtifact>,
}

#[derive(Debug, Deserialize)]
struct ManifestArtifact {
    path: String,
    kind: ArtifactKind,
    #[serde(default)]
    expected: Option<Value>,
    #[serde(default)]
    expected_file: Option<PathBuf>,
    #[serde(default)]
    tolerance: Option<f64>,
}

impl ManifestExperiment {
    fn into_spec(self, base: &Path) -> Result<ExperimentSpec> {
        let id = self.id;
        let commands = self
            .command
            .into_iter()
            .map(|cmd| {
                let artifacts = cmd
                    .artifact
                    .into_iter()
                    .map(|a| a.into_expectation(&id, base))
                    .collect::<Result<Vec<_>>>()?;
                Ok(CommandExpectation {
                    description: cmd.description,
                    expected_stdout: cmd.expected_stdout,
                    artifacts,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(ExperimentSpec {
            title: self.title,
            summary: self.summary,
            request_notes: self.notes,
            score_guidance: self.score_guidance,
            workspace_template: base.join(self.template),
            dependencies: self.dependencies.into_iter().map(|d| base.join(d)).collect(),
            commands,
            review_targets: self.review_targets,
            id,
        })
    }
}

impl ManifestArtifact {
    fn into_expectation(self, id: &str, base: &Path) -> Result<ArtifactExpectation> {
        let expected = match (self.expected, self.expected_file) {
            (Some(value), None) => value,
            (None, Some(file)) => load_expected(&base.join(file), self.kind)?,
            _ => {
                return Err(ReproError::InvalidSpec {
                    id: id.to_string(),
                    reason: format!(
                        "artifact {} needs exactly one of `expected` or `expected_file`",
                        self.path
                    ),
                })
            }
        };
        Ok(ArtifactExpectation {
            path: self.path,
            kind: self.kind,
            expected,
            tolerance: self.tolerance,
        })
    }
}

fn load_expected(path: &Path, kind: ArtifactKind) -> Result<Value> {
    let text = std::fs::read_to_string(path)?;
    match kind {
        ArtifactKind::Json => Ok(serde_json::from_str(&text)?),
        ArtifactKind::Text => Ok(Value::String(text)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    const MANIFEST: &str = r#"
[[experiment]]
id = "linear_regression"
title = "Linear Regression Recovery"
summary = "Fit a noisy linear model"
template = "linear/workspace"
dependencies = ["shared"]
review_targets = ["run_experiment.py"]

[[experiment.command]]
description = "Fit the linear model"
expected_stdout = ["Slope:", "RMSE:"]

[[experiment.command.artifact]]
path = "artifacts/metrics.json"
kind = "json"
expected_file = "linear/expected/metrics.json"
tolerance = 0.02

[[experiment]]
id = "climate_summary"
title = "Regional Climate Summary"
template = "climate/workspace"

[[experiment.command]]
description = "Summarize"

[[experiment.command.artifact]]
path = "artifacts/summary.txt"
kind = "text"
expected = "Stations processed: 4"
"#;

    #[test]
    fn test_from_manifest_resolves_paths_and_expected_files() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("linear/expected")).unwrap();
        std::fs::write(
            dir.path().join("linear/expected/metrics.json"),
            r#"{"slope": 2.0, "rmse": 0.1}"#,
        )
        .unwrap();
        let manifest = dir.path().join("experiments.toml");
        std::fs::write(&manifest, MANIFEST).unwrap();

        let registry = ExperimentRegistry::from_manifest(&manifest).unwrap();
        assert_eq!(registry.ids(), vec!["linear_regression", "climate_summary"]);

        let linear = registry.get("linear_regression").unwrap();
        assert_eq!(linear.workspace_template, dir.path().join("linear/workspace"));
        assert_eq!(linear.dependencies, vec![dir.path().join("shared")]);
        assert_eq!(linear.commands[0].expected_stdout, vec!["Slope:", "RMSE:"]);
        let artifact = &linear.commands[0].artifacts[0];
        assert_eq!(artifact.expected, json!({"slope": 2.0, "rmse": 0.1}));
        assert_eq!(artifact.tolerance, Some(0.02));

        let climate = registry.get("climate_summary").unwrap();
        assert_eq!(climate.commands[0].artifacts[0].kind, ArtifactKind::Text);
    }

    #[test]
    fn test_unknown_experiment() {
        let registry = ExperimentRegistry::default();
        assert!(matches!(
            registry.get("nope").unwrap_err(),
            ReproError::UnknownExperiment(_)
        ));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let specs = vec![
            ExperimentSpec::new("a", "A", "/tmp/a"),
            ExperimentSpec::new("a", "A again", "/tmp/a"),
        ];
        let err = ExperimentRegistry::new(specs).unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn test_artifact_needs_exactly_one_expected_source() {
        let text = r#"
[[experiment]]
id = "x"
title = "X"
template = "t"

[[experiment.command]]
description = "d"

[[experiment.command.artifact]]
path = "out.json"
kind = "json"
"#;
        let err = ExperimentRegistry::from_manifest_str(text, Path::new(".")).unwrap_err();
        assert!(matches!(err, ReproError::InvalidSpec { .. }));
    }

    #[test]
    fn test_invalid_toml_is_manifest_error() {
        let err = ExperimentRegistry::from_manifest_str("[[experiment]\n", Path::new("."))
            .unwrap_err();
        assert!(matches!(err, ReproError::Manifest(_)));
    }
}
