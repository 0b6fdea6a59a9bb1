//! Submission transport: how the orchestrator asks for (corrected)
//! submissions, plus a catalog-backed implementation.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::SeedableRng;
use repro_core::variant::{choose_variant, VariantStrategy, DEFAULT_VARIANT, PREFERRED_VARIANT};
use repro_core::{
    ExperimentRegistry, ExperimentSpec, ReproError, Result, Submission, SubmissionEntry,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::correction::CORRECTION_VARIANT;
use crate::plan::EvaluationPlan;

pub const OBJECTIVE: &str = "Reproduce the experiments as if they were public research \
repositories. Fill in the missing code, resolve dependencies, and describe how to run the \
experiments. Return JSON describing the files you created and the commands to execute.";

/// Submission file name inside a solution variant directory.
pub const SUBMISSION_FILE: &str = "submission.json";

/// One experiment inside a submission request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentRequest {
    pub id: String,
    pub contract: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feedback: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionRequest {
    pub objective: String,
    pub experiments: Vec<ExperimentRequest>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub solution_variant: Option<String>,
}

impl SubmissionRequest {
    /// Initial request covering every experiment in the plan.
    pub fn initial(registry: &ExperimentRegistry, plan: &EvaluationPlan) -> Result<Self> {
        let experiments = plan
            .experiments
            .iter()
            .map(|id| {
                let spec = registry.get(id)?;
                Ok(ExperimentRequest {
                    id: spec.id.clone(),
                    contract: spec.contract_payload(),
                    variant: None,
                    feedback: None,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            objective: OBJECTIVE.to_string(),
            experiments,
            solution_variant: plan.solution_variant.clone(),
        })
    }

    /// Correction request for one experiment, carrying the brief.
    pub fn correction(spec: &ExperimentSpec, brief: String) -> Self {
        Self {
            objective: OBJECTIVE.to_string(),
            experiments: vec![ExperimentRequest {
                id: spec.id.clone(),
                contract: spec.contract_payload(),
                variant: Some(CORRECTION_VARIANT.to_string()),
                feedback: Some(brief),
            }],
            solution_variant: Some(CORRECTION_VARIANT.to_string()),
        }
    }

    pub fn is_correction(&self) -> bool {
        self.experiments.iter().any(|e| e.feedback.is_some())
    }
}

/// Channel to whoever produces submissions.
#[async_trait]
pub trait SubmissionTransport: Send + Sync {
    /// Returns a submission; experiments it cannot serve are simply absent.
    async fn request(&self, request: &SubmissionRequest) -> Result<Submission>;
}

// ---------------------------------------------------------------------------
// LocalSolutionSource
// ---------------------------------------------------------------------------

/// Canned submissions read from `<root>/<id>/solution/<variant>/submission.json`.
///
/// A solution folder without variant subdirectories is a single variant
/// named `default`. File entries carrying a `source` field have their
/// content inlined from that file, relative to the variant directory.
pub struct LocalSolutionSource {
    root: PathBuf,
    default_variant: String,
    strategies: Vec<VariantStrategy>,
    rng: Mutex<StdRng>,
}

impl LocalSolutionSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            default_variant: PREFERRED_VARIANT.to_string(),
            strategies: VariantStrategy::default_chain(),
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Variant used when neither the experiment nor the request names one.
    pub fn with_default_variant(mut self, variant: impl Into<String>) -> Self {
        self.default_variant = variant.into();
        self
    }

    pub fn with_strategies(mut self, strategies: Vec<VariantStrategy>) -> Self {
        self.strategies = strategies;
        self
    }

    /// Deterministic random picks.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = Mutex::new(StdRng::seed_from_u64(seed));
        self
    }

    /// Every variant available for `id`, keyed by label.
    pub fn variants(&self, id: &str) -> Result<BTreeMap<String, SubmissionEntry>> {
        let base = self.root.join(id).join("solution");
        if !base.is_dir() {
            return Err(ReproError::Transport(format!("no solution folder for {id}")));
        }

        let mut dirs = Vec::new();
        for entry in std::fs::read_dir(&base)? {
            let path = entry?.path();
            if path.is_dir() {
                dirs.push(path);
            }
        }
        dirs.sort();

        let mut variants = BTreeMap::new();
        if dirs.is_empty() {
            variants.insert(DEFAULT_VARIANT.to_string(), load_entry(id, &base)?);
            return Ok(variants);
        }
        for dir in dirs {
            let label = dir
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            variants.insert(label, load_entry(id, &dir)?);
        }
        Ok(variants)
    }

    /// A missing or unreadable catalog entry only drops this experiment from
    /// the submission; the rest of the request is still answered.
    fn select(&self, id: &str, requested: &str) -> Result<Option<SubmissionEntry>> {
        let mut catalog = match self.variants(id) {
            Ok(catalog) => catalog,
            Err(ReproError::Transport(reason)) => {
                warn!(experiment_id = %id, reason = %reason, "no canned solution");
                return Ok(None);
            }
            Err(e) => {
                warn!(experiment_id = %id, error = %e, "canned solution could not be loaded");
                return Ok(None);
            }
        };
        let labels: Vec<String> = catalog.keys().cloned().collect();
        let chosen = {
            let mut rng = self
                .rng
                .lock()
                .map_err(|_| ReproError::Transport("variant rng lock poisoned".to_string()))?;
            choose_variant(Some(requested), &labels, &self.strategies, &mut *rng)
                .map(str::to_string)
        };
        Ok(chosen.and_then(|label| {
            debug!(experiment_id = %id, requested = %requested, chosen = %label, "variant selected");
            catalog
                .remove(&label)
                .map(|entry| entry.with_variant(label))
        }))
    }
}

fn load_entry(id: &str, dir: &Path) -> Result<SubmissionEntry> {
    let path = dir.join(SUBMISSION_FILE);
    let text = std::fs::read_to_string(&path)?;
    let mut payload: Value = serde_json::from_str(&text)?;

    if let Some(files) = payload.get_mut("files").and_then(Value::as_array_mut) {
        for file in files.iter_mut() {
            let Some(source) = file.get("source").and_then(Value::as_str) else {
                continue;
            };
            let content = std::fs::read_to_string(dir.join(source))?;
            let target = file.get("path").cloned().unwrap_or(Value::Null);
            *file = serde_json::json!({ "path": target, "content": content });
        }
    }

    let obj = payload.as_object_mut().ok_or_else(|| {
        ReproError::MalformedSubmission(format!("{} is not a JSON object", path.display()))
    })?;
    obj.insert("id".to_string(), Value::String(id.to_string()));
    obj.remove("variant");
    Ok(serde_json::from_value(payload)?)
}

#[async_trait]
impl SubmissionTransport for LocalSolutionSource {
    async fn request(&self, request: &SubmissionRequest) -> Result<Submission> {
        let mut entries = Vec::with_capacity(request.experiments.len());
        for exp in &request.experiments {
            let requested = exp
                .variant
                .as_deref()
                .or(request.solution_variant.as_deref())
                .unwrap_or(&self.default_variant);
            if let Some(entry) = self.select(&exp.id, requested)? {
                entries.push(entry);
            }
        }
        Ok(Submission::new(entries))
    }
}
