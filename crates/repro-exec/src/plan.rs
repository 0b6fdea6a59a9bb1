//! Which experiments to evaluate, and with which solution variant.

use std::collections::HashSet;

use repro_core::{ExperimentRegistry, ReproError, Result};
use serde::{Deserialize, Serialize};

pub const EXPERIMENTS_ENV: &str = "EVALUATION_EXPERIMENTS";
pub const VARIANT_ENV: &str = "SOLUTION_VARIANT";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluationPlan {
    pub experiments: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub solution_variant: Option<String>,
}

impl EvaluationPlan {
    /// Build a plan, validating every id against the registry.
    ///
    /// An empty `experiments` list selects the whole registry. A plan that
    /// still ends up empty is an error.
    pub fn new(
        registry: &ExperimentRegistry,
        experiments: Vec<String>,
        solution_variant: Option<String>,
    ) -> Result<Self> {
        let experiments: Vec<String> = if experiments.is_empty() {
            registry.ids().into_iter().map(str::to_string).collect()
        } else {
            // repeated ids collapse to their first occurrence
            let mut seen = HashSet::new();
            experiments
                .into_iter()
                .filter(|id| seen.insert(id.clone()))
                .collect()
        };
        if experiments.is_empty() {
            return Err(ReproError::InvalidSpec {
                id: "<plan>".to_string(),
                reason: "no experiments are registered".to_string(),
            });
        }
        for id in &experiments {
            registry.get(id)?;
        }
        let solution_variant = solution_variant
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty());
        Ok(Self {
            experiments,
            solution_variant,
        })
    }

    /// Plan from `EVALUATION_EXPERIMENTS` (comma separated) and
    /// `SOLUTION_VARIANT`, falling back to the whole registry.
    pub fn from_env(registry: &ExperimentRegistry) -> Result<Self> {
        let experiments = std::env::var(EXPERIMENTS_ENV)
            .map(|raw| split_list(&raw))
            .unwrap_or_default();
        Self::new(registry, experiments, std::env::var(VARIANT_ENV).ok())
    }
}

/// Split a comma separated list, dropping blanks.
pub fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
