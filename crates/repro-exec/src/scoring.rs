//! Scoring hook.
//!
//! A scorer sees everything an attempt produced and returns an opaque JSON
//! object. The conventional keys are `metric_name`, `metric_value`,
//! `verdict` (`pass`, `fail` or `error`), `analysis`, `confidence` and an
//! optional `metrics_list`. Scores never change the verdict; a `fail`
//! verdict is quoted in correction briefs.

use async_trait::async_trait;
use repro_core::domain::{ArtifactResult, CommandResult};
use repro_core::{ExperimentSpec, ReviewNote};
use serde_json::{json, Value};

/// Everything a scorer may look at.
#[derive(Debug, Clone, Copy)]
pub struct ScoreInput<'a> {
    pub spec: &'a ExperimentSpec,
    pub commands: &'a [CommandResult],
    pub artifacts: &'a [ArtifactResult],
    pub reviews: &'a [ReviewNote],
}

#[async_trait]
pub trait Scorer: Send + Sync {
    async fn score(&self, input: ScoreInput<'_>) -> Value;
}

/// Scorer used when no external scoring backend is configured.
#[derive(Debug, Clone)]
pub struct UnavailableScorer {
    reason: String,
}

impl Default for UnavailableScorer {
    fn default() -> Self {
        Self::new("No scoring backend is configured.")
    }
}

impl UnavailableScorer {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl Scorer for UnavailableScorer {
    async fn score(&self, _input: ScoreInput<'_>) -> Value {
        json!({
            "metric_name": "unavailable",
            "metric_value": null,
            "verdict": "error",
            "analysis": self.reason,
            "confidence": 0.0,
        })
    }
}
