//! In-memory transport for tests and dry runs.

use std::sync::Mutex;

use async_trait::async_trait;
use repro_core::{ReproError, Result, Submission};

use crate::transport::{SubmissionRequest, SubmissionTransport};

/// Serves a fixed initial submission and, optionally, fixed corrections.
///
/// Every request is recorded so tests can assert on what was asked.
#[derive(Debug, Default)]
pub struct StaticTransport {
    initial: Submission,
    corrections: Option<Submission>,
    requests: Mutex<Vec<SubmissionRequest>>,
}

impl StaticTransport {
    pub fn new(initial: Submission) -> Self {
        Self {
            initial,
            ..Self::default()
        }
    }

    /// Entries returned for correction requests. Without this, correction
    /// requests fail with a transport error.
    pub fn with_corrections(mut self, corrections: Submission) -> Self {
        self.corrections = Some(corrections);
        self
    }

    pub fn requests(&self) -> Vec<SubmissionRequest> {
        self.requests
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }

    pub fn correction_requests(&self) -> usize {
        self.requests()
            .iter()
            .filter(|r| r.is_correction())
            .count()
    }
}

#[async_trait]
impl SubmissionTransport for StaticTransport {
    async fn request(&self, request: &SubmissionRequest) -> Result<Submission> {
        self.requests
            .lock()
            .map_err(|_| ReproError::Transport("request log lock poisoned".to_string()))?
            .push(request.clone());

        if !request.is_correction() {
            return Ok(self.initial.clone());
        }
        let corrections = self
            .corrections
            .as_ref()
            .ok_or_else(|| ReproError::Transport("correction channel unavailable".to_string()))?;
        let wanted: Vec<&str> = request.experiments.iter().map(|e| e.id.as_str()).collect();
        Ok(Submission::new(
            corrections
                .experiments
                .iter()
                .filter(|e| wanted.contains(&e.id.as_str()))
                .cloned()
                .collect(),
        ))
    }
}
