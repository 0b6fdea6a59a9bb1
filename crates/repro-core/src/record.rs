//! Persisted run records.
//!
//! One JSON document per attempt, named `<id>_<UTC timestamp>_a<attempt>.json`,
//! with a `.digest` sidecar holding the SHA-256 of the document bytes.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::domain::spec::preview;
use crate::domain::{CommandResult, EvaluationStatus, ExperimentEvaluation, ReproError, Result};
use crate::review::ReviewNote;

/// Characters kept from non-JSON artifacts in a record snapshot.
pub const SNAPSHOT_PREVIEW_CHARS: usize = 1200;

/// Artifact outcome plus a snapshot of what the run produced.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ArtifactSnapshot {
    pub path: String,
    pub success: bool,
    pub details: String,
    pub actual_path: PathBuf,
    /// Parsed JSON for `.json` files, a text preview otherwise, null if absent.
    pub content: Value,
}

/// Everything persisted for one attempt.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunRecord {
    pub experiment_id: String,
    pub attempt: u32,
    pub variant: String,
    pub status: EvaluationStatus,
    pub notes: String,
    pub recorded_at: DateTime<Utc>,
    pub workspace: Option<PathBuf>,
    pub files_written: Vec<String>,
    pub commands: Vec<CommandResult>,
    pub artifacts: Vec<ArtifactSnapshot>,
    pub reviews: Vec<ReviewNote>,
    pub score: Value,
}

impl RunRecord {
    /// Build a record from an evaluation, reading artifact snapshots from disk.
    pub fn from_evaluation(eval: &ExperimentEvaluation, recorded_at: DateTime<Utc>) -> Self {
        let artifacts = eval
            .artifact_results
            .iter()
            .map(|a| ArtifactSnapshot {
                path: a.path.clone(),
                success: a.success,
                details: a.details.clone(),
                actual_path: a.actual_path.clone(),
                content: snapshot(&a.actual_path),
            })
            .collect();

        Self {
            experiment_id: eval.id.clone(),
            attempt: eval.attempt,
            variant: eval.variant.clone(),
            status: eval.status,
            notes: eval.notes.clone(),
            recorded_at,
            workspace: eval.workspace.clone(),
            files_written: eval.files_written.clone(),
            commands: eval.command_results.clone(),
            artifacts,
            reviews: eval.reviews.clone(),
            score: eval.score.clone(),
        }
    }

    /// `<id>_<YYYYMMDDTHHMMSSZ>_a<attempt>.json`
    pub fn file_name(&self) -> String {
        format!(
            "{}_{}_a{}.json",
            self.experiment_id,
            self.recorded_at.format("%Y%m%dT%H%M%SZ"),
            self.attempt
        )
    }
}

fn snapshot(path: &Path) -> Value {
    let Ok(bytes) = std::fs::read(path) else {
        return Value::Null;
    };
    let is_json = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
    if is_json {
        if let Ok(parsed) = serde_json::from_slice(&bytes) {
            return parsed;
        }
    }
    Value::String(preview(&String::from_utf8_lossy(&bytes), SNAPSHOT_PREVIEW_CHARS))
}

fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Destination for run records.
#[async_trait]
pub trait RecordSink: Send + Sync {
    /// Persist `record`, returning where it landed.
    async fn persist(&self, record: &RunRecord) -> Result<PathBuf>;
}

/// Writes records as pretty JSON files under a log directory.
#[derive(Debug, Clone)]
pub struct FsRecordSink {
    dir: PathBuf,
}

impl FsRecordSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[async_trait]
impl RecordSink for FsRecordSink {
    async fn persist(&self, record: &RunRecord) -> Result<PathBuf> {
        tokio::fs::create_dir_all(&self.dir).await?;

        let path = self.dir.join(record.file_name());
        let mut json = serde_json::to_vec_pretty(record)?;
        json.push(b'\n');
        let digest = sha256_hex(&json);

        tokio::fs::write(&path, &json).await?;
        tokio::fs::write(path.with_extension("digest"), digest.as_bytes()).await?;

        debug!(path = %path.display(), digest = %digest, "run record written");
        Ok(path)
    }
}

/// Read a record written by [`FsRecordSink`] and verify its digest sidecar.
pub fn read_record(path: &Path) -> Result<RunRecord> {
    let json = std::fs::read(path)?;
    let expected = std::fs::read_to_string(path.with_extension("digest"))?;
    let actual = sha256_hex(&json);
    if expected.trim() != actual {
        return Err(ReproError::DigestMismatch {
            expected: expected.trim().to_string(),
            actual,
        });
    }
    Ok(serde_json::from_slice(&json)?)
}

/// In-memory sink for tests.
#[derive(Debug, Default)]
pub struct MemoryRecordSink {
    records: Mutex<Vec<RunRecord>>,
}

impl MemoryRecordSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<RunRecord> {
        self.records
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl RecordSink for MemoryRecordSink {
    async fn persist(&self, record: &RunRecord) -> Result<PathBuf> {
        let path = PathBuf::from("memory").join(record.file_name());
        self.records
            .lock()
            .map_err(|_| ReproError::Io(std::io::Error::other("record sink lock poisoned")))?
            .push(record.clone());
        Ok(path)
    }
}
