//! Domain-level error taxonomy for reproduction evaluation.
//!
//! Only structural problems are errors. Command failures and artifact
//! mismatches are recorded as data on the results instead.

use std::path::PathBuf;

/// Reproduction engine errors.
#[derive(Debug, thiserror::Error)]
pub enum ReproError {
    #[error("workspace init failed for {path}: {reason}")]
    WorkspaceInit { path: PathBuf, reason: String },

    #[error("file path escapes workspace: {path}")]
    PathEscape { path: String },

    #[error("malformed submission: {0}")]
    MalformedSubmission(String),

    #[error("unknown experiment id: {0}")]
    UnknownExperiment(String),

    #[error("invalid experiment spec {id}: {reason}")]
    InvalidSpec { id: String, reason: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("digest mismatch: expected {expected}, got {actual}")]
    DigestMismatch { expected: String, actual: String },

    #[error("manifest error: {0}")]
    Manifest(#[from] toml::de::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for reproduction domain operations.
pub type Result<T> = std::result::Result<T, ReproError>;
