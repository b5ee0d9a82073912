//! Error types for baseline tracking

use thiserror::Error;

/// Result type for baseline operations
pub type Result<T> = std::result::Result<T, BaselineError>;

/// Baseline tracking errors
#[derive(Error, Debug)]
pub enum BaselineError {
    #[error("Invalid version: {0}")]
    InvalidVersion(String),

    #[error("Invalid schema document: {0}")]
    InvalidDocument(String),

    #[error("Manifest {path} is corrupt: {reason}")]
    ManifestCorrupt { path: String, reason: String },

    #[error("Manifest is inconsistent: {0}")]
    InconsistentManifest(String),

    #[error("Release {version} processed out of order (after {previous})")]
    OutOfOrder { version: String, previous: String },

    #[error("Snapshot not found for {0}")]
    SnapshotMissing(String),

    #[error("Fetch failed for {version}: {reason}")]
    FetchFailed { version: String, reason: String },

    #[error("Fetch for {version} timed out after {seconds}s")]
    FetchTimeout { version: String, seconds: u64 },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl BaselineError {
    pub(crate) fn fetch_failed(version: impl ToString, reason: impl Into<String>) -> Self {
        Self::FetchFailed {
            version: version.to_string(),
            reason: reason.into(),
        }
    }
}
