use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum WorkgateError {
    #[error("I/O error: {0}")]
    IoError(#[from] io::Error),
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
    #[error("Not a version-controlled directory: {0}")]
    VcsUnavailable(String),
    #[error("Version-control query timed out after {0}ms")]
    VcsTimeout(u64),
    #[error("Command classification exceeded its {0}ms budget")]
    ClassificationTimeout(u64),
    #[error("Intent analysis exceeded its {0}ms budget")]
    IntentAnalysisTimeout(u64),
    #[error("Malformed configuration in {path}: {reason}")]
    ConfigMalformed { path: PathBuf, reason: String },
    #[error("Cache recompute failed: {0}")]
    CacheComputeFailure(String),
    #[error("Issue tracker error: {0}")]
    IssueTrackerError(String),
    #[error("Validation error: {0}")]
    ValidationError(String),
}

impl WorkgateError {
    /// Short stable tag used in degraded-mode log lines and `Decision::degraded`.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::IoError(_) => "io",
            Self::JsonError(_) => "json",
            Self::VcsUnavailable(_) => "vcs_unavailable",
            Self::VcsTimeout(_) => "vcs_timeout",
            Self::ClassificationTimeout(_) => "classification_timeout",
            Self::IntentAnalysisTimeout(_) => "intent_analysis_timeout",
            Self::ConfigMalformed { .. } => "config_malformed",
            Self::CacheComputeFailure(_) => "cache_compute_failure",
            Self::IssueTrackerError(_) => "issue_tracker",
            Self::ValidationError(_) => "validation",
        }
    }
}
