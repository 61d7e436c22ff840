//! Error types for the screening engine

use crate::dataset::DatasetIssue;
use thiserror::Error;

/// Errors returned by validation, training, comparison and scoring.
#[derive(Debug, Error)]
pub enum ScreeningError {
    /// Input could not be read at all (undecodable text, broken CSV framing)
    #[error("parse error: {0}")]
    Parse(String),

    /// Fewer than a header plus one data row
    #[error("dataset must contain at least a header and one data row")]
    EmptyDataset,

    /// Schema or constraint violations; always the full list
    #[error("dataset validation failed with {} issue(s): {}", .0.len(), join_issues(.0))]
    ValidationFailed(Vec<DatasetIssue>),

    /// Bad algorithm selection or malformed request
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// External trainer reported an error, exited non-zero, wrote non-JSON
    /// output or exceeded the caller timeout
    #[error("trainer failure: {message}")]
    TrainerFailure {
        message: String,
        /// Captured stdout and stderr, verbatim
        diagnostics: String,
    },

    /// Trainer output did not match the algorithm result shape
    #[error("malformed result: {0}")]
    MalformedResult(String),

    /// An importance map summed to zero and cannot be normalized
    #[error("degenerate {map} importance for {algorithm}: weights sum to zero")]
    DegenerateImportance { algorithm: String, map: String },

    /// Prediction requested without any model ids
    #[error("no trained models selected for prediction")]
    NoTrainedModels,

    /// External predictor failed or exceeded the caller timeout
    #[error("predictor failure: {0}")]
    PredictorFailure(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ScreeningError {
    /// Whether the error originates from the trainer (including timeouts).
    pub fn is_trainer_failure(&self) -> bool {
        matches!(self, ScreeningError::TrainerFailure { .. })
    }

    pub(crate) fn trainer(message: impl Into<String>, diagnostics: impl Into<String>) -> Self {
        ScreeningError::TrainerFailure {
            message: message.into(),
            diagnostics: diagnostics.into(),
        }
    }
}

fn join_issues(issues: &[DatasetIssue]) -> String {
    issues
        .iter()
        .map(|issue| issue.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

impl From<csv::Error> for ScreeningError {
    fn from(err: csv::Error) -> Self {
        ScreeningError::Parse(err.to_string())
    }
}

impl From<toml::de::Error> for ScreeningError {
    fn from(err: toml::de::Error) -> Self {
        ScreeningError::Config(err.to_string())
    }
}

/// Result type for screening operations
pub type Result<T> = std::result::Result<T, ScreeningError>;
