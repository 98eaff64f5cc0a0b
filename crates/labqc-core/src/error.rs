//! Error taxonomy for LabQC.
//!
//! Only conditions that are fatal to a unit of work live here. Conditions that
//! are reported alongside successful results (skipped sources, schema
//! differences, thin tests) are [`Diagnostic`] values instead.

use serde::{Deserialize, Serialize};

/// LabQC errors.
#[derive(Debug, thiserror::Error)]
pub enum QcError {
    #[error("schema validation failed for source '{source_name}': missing columns [{}]", .missing_columns.join(", "))]
    SchemaValidation {
        source_name: String,
        missing_columns: Vec<String>,
    },

    #[error("no numeric test columns found in source '{source_name}'")]
    NoTestColumns { source_name: String },

    #[error("invalid threshold configuration: {0}")]
    InvalidThresholdConfiguration(String),

    #[error("no usable source: {0}")]
    NoUsableSource(String),

    #[error("model code '{0}' not found in dataset")]
    UnknownModel(String),

    #[error("config error in {path}: {message}")]
    Config { path: String, message: String },

    #[error("digest mismatch: expected {expected}, got {actual}")]
    DigestMismatch { expected: String, actual: String },

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for LabQC operations.
pub type Result<T> = std::result::Result<T, QcError>;

/// Non-fatal condition reported next to the results it qualifies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Diagnostic {
    /// A source was rejected and left out of the merge.
    SkippedSource { source_name: String, reason: String },

    /// A column outside the identifier set was left out of the test columns.
    IgnoredColumn {
        source_name: String,
        column: String,
        reason: String,
    },

    /// A source lacks columns present in the union schema; its cells for
    /// those columns are recorded as missing.
    MergeConflict {
        source_name: String,
        missing_columns: Vec<String>,
    },

    /// A test has fewer than two values in a partition, so it has no
    /// standard deviation and grades as "No data".
    InsufficientData {
        model_code: String,
        test: String,
        count: usize,
    },
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Diagnostic::SkippedSource {
                source_name,
                reason,
            } => write!(f, "skipped source '{source_name}': {reason}"),
            Diagnostic::IgnoredColumn {
                source_name,
                column,
                reason,
            } => write!(
                f,
                "source '{source_name}': column '{column}' is not a test column: {reason}"
            ),
            Diagnostic::MergeConflict {
                source_name,
                missing_columns,
            } => write!(
                f,
                "source '{source_name}' lacks columns [{}]; filled as missing",
                missing_columns.join(", ")
            ),
            Diagnostic::InsufficientData {
                model_code,
                test,
                count,
            } => write!(
                f,
                "model {model_code}, test {test}: {count} value(s), need at least 2"
            ),
        }
    }
}
