//! Error type shared by the whole crate.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, LoaderError>;

/// Conditions that stop an experiment.
///
/// Failed invocations are not errors, they are recorded in the output like successful ones.
#[derive(Debug, Error)]
pub enum LoaderError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("invalid specification for function {function}: {reason}")]
    InvalidSpecification { function: String, reason: String },

    /// Health check ratio outside of `[0, 1]`, i.e. more invocations issued (or failed) than requested.
    #[error("invalid arguments provided to runtime assertion: ideal = {ideal}, real = {real}")]
    InvalidRatio { ideal: i64, real: i64 },

    #[error("deployment failed: {0}")]
    Deploy(String),

    #[error("record streams closed after {written} of {expected} records ({job_written} job records)")]
    IncompleteCollection { expected: u64, written: u64, job_written: u64 },

    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl LoaderError {
    pub fn io(path: impl AsRef<std::path::Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().display().to_string(),
            source,
        }
    }
}
