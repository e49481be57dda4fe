use std::path::PathBuf;

/// Result alias for roster analysis.
pub type Result<T> = std::result::Result<T, Error>;

/// Failures that stop a run before any analysis happens.
///
/// Everything past loading (empty party data, unreachable thresholds, skipped
/// records) is reported through logs and an empty result instead.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("could not read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("could not parse {path} as JSON: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("could not parse {path} as CSV: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}
