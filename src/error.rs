use thiserror::Error;

/// Failure to build one table. Other tables of the same document are unaffected.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TableError {
    #[error("malformed table: row {row} has {found} cells, expected {expected}")]
    Malformed {
        row: usize,
        expected: usize,
        found: usize,
    },
}

#[derive(Debug, Error)]
pub enum ProjectError {
    #[error("duplicate key '{0}'")]
    DuplicateKey(String),
    #[error("no value selected for '{key}': {message}")]
    Resolver { key: String, message: String },
    #[error("user selection requested but no conflict resolver was supplied")]
    MissingResolver,
}

#[derive(Debug, Error)]
pub enum SummaryError {
    #[error("missing required parameter '{0}'")]
    MissingParameter(String),
}

#[derive(Debug, Error)]
pub enum ExportError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Csv(#[from] csv::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error("table index {index} out of range ({len} tables)")]
    IndexOutOfRange { index: usize, len: usize },
}

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error(transparent)]
    Config(#[from] config::ConfigError),
    #[error("invalid separator for '{key}': {value:?}")]
    Separator { key: &'static str, value: String },
}
