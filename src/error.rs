// src/error.rs
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    /// Network or authentication failure talking to the remote store.
    #[error("remote store unavailable: {0}")]
    RemoteUnavailable(String),

    #[error("sheet not found: {0}")]
    NotFound(String),

    #[error("schema mismatch: {0}")]
    SchemaMismatch(String),

    #[error("row {index} is out of bounds for sheet {sheet} ({len} rows)")]
    RowOutOfBounds {
        sheet: String,
        index: usize,
        len: usize,
    },

    #[error("duplicate id {id} in sheet {sheet}")]
    DuplicateId { sheet: String, id: String },

    #[error("no record with id {id} in sheet {sheet}")]
    UnknownRecord { sheet: String, id: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),
}

impl StoreError {
    /// Errors the user can recover from by triggering another refresh.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::RemoteUnavailable(_))
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: String,
        source: toml::de::Error,
    },

    #[error("missing required option {0}")]
    Missing(&'static str),

    #[error("invalid spreadsheet reference: {0}")]
    InvalidSpreadsheet(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_remote_failures_are_retryable() {
        assert!(StoreError::RemoteUnavailable("timeout".into()).is_retryable());
        assert!(!StoreError::NotFound("Tasks".into()).is_retryable());
        assert!(!StoreError::SchemaMismatch("bad row".into()).is_retryable());
    }

    #[test]
    fn out_of_bounds_message_names_the_sheet() {
        let err = StoreError::RowOutOfBounds {
            sheet: "Tasks".into(),
            index: 7,
            len: 3,
        };
        assert_eq!(err.to_string(), "row 7 is out of bounds for sheet Tasks (3 rows)");
    }
}
