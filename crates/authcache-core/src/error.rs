use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("No auth fields provided - nothing to update")]
    NoFields,

    #[error("Failed to open auth database at {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

impl StoreError {
    /// True when the caller asked for an update without any fields,
    /// as opposed to the storage layer failing.
    pub fn is_caller_error(&self) -> bool {
        matches!(self, StoreError::NoFields)
    }
}
