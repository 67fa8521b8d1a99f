//! Structural errors for the persistence layer and CLI.
//!
//! Only structural failures live here: missing files, unreadable JSON, I/O.
//! Recoverable feed conditions (malformed records, bad timestamps, missing
//! parents) never become errors; they are absorbed into report counters.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("scope '{scope}': {source}")]
    Scope {
        scope: String,
        #[source]
        source: Box<ArchiveError>,
    },

    #[error("scope directory not found: {0}")]
    ScopeNotFound(PathBuf),

    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl ArchiveError {
    /// Qualify an error with the scope it occurred in.
    pub fn for_scope(self, scope: &str) -> ArchiveError {
        ArchiveError::Scope {
            scope: scope.to_string(),
            source: Box::new(self),
        }
    }
}
