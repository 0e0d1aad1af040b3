//! Error types for the identity store.

use std::path::PathBuf;

use thiserror::Error;
use tidesync_core::{ObjectId, SyncPath};

use crate::validate::StructuralReport;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur in identity store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Another identity already occupies the path.
    #[error("Path {path} is held by {existing}, cannot map {incoming}")]
    PathConflict {
        path: SyncPath,
        existing: ObjectId,
        incoming: ObjectId,
    },

    /// The sync root itself cannot be mapped.
    #[error("Cannot map the sync root to {id}")]
    RootPath { id: ObjectId },

    /// The store violates its structural invariants.
    #[error("Identity store is structurally inconsistent: {0}")]
    Structural(StructuralReport),

    /// The persisted document cannot be loaded.
    #[error("Corrupt identity store at {path}: {reason}")]
    Corrupt { path: PathBuf, reason: String },

    /// I/O failure on the backing file.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// JSON encoding or decoding failed.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    /// Create an I/O error with path context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Check if this is a bijection conflict the crawler should resolve.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::PathConflict { .. })
    }
}
