//! Error types shared across tidesync.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::collection::EventId;
use crate::node::ObjectId;

/// Errors raised by core types.
///
/// Every variant here is a caller contract violation or a configuration
/// problem; none of them is produced by I/O.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A path string is not a valid sync-relative path.
    #[error("Invalid path '{path}': {reason}")]
    InvalidPath { path: String, reason: &'static str },

    /// A path does not live under the configured root.
    #[error("Path '{path}' is outside root '{root}'")]
    OutsideRoot { path: String, root: String },

    /// A local path cannot be represented as UTF-8.
    #[error("Path is not valid UTF-8: {path}")]
    NonUtf8Path { path: PathBuf },

    /// Invalid configuration.
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    /// Configuration text could not be parsed.
    #[error("Failed to parse configuration: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// An ignore glob failed to compile.
    #[error("Invalid ignore pattern '{pattern}': {source}")]
    InvalidIgnorePattern {
        pattern: String,
        #[source]
        source: globset::Error,
    },

    /// A mergeable pair does not describe a removal and a creation of the
    /// same object.
    #[error("Malformed mergeable pair for {key}: {reason}")]
    MalformedPair { key: ObjectId, reason: String },

    /// An event id does not belong to the collection.
    #[error("Unknown event {id:?}")]
    UnknownEvent { id: EventId },
}

impl CoreError {
    /// Create an invalid path error.
    pub fn invalid_path(path: impl Into<String>, reason: &'static str) -> Self {
        Self::InvalidPath {
            path: path.into(),
            reason,
        }
    }

    /// Create a malformed pair error.
    pub fn malformed_pair(key: &ObjectId, reason: impl Into<String>) -> Self {
        Self::MalformedPair {
            key: key.clone(),
            reason: reason.into(),
        }
    }
}

/// How a collaborator failure affects the current sync cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureClass {
    /// Network, timeout or lock contention. Retry on the next tick.
    Transient,
    /// Authentication or authorization. Needs external intervention.
    Fatal,
}

impl FailureClass {
    /// Check if the failure may clear up by itself.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient)
    }
}
