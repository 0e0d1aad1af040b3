//! Error types for crawling.

use std::path::PathBuf;

use thiserror::Error;
use tidesync_core::{CoreError, FailureClass};

/// Failure reported by a tree collaborator.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct CollaboratorError {
    class: FailureClass,
    message: String,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl CollaboratorError {
    /// A failure that may clear up on the next cycle (network, timeout, locks).
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            class: FailureClass::Transient,
            message: message.into(),
            source: None,
        }
    }

    /// A failure that needs external intervention (authentication, authorization).
    pub fn fatal(message: impl Into<String>) -> Self {
        Self {
            class: FailureClass::Fatal,
            message: message.into(),
            source: None,
        }
    }

    /// Attach the underlying error.
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Transient I/O failure at a local path.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        Self::transient(format!("I/O error at {}", path.display())).with_source(source)
    }

    /// How the failure affects the cycle.
    pub fn class(&self) -> FailureClass {
        self.class
    }
}

/// Errors that end a crawl.
#[derive(Debug, Error)]
pub enum CrawlError {
    /// The local tree could not be read.
    #[error("Local tree: {0}")]
    Local(#[source] CollaboratorError),

    /// The remote tree could not be read.
    #[error("Remote tree: {0}")]
    Remote(#[source] CollaboratorError),

    /// Ignore rules failed to compile, or correlation broke an event
    /// collection contract.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// The crawl was cancelled before completion.
    #[error("Crawl cancelled")]
    Cancelled,
}

impl CrawlError {
    /// How the error affects the current cycle.
    ///
    /// Only collaborator failures flagged fatal stop the worker; everything
    /// else is retried on the next tick.
    pub fn failure_class(&self) -> FailureClass {
        match self {
            Self::Local(e) | Self::Remote(e) => e.class(),
            Self::Core(_) | Self::Cancelled => FailureClass::Transient,
        }
    }

    /// Check if the cycle was cancelled.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}
