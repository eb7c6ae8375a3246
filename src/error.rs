//! Error types shared by the engine and its ingress adapters.

use std::fmt;

use thiserror::Error;
use tracing::error;

/// Result alias used throughout the engine.
pub type Result<T> = std::result::Result<T, EdgeError>;

/// Failure taxonomy shared by the engine and both ingress adapters.
///
/// Adapters map the variants onto their own transport: HTTP renders
/// `Decode`/`Validation` as 400 and `Storage` as 500, the relay drops
/// `Decode`, and nacks the other two.
#[derive(Debug, Error)]
pub enum EdgeError {
    /// The payload is not well-formed for its declared shape.
    #[error("decode error: {0}")]
    Decode(String),
    /// The payload decoded but is semantically incomplete.
    #[error("{0}")]
    Validation(Violation),
    /// Any failure reported by the persistence backend.
    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),
    /// The database file or its directory could not be prepared.
    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// A blocking storage task could not be joined.
    #[error("storage task failed: {0}")]
    Task(String),
}

/// A validation failure with the JSON paths that caused it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    /// Human readable description.
    pub message: String,
    /// Offending JSON paths, e.g. `edges.0.name`.
    pub fields: Vec<String>,
}

impl Violation {
    /// Creates a violation pointing at a single field path.
    pub fn new(message: impl Into<String>, field: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            fields: vec![field.into()],
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl EdgeError {
    pub(crate) fn invalid(message: impl Into<String>, field: impl Into<String>) -> Self {
        EdgeError::Validation(Violation::new(message, field))
    }

    /// Whether a broker should redeliver the message that produced this error.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, EdgeError::Decode(_))
    }

    /// Field paths attached to a validation failure, if any.
    pub fn fields(&self) -> Option<&[String]> {
        match self {
            EdgeError::Validation(violation) => Some(&violation.fields),
            _ => None,
        }
    }
}

impl From<tokio::task::JoinError> for EdgeError {
    fn from(err: tokio::task::JoinError) -> Self {
        error!(?err, "storage task aborted");
        EdgeError::Task(err.to_string())
    }
}

impl From<serde_json::Error> for EdgeError {
    fn from(err: serde_json::Error) -> Self {
        EdgeError::Decode(err.to_string())
    }
}
