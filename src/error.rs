//! Crate-level error type.

use thiserror::Error;

use crate::config::SettingsError;
use crate::execution::DriverError;
use crate::schema::SchemaError;

/// Result type for trellis operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by building, reading and writing.
#[derive(Error, Debug)]
pub enum Error {
    /// Table, column or relationship could not be resolved.
    #[error(transparent)]
    Schema(#[from] SchemaError),

    /// Postfix expression does not reduce to a single result, or mixes
    /// operators that cannot be compiled in its context.
    #[error("malformed expression: {0}")]
    MalformedExpression(String),

    /// The bucket's contents do not determine a single statement kind.
    #[error("ambiguous operation on '{bucket}': {reason}")]
    AmbiguousOperation { bucket: String, reason: String },

    /// The connection failed to execute a statement.
    #[error(transparent)]
    Driver(#[from] DriverError),

    /// A registered extension rejected its beacon.
    #[error("extension '{key}' failed: {message}")]
    Extension { key: String, message: String },

    #[error(transparent)]
    Settings(#[from] SettingsError),

    #[error("invalid request document: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedExpression(message.into())
    }

    pub fn ambiguous(bucket: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::AmbiguousOperation {
            bucket: bucket.into(),
            reason: reason.into(),
        }
    }

    pub fn extension(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Extension {
            key: key.into(),
            message: message.into(),
        }
    }

    /// Whether the error came from the caller's request rather than the
    /// database or environment.
    pub fn is_request_error(&self) -> bool {
        matches!(
            self,
            Self::Schema(_)
                | Self::MalformedExpression(_)
                | Self::AmbiguousOperation { .. }
                | Self::Json(_)
        )
    }
}
