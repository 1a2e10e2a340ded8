// ABOUTME: Error taxonomy for export and import operations
// ABOUTME: Root causes that callers can downcast from anyhow errors to classify failures

use std::path::PathBuf;
use thiserror::Error;

/// Fatal failure categories surfaced by the exporter and importer.
///
/// Library functions return `anyhow::Result` and wrap these with context.
/// Use `err.downcast_ref::<InterchangeError>()` (or `root_cause()`) to find
/// out which category a failure belongs to.
#[derive(Debug, Error)]
pub enum InterchangeError {
    /// Malformed option or input document. Never retried.
    #[error("Validation error: {0}")]
    Validation(String),

    /// A WHERE clause failed validation and was never sent to the database.
    #[error("Rejected WHERE clause for table '{table}': {reason}")]
    SecurityRejection { table: String, reason: String },

    /// Filesystem or compression failure, with the offending path.
    #[error("I/O failure at '{}': {message}", path.display())]
    Io { path: PathBuf, message: String },

    /// The adapter cannot satisfy a hard requirement (e.g. parameter binding).
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl InterchangeError {
    pub fn validation(message: impl Into<String>) -> Self {
        InterchangeError::Validation(message.into())
    }

    pub fn io(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        InterchangeError::Io {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Find the `InterchangeError` at the root of an anyhow chain, if any.
///
/// Also looks inside `std::io::Error` values, which is how write failures
/// of an output file carry their path through `Write`.
pub fn classify(err: &anyhow::Error) -> Option<&InterchangeError> {
    err.chain().find_map(|cause| {
        cause.downcast_ref::<InterchangeError>().or_else(|| {
            cause
                .downcast_ref::<std::io::Error>()
                .and_then(|io| io.get_ref())
                .and_then(|inner| inner.downcast_ref::<InterchangeError>())
        })
    })
}
