// ABOUTME: Error taxonomy for packaging, scripting, and replay operations
// ABOUTME: Separates fatal failures from non-fatal ones collected in an Outcome

use serde::Deserialize;
use std::path::PathBuf;
use thiserror::Error;

/// Main error type for export and import operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Package path cannot be laid out (no parent directory, unsafe table name, ...)
    #[error("Invalid path '{}': {reason}", path.display())]
    InvalidPath { path: PathBuf, reason: String },

    /// Database is unreachable or the connection was rejected
    #[error("Connection error: {0}")]
    Connection(String),

    /// Working directory could not be prepared or cleaned
    #[error("Staging error at '{}': {source}", path.display())]
    Staging {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Provider failed to produce SQL for an object or a whole category
    #[error("Scripting failed for {object}: {message}")]
    Scripting { object: String, message: String },

    /// Compression or extraction failure
    #[error("Archive error at '{}': {message}", path.display())]
    Archive { path: PathBuf, message: String },

    /// Final package path is already taken
    #[error("Destination '{}' already exists - refusing to overwrite", .0.display())]
    DestinationExists(PathBuf),

    /// A single SQL batch failed during replay
    #[error("Batch {index} of {source_name} failed: {message}")]
    BatchExecution {
        source_name: String,
        index: usize,
        message: String,
    },

    /// Invalid configuration file or option
    #[error("Configuration error: {0}")]
    Config(String),

    /// Cancellation was requested between steps
    #[error("Operation cancelled")]
    Cancelled,

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn invalid_path(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Error::InvalidPath {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn staging(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Staging {
            path: path.into(),
            source,
        }
    }

    pub fn scripting(object: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Error::Scripting {
            object: object.into(),
            message: message.to_string(),
        }
    }

    pub fn archive(path: impl Into<PathBuf>, message: impl std::fmt::Display) -> Self {
        Error::Archive {
            path: path.into(),
            message: message.to_string(),
        }
    }
}

/// Result type alias for packaging operations.
pub type Result<T> = std::result::Result<T, Error>;

/// How non-fatal errors are treated during a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Log and record the error, then keep going
    #[default]
    Lenient,
    /// Abort the run on the first error
    Strict,
}

/// Non-fatal errors collected during one export or import.
///
/// A run that returns `Ok` with a non-empty outcome did finish, but some
/// objects, tables, or batches were skipped. Callers that need completeness
/// must check [`Outcome::is_clean`] rather than rely on the `Ok` alone.
#[derive(Debug, Default)]
pub struct Outcome {
    policy: FailurePolicy,
    errors: Vec<Error>,
}

impl Outcome {
    pub fn new(policy: FailurePolicy) -> Self {
        Self {
            policy,
            errors: Vec::new(),
        }
    }

    /// Record a non-fatal error, or hand it back as fatal under the strict policy.
    pub fn record(&mut self, error: Error) -> Result<()> {
        match self.policy {
            FailurePolicy::Strict => Err(error),
            FailurePolicy::Lenient => {
                tracing::warn!("⚠ {}", error);
                self.errors.push(error);
                Ok(())
            }
        }
    }

    pub fn policy(&self) -> FailurePolicy {
        self.policy
    }

    pub fn errors(&self) -> &[Error] {
        &self.errors
    }

    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}
