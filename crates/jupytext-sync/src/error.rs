//! Error types for pairing and sync operations.

use std::path::PathBuf;

use jupytext_launch::CommandError;

use crate::queue::QueueError;

/// Result type for pairing and sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur while pairing or syncing documents.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// No interpreter with Jupytext is currently bound.
    #[error("Jupytext is not available")]
    ToolUnavailable,

    /// Jupytext ran and failed.
    #[error("Jupytext failed: {0}")]
    Command(#[from] CommandError),

    /// The queued operation never reported back.
    #[error(transparent)]
    Queue(#[from] QueueError),

    /// A pairing was required to include a notebook and does not.
    #[error("Formats '{formats}' for {} do not include ipynb", .path.display())]
    MissingNotebookFormat { path: PathBuf, formats: String },

    /// Caller asked for a notebook path from formats that have no notebook.
    #[error("No ipynb entry in formats '{0}'")]
    NoNotebookEntry(String),

    /// A format string could not be parsed.
    #[error("Invalid format '{0}'")]
    InvalidFormat(String),

    /// Jupytext printed something we could not interpret.
    #[error("Unexpected output from jupytext: {0}")]
    UnexpectedOutput(String),

    #[error("Path has no file name: {}", .0.display())]
    InvalidPath(PathBuf),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
