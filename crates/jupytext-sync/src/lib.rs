//! jupytext-sync - Keeps Jupyter notebooks and their paired text files in sync.
//!
//! Jupytext pairs a notebook with plain-text representations (`.py`, `.md`,
//! ...). This crate runs Jupytext on document lifecycle events so the members
//! of a pairing never drift apart, and never runs two Jupytext operations on
//! the same pairing at once.
//!
//! The [`Dispatcher`] is the entry point for embedders. The `jupytext-sync`
//! binary drives it from a filesystem watcher or one-shot commands.

use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

pub mod dispatcher;
pub mod error;
pub mod formats;
pub mod jupytext;
pub mod notebook_path;
pub mod pairing;
pub mod project_file;
pub mod queue;
pub mod settings;
pub mod tracker;
pub mod watch;

pub use dispatcher::{Dispatcher, Document, DocumentKind, LifecycleEvent, Outcome, SkipReason};
pub use error::{SyncError, SyncResult};
pub use formats::{FormatEntry, FormatSpec};
pub use jupytext::{Jupytext, JupytextCli};
pub use notebook_path::derive_notebook_path;
pub use pairing::Pairing;
pub use queue::{GroupKey, OperationHandle, OperationQueue, QueueError};
pub use settings::Settings;
pub use tracker::AutoCreatedTracker;

/// Base directory for per-user state: `~/.cache/jupytext-sync/`.
pub fn state_base_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join("jupytext-sync")
}

/// Compute a short hash of a workspace path for directory naming.
///
/// Returns the first 12 hex characters of the SHA-256 hash.
pub fn workspace_hash(path: &Path) -> String {
    let mut hasher = Sha256::new();
    hasher.update(path.to_string_lossy().as_bytes());
    hex::encode(&hasher.finalize()[..6]) // 6 bytes = 12 hex chars
}

/// Where the auto-created notebook list for `workspace_root` is kept.
pub fn default_tracker_path(workspace_root: &Path) -> PathBuf {
    state_base_dir()
        .join("workspaces")
        .join(workspace_hash(workspace_root))
        .join("auto-created.json")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_workspace_hash_is_stable_and_short() {
        let a = workspace_hash(Path::new("/home/me/project"));
        assert_eq!(a.len(), 12);
        assert_eq!(a, workspace_hash(Path::new("/home/me/project")));
        assert_ne!(a, workspace_hash(Path::new("/home/me/other")));
    }

    #[test]
    fn test_tracker_path_is_scoped_per_workspace() {
        let root = Path::new("/home/me/project");
        let path = default_tracker_path(root);
        assert!(path.ends_with(format!("{}/auto-created.json", workspace_hash(root))));
        assert!(path.starts_with(state_base_dir()));
    }
}
