//! Notebooks that jupytext-sync created itself.
//!
//! Opening a paired text file whose notebook is missing makes Jupytext write
//! the notebook. Those notebooks are remembered here so closing them can
//! clean up after us without touching notebooks the user made.

use std::path::{Path, PathBuf};

use log::{debug, warn};
use tokio::sync::Mutex;

use crate::error::SyncResult;

/// Persisted set of auto-created notebook paths.
pub struct AutoCreatedTracker {
    path: PathBuf,
    entries: Mutex<Vec<PathBuf>>,
}

fn absolute(p: &Path) -> PathBuf {
    if p.is_absolute() {
        p.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(p))
            .unwrap_or_else(|_| p.to_path_buf())
    }
}

impl AutoCreatedTracker {
    /// Open the tracker stored at `path`. A missing or unreadable file starts
    /// an empty set.
    pub async fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = match tokio::fs::read_to_string(&path).await {
            Ok(contents) => serde_json::from_str::<Vec<PathBuf>>(&contents).unwrap_or_else(|e| {
                warn!("[tracker] Ignoring invalid {:?}: {}", path, e);
                Vec::new()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => {
                warn!("[tracker] Cannot read {:?}: {}", path, e);
                Vec::new()
            }
        };
        debug!("[tracker] Loaded {} entries from {:?}", entries.len(), path);
        Self {
            path,
            entries: Mutex::new(entries),
        }
    }

    /// Where the set is persisted.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Remember `notebook` as created by us. Marking twice keeps one entry.
    ///
    /// The in-memory set only changes once the store was written.
    pub async fn mark(&self, notebook: &Path) -> SyncResult<()> {
        let notebook = absolute(notebook);
        let mut entries = self.entries.lock().await;
        if entries.contains(&notebook) {
            return Ok(());
        }
        let mut updated = entries.clone();
        updated.push(notebook);
        self.persist(&updated).await?;
        *entries = updated;
        Ok(())
    }

    /// Forget `notebook`. Returns whether it was marked.
    pub async fn unmark(&self, notebook: &Path) -> SyncResult<bool> {
        let notebook = absolute(notebook);
        let mut entries = self.entries.lock().await;
        if !entries.contains(&notebook) {
            return Ok(false);
        }
        let updated: Vec<PathBuf> = entries.iter().filter(|p| **p != notebook).cloned().collect();
        self.persist(&updated).await?;
        *entries = updated;
        Ok(true)
    }

    pub async fn is_marked(&self, notebook: &Path) -> bool {
        let notebook = absolute(notebook);
        self.entries.lock().await.contains(&notebook)
    }

    /// Snapshot of all marked notebooks.
    pub async fn entries(&self) -> Vec<PathBuf> {
        self.entries.lock().await.clone()
    }

    async fn persist(&self, entries: &[PathBuf]) -> SyncResult<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let json = serde_json::to_string_pretty(entries)?;
        tokio::fs::write(&self.path, json).await?;
        Ok(())
    }
}
