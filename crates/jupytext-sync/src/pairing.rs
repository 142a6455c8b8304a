//! Reading and changing pairings, serialized per pairing group.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{info, warn};

use crate::error::{SyncError, SyncResult};
use crate::formats::{default_supported_extensions, suggest_formats, FormatSpec};
use crate::jupytext::JupytextCli;
use crate::queue::{GroupKey, OperationQueue};

/// Format resolution and sync for one Jupytext backend.
///
/// Every call that touches files goes through the [`OperationQueue`] under
/// the path's [`GroupKey`].
pub struct Pairing<J> {
    cli: Arc<J>,
    queue: OperationQueue,
    default_formats: HashMap<String, String>,
}

impl<J: JupytextCli> Pairing<J> {
    pub fn new(cli: Arc<J>, queue: OperationQueue) -> Self {
        Self {
            cli,
            queue,
            default_formats: HashMap::new(),
        }
    }

    /// Per-extension pairing used by [`Pairing::suggest_formats`].
    pub fn with_default_formats(mut self, defaults: HashMap<String, String>) -> Self {
        self.default_formats = defaults;
        self
    }

    pub fn cli(&self) -> &Arc<J> {
        &self.cli
    }

    pub fn queue(&self) -> &OperationQueue {
        &self.queue
    }

    fn group(path: &Path) -> SyncResult<GroupKey> {
        GroupKey::from_path(path).ok_or_else(|| SyncError::InvalidPath(path.to_path_buf()))
    }

    /// Paired formats of `path`, or the reason they could not be read.
    pub async fn try_read_paired_formats(&self, path: &Path) -> SyncResult<FormatSpec> {
        let key = Self::group(path)?;
        let cli = self.cli.clone();
        let path = path.to_path_buf();
        self.queue
            .enqueue(key, move || cli.paired_formats(path))
            .await?
    }

    /// Paired formats of `path`; `None` if Jupytext could not be run.
    pub async fn read_paired_formats(&self, path: &Path) -> Option<FormatSpec> {
        match self.try_read_paired_formats(path).await {
            Ok(formats) => Some(formats),
            Err(e) => {
                warn!("[pairing] Cannot read paired formats of {:?}: {}", path, e);
                None
            }
        }
    }

    /// Pairing to propose for `path` when it has none.
    pub fn suggest_formats(&self, path: &Path) -> FormatSpec {
        suggest_formats(path, &self.default_formats)
    }

    /// Pair `path`.
    ///
    /// Uses `requested` if given, else the current pairing, else the
    /// suggestion. With `require_notebook`, a target without an `ipynb` entry
    /// is rejected. Returns the formats that were applied, or `None` when the
    /// target has a single entry and there is nothing to pair.
    pub async fn set_formats(
        &self,
        path: &Path,
        requested: Option<FormatSpec>,
        require_notebook: bool,
    ) -> SyncResult<Option<FormatSpec>> {
        let target = match requested.filter(|f| !f.is_empty()) {
            Some(formats) => formats,
            None => match self.read_paired_formats(path).await {
                Some(current) if current.is_paired() => current,
                _ => self.suggest_formats(path),
            },
        };

        if require_notebook && !target.contains_notebook() {
            return Err(SyncError::MissingNotebookFormat {
                path: path.to_path_buf(),
                formats: target.to_string(),
            });
        }

        if !target.is_paired() {
            info!(
                "[pairing] Not pairing {:?}: '{}' has a single format",
                path, target
            );
            return Ok(None);
        }

        let key = Self::group(path)?;
        let cli = self.cli.clone();
        let owned = path.to_path_buf();
        let formats = target.clone();
        self.queue
            .enqueue(key, move || cli.set_formats(owned, formats))
            .await??;
        Ok(Some(target))
    }

    /// Run `jupytext --sync` on `path`.
    pub async fn sync(&self, path: &Path) -> SyncResult<String> {
        let key = Self::group(path)?;
        let cli = self.cli.clone();
        let path: PathBuf = path.to_path_buf();
        self.queue.enqueue(key, move || cli.sync(path)).await?
    }

    /// Extensions Jupytext can pair, falling back to the built-in list.
    pub async fn supported_extensions(&self) -> Vec<String> {
        match self.cli.supported_extensions().await {
            Ok(exts) if !exts.is_empty() => exts,
            Ok(_) => default_supported_extensions(),
            Err(e) => {
                warn!("[pairing] Using built-in extension list: {}", e);
                default_supported_extensions()
            }
        }
    }
}
