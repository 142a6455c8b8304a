//! Turning document lifecycle events into Jupytext operations.
//!
//! The host (an editor integration, or the `watch` command) reports open,
//! save and close events; the dispatcher decides whether to sync, create or
//! clean up the paired notebook.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use jupytext_launch::version::is_supported;
use log::{debug, error, info};
use serde::Serialize;

use crate::error::{SyncError, SyncResult};
use crate::formats::{default_supported_extensions, is_supported_path, NOTEBOOK_EXTENSION};
use crate::jupytext::JupytextCli;
use crate::notebook_path::derive_notebook_path;
use crate::pairing::Pairing;
use crate::queue::GroupKey;
use crate::settings::Settings;
use crate::tracker::AutoCreatedTracker;

/// URI scheme of documents backed by local files.
pub const FILE_SCHEME: &str = "file";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentKind {
    /// Plain text document (`.py`, `.md`, ...)
    Plain,
    /// Notebook document
    Notebook,
}

/// A document as reported by the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub kind: DocumentKind,
    pub path: PathBuf,
    pub scheme: String,
}

impl Document {
    /// A local file; `.ipynb` files are notebooks, everything else is text.
    pub fn file(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let is_notebook = path
            .extension()
            .map(|e| e == NOTEBOOK_EXTENSION)
            .unwrap_or(false);
        Self {
            kind: if is_notebook {
                DocumentKind::Notebook
            } else {
                DocumentKind::Plain
            },
            path,
            scheme: FILE_SCHEME.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleEvent {
    Open,
    Save,
    Close,
}

impl fmt::Display for LifecycleEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LifecycleEvent::Open => write!(f, "open"),
            LifecycleEvent::Save => write!(f, "save"),
            LifecycleEvent::Close => write!(f, "close"),
        }
    }
}

/// Why an event led to no Jupytext call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Not a local file
    NotAFile,
    /// Jupytext does not handle this extension
    Unsupported,
    /// No interpreter with Jupytext is bound
    ToolUnavailable,
    /// Legacy Jupytext and the document is not explicitly paired
    NotPaired,
    /// Closed notebook was not created by us
    NotTracked,
    /// The event needs no action
    NothingToDo,
}

/// What handling an event did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "outcome", content = "detail")]
pub enum Outcome {
    Skipped(SkipReason),
    Synced,
    /// Sync materialized the paired notebook at this path
    Created(PathBuf),
    /// Auto-created notebook deleted on close
    Deleted(PathBuf),
    /// Auto-created notebook kept on close
    Retained(PathBuf),
}

/// Routes lifecycle events to pairing operations.
pub struct Dispatcher<J> {
    pairing: Pairing<J>,
    tracker: Arc<AutoCreatedTracker>,
    settings: Settings,
    supported: Vec<String>,
}

impl<J: JupytextCli> Dispatcher<J> {
    pub fn new(pairing: Pairing<J>, tracker: Arc<AutoCreatedTracker>, settings: Settings) -> Self {
        Self {
            pairing,
            tracker,
            settings,
            supported: default_supported_extensions(),
        }
    }

    /// Replace the built-in extension list, e.g. with the tool's own.
    pub fn with_supported_extensions(mut self, supported: Vec<String>) -> Self {
        if !supported.is_empty() {
            self.supported = supported;
        }
        self
    }

    pub fn pairing(&self) -> &Pairing<J> {
        &self.pairing
    }

    pub fn tracker(&self) -> &Arc<AutoCreatedTracker> {
        &self.tracker
    }

    /// Whether the dispatcher would act on `path` at all.
    pub fn handles(&self, path: &Path) -> bool {
        is_supported_path(path, &self.supported)
    }

    /// Handle one lifecycle event. Failures are logged and returned.
    pub async fn handle(&self, event: LifecycleEvent, document: &Document) -> SyncResult<Outcome> {
        let result = self.dispatch(event, document).await;
        match &result {
            Ok(outcome) => debug!(
                "[dispatch] {} {:?}: {:?}",
                event, document.path, outcome
            ),
            Err(e) => error!(
                "[dispatch] {} {:?} failed: {}",
                event, document.path, e
            ),
        }
        result
    }

    async fn dispatch(&self, event: LifecycleEvent, document: &Document) -> SyncResult<Outcome> {
        if document.scheme != FILE_SCHEME {
            return Ok(Outcome::Skipped(SkipReason::NotAFile));
        }
        if !self.handles(&document.path) {
            return Ok(Outcome::Skipped(SkipReason::Unsupported));
        }
        let Some(version) = self.pairing.cli().version() else {
            return Ok(Outcome::Skipped(SkipReason::ToolUnavailable));
        };
        let legacy = !is_supported(&version);
        let path = document.path.as_path();

        match (event, document.kind) {
            (LifecycleEvent::Open, DocumentKind::Plain) => {
                if document_is_notebook(path) {
                    return Ok(Outcome::Skipped(SkipReason::NothingToDo));
                }
                self.open_text(path, legacy).await
            }
            (LifecycleEvent::Open, DocumentKind::Notebook) | (LifecycleEvent::Save, _) => {
                self.guarded_sync(path, legacy).await
            }
            (LifecycleEvent::Close, DocumentKind::Notebook) => self.close_notebook(path).await,
            (LifecycleEvent::Close, DocumentKind::Plain) => {
                Ok(Outcome::Skipped(SkipReason::NothingToDo))
            }
        }
    }

    /// Sync, except that legacy Jupytext first has to confirm an explicit
    /// pairing. Otherwise it would apply the project default pairing to a
    /// file the user never paired.
    async fn guarded_sync(&self, path: &Path, legacy: bool) -> SyncResult<Outcome> {
        if legacy {
            let paired = self
                .pairing
                .read_paired_formats(path)
                .await
                .is_some_and(|f| f.is_paired());
            if !paired {
                info!("[dispatch] Skipping sync of unpaired {:?}", path);
                return Ok(Outcome::Skipped(SkipReason::NotPaired));
            }
        }
        self.pairing.sync(path).await?;
        Ok(Outcome::Synced)
    }

    async fn open_text(&self, path: &Path, legacy: bool) -> SyncResult<Outcome> {
        let formats = if self.settings.auto_create_notebook || legacy {
            self.pairing.read_paired_formats(path).await
        } else {
            None
        };
        let paired = formats.as_ref().is_some_and(|f| f.is_paired());

        if legacy && !paired {
            info!("[dispatch] Skipping sync of unpaired {:?}", path);
            return Ok(Outcome::Skipped(SkipReason::NotPaired));
        }

        let creatable = formats
            .filter(|f| self.settings.auto_create_notebook && paired && f.contains_notebook());
        if let Some(formats) = creatable {
            let notebook = derive_notebook_path(path, &formats)?;
            if !file_exists(&notebook).await {
                self.pairing.sync(path).await?;
                if file_exists(&notebook).await {
                    info!("[dispatch] Created {:?} from {:?}", notebook, path);
                    self.tracker.mark(&notebook).await?;
                    return Ok(Outcome::Created(notebook));
                }
                return Ok(Outcome::Synced);
            }
        }

        self.pairing.sync(path).await?;
        Ok(Outcome::Synced)
    }

    async fn close_notebook(&self, path: &Path) -> SyncResult<Outcome> {
        if !self.tracker.is_marked(path).await {
            return Ok(Outcome::Skipped(SkipReason::NotTracked));
        }

        // The text file must still be paired, or the notebook is the only copy
        let still_paired = self
            .pairing
            .read_paired_formats(path)
            .await
            .is_some_and(|f| f.is_paired());

        if still_paired && self.settings.delete_auto_created_on_close {
            let key = GroupKey::from_path(path)
                .ok_or_else(|| SyncError::InvalidPath(path.to_path_buf()))?;
            let target = path.to_path_buf();
            self.pairing
                .queue()
                .enqueue(key, move || async move {
                    match tokio::fs::remove_file(&target).await {
                        Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e),
                        _ => Ok(()),
                    }
                })
                .await??;
            self.tracker.unmark(path).await?;
            info!("[dispatch] Deleted auto-created {:?}", path);
            return Ok(Outcome::Deleted(path.to_path_buf()));
        }

        self.tracker.unmark(path).await?;
        Ok(Outcome::Retained(path.to_path_buf()))
    }

    /// Locate the notebook paired with `path`, creating it if missing.
    pub async fn open_paired_notebook(&self, path: &Path) -> SyncResult<PathBuf> {
        if document_is_notebook(path) {
            return Ok(path.to_path_buf());
        }
        let formats = self.pairing.try_read_paired_formats(path).await?;
        if !formats.is_paired() || !formats.contains_notebook() {
            return Err(SyncError::MissingNotebookFormat {
                path: path.to_path_buf(),
                formats: formats.to_string(),
            });
        }

        let notebook = derive_notebook_path(path, &formats)?;
        if !file_exists(&notebook).await {
            self.pairing.sync(path).await?;
            if file_exists(&notebook).await {
                self.tracker.mark(&notebook).await?;
            }
        }
        Ok(notebook)
    }
}

fn document_is_notebook(path: &Path) -> bool {
    path.extension()
        .map(|e| e == NOTEBOOK_EXTENSION)
        .unwrap_or(false)
}

async fn file_exists(path: &Path) -> bool {
    tokio::fs::try_exists(path).await.unwrap_or(false)
}
