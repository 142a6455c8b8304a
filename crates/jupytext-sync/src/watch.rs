//! Filesystem watching for hosts without editor events.
//!
//! Debounced file changes under a directory are reported to the
//! [`Dispatcher`] as saves. Jupytext rewrites every member of a pairing when
//! it syncs, so changes in a group that is busy or was synced moments ago are
//! treated as our own echo and dropped.

use std::collections::HashMap;
use std::future::Future;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use log::{debug, error, info, warn};
use notify_debouncer_mini::DebounceEventResult;

use crate::dispatcher::{Dispatcher, Document, LifecycleEvent};
use crate::jupytext::JupytextCli;
use crate::queue::GroupKey;

/// Debounce window for filesystem events.
pub const DEBOUNCE: Duration = Duration::from_millis(500);

/// How long after a sync changes in the same group are ignored.
pub const QUIET_PERIOD: Duration = Duration::from_secs(2);

/// Directories that never hold documents worth syncing.
const IGNORED_DIRS: &[&str] = &[".git", ".ipynb_checkpoints", "__pycache__", ".venv", "node_modules"];

/// Groups synced recently, for echo suppression.
#[derive(Debug)]
pub struct RecentSyncs {
    window: Duration,
    synced_at: HashMap<GroupKey, Instant>,
}

impl RecentSyncs {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            synced_at: HashMap::new(),
        }
    }

    pub fn record(&mut self, key: GroupKey, at: Instant) {
        self.synced_at.insert(key, at);
    }

    /// Whether `key` was synced within the window before `now`.
    pub fn is_recent(&self, key: &GroupKey, now: Instant) -> bool {
        self.synced_at
            .get(key)
            .is_some_and(|at| now.saturating_duration_since(*at) < self.window)
    }

    /// Drop entries older than the window.
    pub fn prune(&mut self, now: Instant) {
        let window = self.window;
        self.synced_at
            .retain(|_, at| now.saturating_duration_since(*at) < window);
    }
}

/// Why a change was not turned into a save.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Suppressed {
    /// A Jupytext operation on the group is running or queued
    Busy,
    /// The group was synced within the quiet period
    RecentlySynced,
}

/// Decide whether a change in group `key` should be dispatched.
pub fn suppression(
    busy: bool,
    recent: &RecentSyncs,
    key: &GroupKey,
    now: Instant,
) -> Option<Suppressed> {
    if busy {
        Some(Suppressed::Busy)
    } else if recent.is_recent(key, now) {
        Some(Suppressed::RecentlySynced)
    } else {
        None
    }
}

fn is_ignored(path: &Path) -> bool {
    path.components().any(|c| match c {
        Component::Normal(name) => IGNORED_DIRS.iter().any(|d| name == *d),
        _ => false,
    })
}

/// Reduce a batch of changed paths to at most one path per group.
///
/// The first path seen for a group is kept.
pub fn group_batch<I>(paths: I, accept: impl Fn(&Path) -> bool) -> Vec<(GroupKey, PathBuf)>
where
    I: IntoIterator<Item = PathBuf>,
{
    let mut batch: Vec<(GroupKey, PathBuf)> = Vec::new();
    for path in paths {
        if is_ignored(&path) || !accept(&path) {
            continue;
        }
        let Some(key) = GroupKey::from_path(&path) else {
            continue;
        };
        if batch.iter().any(|(k, _)| *k == key) {
            continue;
        }
        batch.push((key, path));
    }
    batch
}

/// Watch `root` recursively until `shutdown` resolves.
pub async fn watch<J, S>(dispatcher: Arc<Dispatcher<J>>, root: &Path, shutdown: S) -> anyhow::Result<()>
where
    J: JupytextCli,
    S: Future<Output = ()>,
{
    // Bridge from the notify callback thread
    let (tx, mut rx) = tokio::sync::mpsc::channel::<DebounceEventResult>(16);

    let mut debouncer =
        notify_debouncer_mini::new_debouncer(DEBOUNCE, move |res: DebounceEventResult| {
            let _ = tx.blocking_send(res);
        })
        .context("Failed to create file watcher")?;

    debouncer
        .watcher()
        .watch(root, notify::RecursiveMode::Recursive)
        .with_context(|| format!("Failed to watch {:?}", root))?;

    info!("[watch] Watching {:?}", root);

    let mut recent = RecentSyncs::new(QUIET_PERIOD);
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            Some(result) = rx.recv() => {
                match result {
                    Ok(events) => {
                        let paths = events.into_iter().map(|e| e.path);
                        let batch = group_batch(paths, |p| p.is_file() && dispatcher.handles(p));
                        handle_batch(&dispatcher, batch, &mut recent).await;
                    }
                    Err(e) => {
                        warn!("[watch] Watcher error: {}", e);
                    }
                }
            }
            _ = &mut shutdown => {
                info!("[watch] Shutting down");
                break;
            }
        }
    }

    Ok(())
}

async fn handle_batch<J: JupytextCli>(
    dispatcher: &Arc<Dispatcher<J>>,
    batch: Vec<(GroupKey, PathBuf)>,
    recent: &mut RecentSyncs,
) {
    let now = Instant::now();
    recent.prune(now);

    let mut tasks = Vec::new();
    for (key, path) in batch {
        let busy = dispatcher.pairing().queue().is_busy(&key);
        match suppression(busy, recent, &key, now) {
            Some(Suppressed::Busy) => {
                debug!("[watch] Ignoring echo for {:?}", path);
                continue;
            }
            // Could be a user edit as well as our own write; save again to sync it
            Some(Suppressed::RecentlySynced) => {
                info!(
                    "[watch] Not syncing {:?}: its group was synced less than {:?} ago",
                    path, recent.window
                );
                continue;
            }
            None => {}
        }
        let dispatcher = dispatcher.clone();
        tasks.push(tokio::spawn(async move {
            let document = Document::file(&path);
            let result = dispatcher.handle(LifecycleEvent::Save, &document).await;
            (key, result)
        }));
    }

    for task in tasks {
        match task.await {
            // Failures are logged by the dispatcher
            Ok((key, _)) => recent.record(key, Instant::now()),
            Err(e) => error!("[watch] Save handler panicked: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_group_batch_dedupes_by_stem() {
        let paths = vec![
            PathBuf::from("/p/nb.py"),
            PathBuf::from("/p/nb.ipynb"),
            PathBuf::from("/p/other.md"),
        ];
        let batch = group_batch(paths, |_| true);
        assert_eq!(
            batch,
            vec![
                (GroupKey::new("nb"), PathBuf::from("/p/nb.py")),
                (GroupKey::new("other"), PathBuf::from("/p/other.md")),
            ]
        );
    }

    #[test]
    fn test_group_batch_skips_ignored_dirs() {
        let paths = vec![
            PathBuf::from("/p/.ipynb_checkpoints/nb-checkpoint.ipynb"),
            PathBuf::from("/p/.git/HEAD"),
            PathBuf::from("/p/keep.py"),
        ];
        let batch = group_batch(paths, |_| true);
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].1, PathBuf::from("/p/keep.py"));
    }

    #[test]
    fn test_group_batch_applies_filter() {
        let paths = vec![PathBuf::from("/p/a.py"), PathBuf::from("/p/b.txt")];
        let batch = group_batch(paths, |p| p.extension().is_some_and(|e| e == "py"));
        assert_eq!(batch.len(), 1);
    }

    #[test]
    fn test_suppression_reasons() {
        let mut recent = RecentSyncs::new(Duration::from_secs(2));
        let key = GroupKey::new("nb");
        let start = Instant::now();

        assert_eq!(suppression(false, &recent, &key, start), None);
        assert_eq!(suppression(true, &recent, &key, start), Some(Suppressed::Busy));

        recent.record(key.clone(), start);
        let soon = start + Duration::from_millis(500);
        assert_eq!(
            suppression(false, &recent, &key, soon),
            Some(Suppressed::RecentlySynced)
        );
        assert_eq!(suppression(true, &recent, &key, soon), Some(Suppressed::Busy));

        let later = start + Duration::from_secs(3);
        assert_eq!(suppression(false, &recent, &key, later), None);
    }

    #[test]
    fn test_recent_syncs_window() {
        let mut recent = RecentSyncs::new(Duration::from_secs(2));
        let key = GroupKey::new("nb");
        let start = Instant::now();

        assert!(!recent.is_recent(&key, start));
        recent.record(key.clone(), start);
        assert!(recent.is_recent(&key, start + Duration::from_secs(1)));
        assert!(!recent.is_recent(&key, start + Duration::from_secs(3)));

        recent.prune(start + Duration::from_secs(3));
        assert!(recent.synced_at.is_empty());
    }
}
