//! Per-group operation queue.
//!
//! Every Jupytext invocation that reads or writes a pairing goes through
//! here, keyed by the pairing group. Within a group operations run one at a
//! time in the order `enqueue` was called. Groups are independent of each
//! other.
//!
//! A failed or panicking operation never blocks the operations behind it;
//! its outcome only reaches the caller that enqueued it.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use std::sync::{Arc, Mutex as StdMutex};
use std::task::{Context, Poll};

use futures::future::BoxFuture;
use futures::FutureExt;
use log::{debug, error};
use tokio::sync::oneshot;

/// The unit of serialization: a file name up to its first dot.
///
/// Jupytext gives every member of a pairing the same base name, so `nb.py`,
/// `nb.ipynb`, `notebooks/nb.ipynb` and the multi-dot `nb.pct.py` share a
/// key. Unrelated files that agree up to the first dot, in any directory,
/// share one too; they are serialized needlessly but never raced.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GroupKey(String);

impl GroupKey {
    pub fn new(key: impl Into<String>) -> Self {
        GroupKey(key.into())
    }

    /// Key for a file path. `None` if the path has no file name.
    pub fn from_path(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_string_lossy();
        // Leading dots belong to the name (`.hidden.py`)
        let body = name.trim_start_matches('.');
        let prefix = name.len() - body.len();
        let end = body.find('.').map_or(name.len(), |i| prefix + i);
        Some(GroupKey(name[..end].to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Error for an operation that never produced an output.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueueError {
    /// The operation panicked or its task was dropped.
    #[error("Queued operation was abandoned before completing")]
    Abandoned,
}

type Job = BoxFuture<'static, ()>;

/// Queue state for one group.
#[derive(Default)]
struct GroupQueue {
    /// Jobs waiting to run (FIFO)
    pending: VecDeque<Job>,
    /// A worker is draining this group
    running: bool,
}

type SharedGroups = Arc<StdMutex<HashMap<GroupKey, GroupQueue>>>;

/// Serializes operations per [`GroupKey`].
///
/// Cloning is cheap and clones share the same queues.
#[derive(Clone, Default)]
pub struct OperationQueue {
    groups: SharedGroups,
}

impl OperationQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `op` behind everything already queued for `key`.
    ///
    /// The position is fixed when this is called, not when the handle is
    /// awaited. Must be called from within a tokio runtime.
    pub fn enqueue<F, Fut, T>(&self, key: GroupKey, op: F) -> OperationHandle<T>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let job: Job = async move {
            let output = op().await;
            // Caller may have dropped the handle
            let _ = tx.send(output);
        }
        .boxed();

        let start_worker = {
            let mut groups = self.groups.lock().unwrap();
            let group = groups.entry(key.clone()).or_default();
            group.pending.push_back(job);
            debug!(
                "[queue] Enqueued operation for '{}' ({} pending)",
                key,
                group.pending.len()
            );
            if group.running {
                false
            } else {
                group.running = true;
                true
            }
        };

        if start_worker {
            tokio::spawn(drain_group(self.groups.clone(), key));
        }

        OperationHandle { rx }
    }

    /// Number of operations for `key` that have not started yet.
    pub fn pending(&self, key: &GroupKey) -> usize {
        let groups = self.groups.lock().unwrap();
        groups.get(key).map(|g| g.pending.len()).unwrap_or(0)
    }

    /// Whether anything is running or waiting for `key`.
    pub fn is_busy(&self, key: &GroupKey) -> bool {
        let groups = self.groups.lock().unwrap();
        groups.get(key).map(|g| g.running).unwrap_or(false)
    }

    /// Groups that currently have work.
    pub fn active_groups(&self) -> Vec<GroupKey> {
        let groups = self.groups.lock().unwrap();
        let mut keys: Vec<GroupKey> = groups.keys().cloned().collect();
        keys.sort();
        keys
    }
}

/// Run the jobs queued for `key` one at a time until the group is empty.
async fn drain_group(groups: SharedGroups, key: GroupKey) {
    loop {
        let job = {
            let mut groups = groups.lock().unwrap();
            let Some(group) = groups.get_mut(&key) else {
                return;
            };
            match group.pending.pop_front() {
                Some(job) => job,
                None => {
                    // Idle groups are dropped so the map stays small
                    groups.remove(&key);
                    debug!("[queue] Group '{}' is idle", key);
                    return;
                }
            }
        };

        // Own task per job so a panic only loses that job
        if let Err(e) = tokio::spawn(job).await {
            error!("[queue] Operation for '{}' aborted: {}", key, e);
        }
    }
}

/// Resolves with the output of one queued operation.
#[must_use = "dropping the handle discards the operation's result"]
pub struct OperationHandle<T> {
    rx: oneshot::Receiver<T>,
}

impl<T> Future for OperationHandle<T> {
    type Output = Result<T, QueueError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|r| r.map_err(|_| QueueError::Abandoned))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    fn key(s: &str) -> GroupKey {
        GroupKey::new(s)
    }

    #[test]
    fn test_group_key_from_path_strips_dir_and_extension() {
        assert_eq!(
            GroupKey::from_path(Path::new("/proj/scripts/nb.py")),
            Some(key("nb"))
        );
        assert_eq!(
            GroupKey::from_path(Path::new("/proj/notebooks/nb.ipynb")),
            Some(key("nb"))
        );
        assert_eq!(GroupKey::from_path(Path::new("nb")), Some(key("nb")));
        assert_eq!(GroupKey::from_path(Path::new("/")), None);
    }

    #[test]
    fn test_group_key_joins_multi_dot_members() {
        assert_eq!(
            GroupKey::from_path(Path::new("/proj/x.nb.py")),
            GroupKey::from_path(Path::new("/proj/x.ipynb"))
        );
        assert_eq!(
            GroupKey::from_path(Path::new("/proj/a.b.py")),
            GroupKey::from_path(Path::new("/proj/a.b.ipynb"))
        );
        assert_eq!(
            GroupKey::from_path(Path::new("/proj/.hidden.py")),
            Some(key(".hidden"))
        );
    }

    #[tokio::test]
    async fn test_handle_resolves_with_own_output() {
        let queue = OperationQueue::new();
        let a = queue.enqueue(key("g"), || async { 1 });
        let b = queue.enqueue(key("g"), || async { 2 });
        assert_eq!(b.await, Ok(2));
        assert_eq!(a.await, Ok(1));
    }

    #[tokio::test]
    async fn test_same_group_runs_in_enqueue_order_despite_failure() {
        let queue = OperationQueue::new();
        let log = Arc::new(StdMutex::new(Vec::new()));
        let running = Arc::new(AtomicBool::new(false));

        let mut handles = Vec::new();
        for i in 0..4u32 {
            let log = log.clone();
            let running = running.clone();
            handles.push(queue.enqueue(key("g"), move || async move {
                assert!(!running.swap(true, Ordering::SeqCst), "overlapping operations");
                log.lock().unwrap().push(i);
                // Earlier operations take longer, so any reordering would show
                tokio::time::sleep(Duration::from_millis(u64::from(4 - i) * 10)).await;
                running.store(false, Ordering::SeqCst);
                if i == 0 {
                    Err(format!("op {i} failed"))
                } else {
                    Ok(i)
                }
            }));
        }

        let mut results = Vec::new();
        for h in handles {
            results.push(h.await.unwrap());
        }

        assert_eq!(*log.lock().unwrap(), vec![0, 1, 2, 3]);
        assert_eq!(results[0], Err("op 0 failed".to_string()));
        assert_eq!(results[3], Ok(3));
    }

    #[tokio::test]
    async fn test_distinct_groups_do_not_wait_on_each_other() {
        let queue = OperationQueue::new();
        let (release_tx, release_rx) = oneshot::channel::<()>();

        let slow = queue.enqueue(key("g1"), move || async move {
            release_rx.await.ok();
            "slow"
        });
        let fast = queue.enqueue(key("g2"), || async { "fast" });

        // Would hang if g2 waited on g1
        let fast = tokio::time::timeout(Duration::from_secs(5), fast)
            .await
            .expect("g2 blocked behind g1");
        assert_eq!(fast, Ok("fast"));
        assert!(queue.is_busy(&key("g1")));

        release_tx.send(()).unwrap();
        assert_eq!(slow.await, Ok("slow"));
    }

    #[tokio::test]
    async fn test_panic_does_not_poison_group() {
        let queue = OperationQueue::new();
        let boom = queue.enqueue(key("g"), || async {
            panic!("boom");
        });
        let after = queue.enqueue(key("g"), || async { 42 });

        assert_eq!(boom.await, Err::<(), _>(QueueError::Abandoned));
        assert_eq!(after.await, Ok(42));
    }

    #[tokio::test]
    async fn test_pending_counts_waiting_operations() {
        let queue = OperationQueue::new();
        let (release_tx, release_rx) = oneshot::channel::<()>();
        let (started_tx, started_rx) = oneshot::channel::<()>();

        let first = queue.enqueue(key("g"), move || async move {
            started_tx.send(()).ok();
            release_rx.await.ok();
        });
        let second = queue.enqueue(key("g"), || async {});
        started_rx.await.unwrap();

        assert_eq!(queue.pending(&key("g")), 1);
        assert_eq!(queue.active_groups(), vec![key("g")]);

        release_tx.send(()).unwrap();
        first.await.unwrap();
        second.await.unwrap();
    }

    #[tokio::test]
    async fn test_idle_group_is_removed() {
        let queue = OperationQueue::new();
        queue.enqueue(key("g"), || async {}).await.unwrap();

        // The worker removes the group right after the last job settles
        for _ in 0..100 {
            if queue.active_groups().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(queue.active_groups().is_empty());
        assert!(!queue.is_busy(&key("g")));
        assert_eq!(queue.pending(&key("g")), 0);
    }

    #[tokio::test]
    async fn test_dropped_handle_still_runs_operation() {
        let queue = OperationQueue::new();
        let ran = Arc::new(AtomicBool::new(false));
        let flag = ran.clone();
        drop(queue.enqueue(key("g"), move || async move {
            flag.store(true, Ordering::SeqCst);
        }));
        queue.enqueue(key("g"), || async {}).await.unwrap();
        assert!(ran.load(Ordering::SeqCst));
    }
}
