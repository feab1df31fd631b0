//! Directory change notifications for the `created` partition.
//!
//! Wraps a platform file watcher around a namespace's `created/` directory
//! and translates raw filesystem events into queue events: a record that
//! just appeared means a task was created; a record that just disappeared
//! means it was locked (moved away) or removed. Classification works by
//! probing existence immediately after the event, the only portable signal.
//!
//! Watch delivery is platform-dependent and can silently drop events under
//! load, so the dispatch loop never relies on these notifications for
//! correctness - its timed poll of the queue is load-bearing, and this
//! notifier only shortens the latency between task creation and pickup.

use std::path::PathBuf;

use notify::event::ModifyKind;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::types::Namespace;

use super::record::TaskState;
use super::store::QueueStore;

/// Errors raised while setting up the directory watch.
#[derive(Debug, Error)]
pub enum WatchError {
    /// The underlying watcher could not be created or attached.
    #[error("directory watch failed: {0}")]
    Notify(#[from] notify::Error),
}

/// Result type for watch operations.
pub type Result<T> = std::result::Result<T, WatchError>;

/// What happened to a record in the watched partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    /// A record appeared: a task was enqueued.
    Created,
    /// A record disappeared: a task was locked or deleted.
    Removed,
}

/// A single observed change in a namespace's `created` partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueEvent {
    /// Path of the record the event refers to.
    pub path: PathBuf,
    /// Whether the record appeared or disappeared.
    pub kind: ChangeKind,
    /// The namespace whose partition produced the event.
    pub namespace: Namespace,
}

/// Live watch over one namespace's `created` partition.
///
/// Dropping the notifier stops the watch.
pub struct ChangeNotifier {
    // Held for its Drop; the watch ends when the watcher is dropped.
    _watcher: RecommendedWatcher,
    events: mpsc::UnboundedReceiver<QueueEvent>,
}

impl ChangeNotifier {
    /// Starts watching the `created` partition of `namespace`.
    ///
    /// The partition must exist (run [`QueueStore::init`] first).
    pub fn watch(store: &QueueStore, namespace: &Namespace) -> Result<Self> {
        let dir = store.partition_dir(namespace, TaskState::Created);
        let (tx, events) = mpsc::unbounded_channel();
        let ns = namespace.clone();

        let mut watcher =
            notify::recommended_watcher(move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    if !is_rename_kind(&event.kind) {
                        return;
                    }
                    for path in event.paths {
                        let kind = if path.exists() {
                            ChangeKind::Created
                        } else {
                            ChangeKind::Removed
                        };
                        // Receiver gone means the worker is shutting down;
                        // nothing left to notify.
                        let _ = tx.send(QueueEvent {
                            path,
                            kind,
                            namespace: ns.clone(),
                        });
                    }
                }
                Err(error) => warn!(%error, "directory watch error"),
            })?;

        watcher.watch(&dir, RecursiveMode::NonRecursive)?;
        debug!(dir = %dir.display(), "watching queue partition");

        Ok(ChangeNotifier {
            _watcher: watcher,
            events,
        })
    }

    /// Waits for the next observed change. Returns `None` once the watch
    /// has stopped.
    pub async fn next(&mut self) -> Option<QueueEvent> {
        self.events.recv().await
    }
}

/// True for event kinds that signal a directory entry coming or going:
/// creations, deletions, and renames. Content writes (`Modify(Data)`) and
/// metadata churn are noise here.
fn is_rename_kind(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Create(_) | EventKind::Remove(_) | EventKind::Modify(ModifyKind::Name(_))
    )
}
