//! Durable task queue backed by a filesystem directory tree.
//!
//! Each namespace owns three partition directories, one per lifecycle state:
//!
//! ```text
//! <queue-root>/<namespace>/created/<stamp>.<session>
//! <queue-root>/<namespace>/locked/<stamp>.<session>
//! <queue-root>/<namespace>/released/<stamp>.<session>
//! ```
//!
//! A record lives in exactly one partition at any instant, and moving it
//! between states is a single atomic rename. The filesystem's rename
//! guarantee is the sole concurrency primitive: two workers racing to lock
//! the same record will have exactly one rename succeed.
//!
//! # Crash Safety
//!
//! - Record payloads are written atomically (temp file in the namespace
//!   root + fsync + rename into the partition + directory fsync), so a
//!   crash leaves either no record or a complete one.
//! - A crash mid-transition leaves the record intact in exactly one of the
//!   two partitions; there is no copy-then-delete window.
//! - Orphaned `.tmp` files in the namespace root are never picked up as
//!   records.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::Utc;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::warn;

use crate::types::{Namespace, SessionId, TaskId};

use super::record::{TaskRecord, TaskRef, TaskState};

/// Errors that can occur during queue store operations.
#[derive(Debug, Error)]
pub enum QueueError {
    /// Filesystem operation failed (permissions, disk full, ...).
    #[error("storage error: {0}")]
    Storage(#[from] io::Error),

    /// The record is absent from the location the reference names.
    #[error("record not found: {}", .0.display())]
    NotFound(PathBuf),

    /// The record exists but its content is not well-formed JSON.
    #[error("corrupt record at {}: {source}", .path.display())]
    CorruptRecord {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// A transition was attempted from a state that does not permit it.
    /// Always a programming or race error; never silently retried.
    #[error("{op} requires a {required} record, got {actual}: {task}")]
    InvalidState {
        op: &'static str,
        required: TaskState,
        actual: TaskState,
        task: String,
    },

    /// A session id that cannot safely become a file name.
    #[error("session id contains unsafe characters: {0:?}")]
    InvalidSessionId(String),

    /// A namespace that cannot safely become a directory name.
    #[error("namespace contains unsafe characters: {0:?}")]
    InvalidNamespace(String),
}

/// Result type for queue store operations.
pub type Result<T> = std::result::Result<T, QueueError>;

/// Handle to the queue directory tree.
///
/// Cheap to clone; every operation resolves paths from the configured root,
/// so distinct stores over distinct temporary directories are fully isolated.
#[derive(Debug, Clone)]
pub struct QueueStore {
    root: PathBuf,
}

impl QueueStore {
    /// Creates a store rooted at `root`. Call [`QueueStore::init`] per
    /// namespace before enqueuing.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        QueueStore { root: root.into() }
    }

    /// Ensures the three partition directories exist for a namespace.
    /// Idempotent. Returns the namespace directory.
    pub fn init(&self, namespace: &Namespace) -> Result<PathBuf> {
        validate_name(namespace.as_str()).map_err(QueueError::InvalidNamespace)?;

        let ns_dir = self.root.join(namespace.as_str());
        for state in TaskState::all() {
            std::fs::create_dir_all(ns_dir.join(state.dir_name()))?;
        }
        Ok(ns_dir)
    }

    /// Writes a new record into the `created` partition and returns its
    /// reference.
    ///
    /// The task id embeds the creation timestamp (epoch millis); if a record
    /// with the same stamp and session already exists, the stamp is bumped
    /// until the name is free, keeping ids unique and FIFO order intact.
    pub fn create(
        &self,
        namespace: &Namespace,
        session: &SessionId,
        payload: Map<String, Value>,
    ) -> Result<TaskRef> {
        validate_name(namespace.as_str()).map_err(QueueError::InvalidNamespace)?;
        validate_name(session.as_str()).map_err(QueueError::InvalidSessionId)?;

        let mut stamp_ms = epoch_millis();
        let mut id = TaskId::new(stamp_ms, session.clone());
        let created_dir = self.partition_dir(namespace, TaskState::Created);
        while created_dir.join(id.file_name()).exists() {
            stamp_ms += 1;
            id = TaskId::new(stamp_ms, session.clone());
        }

        let task = TaskRef::new(namespace.clone(), TaskState::Created, id);
        let record = TaskRecord::new(session.clone(), payload);
        self.write_record(&task, &serde_json::to_value(&record).map_err(io::Error::other)?)?;
        Ok(task)
    }

    /// Reads and deserializes the record the reference points at.
    pub fn read(&self, task: &TaskRef) -> Result<TaskRecord> {
        let path = self.path_of(task);
        let bytes = read_file(&path)?;
        serde_json::from_slice(&bytes).map_err(|source| QueueError::CorruptRecord { path, source })
    }

    /// Atomically moves a record from `created` to `locked`.
    ///
    /// Locking a record that is not in `created` is a no-op returning the
    /// unchanged reference: duplicate dispatch attempts are expected (watch
    /// events and polls can race) and must be tolerated.
    pub fn lock(&self, task: &TaskRef) -> Result<TaskRef> {
        if task.state != TaskState::Created {
            warn!(task = %task, "refusing to lock a non-queued record");
            return Ok(task.clone());
        }
        self.transition(task, TaskState::Locked)
    }

    /// Atomically moves a `locked` record back to `created`, re-issuing the
    /// task to the queue. No-op if the record is not locked.
    pub fn unlock(&self, task: &TaskRef) -> Result<TaskRef> {
        if task.state != TaskState::Locked {
            warn!(task = %task, "refusing to unlock a record that is not locked");
            return Ok(task.clone());
        }
        self.transition(task, TaskState::Created)
    }

    /// Merges `patch` into a `locked` record, field by field (latest value
    /// per key wins; no deep merge), bumps `updatedAt`, and writes the
    /// record back atomically. Returns the merged record.
    pub fn update(&self, task: &TaskRef, patch: &Map<String, Value>) -> Result<TaskRecord> {
        self.require_state(task, "update", TaskState::Locked)?;

        let path = self.path_of(task);
        let bytes = read_file(&path)?;
        let mut value: Value = serde_json::from_slice(&bytes)
            .map_err(|source| QueueError::CorruptRecord { path: path.clone(), source })?;

        let obj = value.as_object_mut().ok_or_else(|| QueueError::CorruptRecord {
            path: path.clone(),
            source: <serde_json::Error as serde::de::Error>::custom("record is not a JSON object"),
        })?;
        for (key, field) in patch {
            obj.insert(key.clone(), field.clone());
        }
        obj.insert("updatedAt".to_string(), Value::String(Utc::now().to_rfc3339()));

        self.write_record(task, &value)?;
        serde_json::from_value(value).map_err(|source| QueueError::CorruptRecord { path, source })
    }

    /// Atomically moves a record from `locked` to `released`.
    pub fn release(&self, task: &TaskRef) -> Result<TaskRef> {
        self.require_state(task, "release", TaskState::Locked)?;
        self.transition(task, TaskState::Released)
    }

    /// Deletes a `released` record.
    pub fn remove(&self, task: &TaskRef) -> Result<()> {
        self.require_state(task, "remove", TaskState::Released)?;

        let path = self.path_of(task);
        std::fs::remove_file(&path).map_err(|e| not_found_or_storage(e, &path))?;
        fsync_dir(&self.partition_dir(&task.namespace, task.state))?;
        Ok(())
    }

    /// Lists queued tasks in creation (FIFO) order.
    ///
    /// Directory read order is arbitrary, so entries are sorted by task id
    /// (stamp, then session). Files that don't parse as task ids are
    /// skipped.
    pub fn find_tasks(&self, namespace: &Namespace) -> Result<Vec<TaskRef>> {
        let created_dir = self.partition_dir(namespace, TaskState::Created);
        if !created_dir.exists() {
            return Ok(Vec::new());
        }

        let mut ids = Vec::new();
        for entry in std::fs::read_dir(&created_dir)? {
            let entry = entry?;
            if let Some(id) = entry.file_name().to_str().and_then(TaskId::parse) {
                ids.push(id);
            }
        }
        ids.sort();

        Ok(ids
            .into_iter()
            .map(|id| TaskRef::new(namespace.clone(), TaskState::Created, id))
            .collect())
    }

    /// Returns the oldest queued task, if any.
    pub fn find_next_task(&self, namespace: &Namespace) -> Result<Option<TaskRef>> {
        Ok(self.find_tasks(namespace)?.into_iter().next())
    }

    /// Absolute path of the record the reference points at.
    pub fn path_of(&self, task: &TaskRef) -> PathBuf {
        self.root.join(task.rel_path())
    }

    /// The partition directory for a (namespace, state) pair.
    pub fn partition_dir(&self, namespace: &Namespace, state: TaskState) -> PathBuf {
        self.root.join(namespace.as_str()).join(state.dir_name())
    }

    // ─── Internal Helpers ─────────────────────────────────────────────────────

    fn require_state(&self, task: &TaskRef, op: &'static str, required: TaskState) -> Result<()> {
        if task.state != required {
            return Err(QueueError::InvalidState {
                op,
                required,
                actual: task.state,
                task: task.to_string(),
            });
        }
        Ok(())
    }

    /// Renames the record into the target partition and fsyncs both
    /// directory entries so the move survives power loss.
    fn transition(&self, task: &TaskRef, to: TaskState) -> Result<TaskRef> {
        let moved = task.with_state(to);
        let from_path = self.path_of(task);
        let to_path = self.path_of(&moved);

        std::fs::rename(&from_path, &to_path).map_err(|e| not_found_or_storage(e, &from_path))?;
        fsync_dir(&self.partition_dir(&moved.namespace, moved.state))?;
        fsync_dir(&self.partition_dir(&task.namespace, task.state))?;
        Ok(moved)
    }

    /// Writes record content atomically: temp file in the namespace root,
    /// fsync, rename onto the final path, fsync the partition directory.
    ///
    /// The temp file lives outside the partition directories so the change
    /// notifier (which watches `created/`) sees a single rename per record,
    /// and partial writes never masquerade as queued tasks.
    fn write_record(&self, task: &TaskRef, value: &Value) -> Result<()> {
        let json = serde_json::to_vec(value).map_err(io::Error::other)?;
        let final_path = self.path_of(task);
        let tmp_path = self
            .root
            .join(task.namespace.as_str())
            .join(format!("{}.tmp", task.id.file_name()));

        {
            let mut file = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(&tmp_path)?;
            file.write_all(&json)?;
            fsync_file(&file)?;
        }

        std::fs::rename(&tmp_path, &final_path)?;
        fsync_dir(&self.partition_dir(&task.namespace, task.state))?;
        Ok(())
    }
}

/// Reads a file, mapping a missing file to [`QueueError::NotFound`] and any
/// other failure to [`QueueError::Storage`].
fn read_file(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).map_err(|e| not_found_or_storage(e, path))
}

fn not_found_or_storage(err: io::Error, path: &Path) -> QueueError {
    if err.kind() == io::ErrorKind::NotFound {
        QueueError::NotFound(path.to_path_buf())
    } else {
        QueueError::Storage(err)
    }
}

/// Validates that a caller-supplied name is safe to use as a path segment.
///
/// Rejected: empty strings, path separators, NUL bytes, and leading dots
/// (hidden files, `.` and `..` traversal).
fn validate_name(name: &str) -> std::result::Result<(), String> {
    if name.is_empty()
        || name.contains('/')
        || name.contains('\\')
        || name.contains('\0')
        || name.starts_with('.')
    {
        return Err(name.to_string());
    }
    Ok(())
}

/// Syncs a file's contents to disk before the rename that publishes it.
fn fsync_file(file: &File) -> io::Result<()> {
    file.sync_all()
}

/// Syncs a directory so entry creations, renames, and deletions are durable.
/// Without this, a power loss can revert a rename even though the file
/// contents were synced.
fn fsync_dir(dir: &Path) -> io::Result<()> {
    let handle = OpenOptions::new().read(true).open(dir)?;
    handle.sync_all()
}

fn epoch_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;
    use tempfile::tempdir;

    fn ns() -> Namespace {
        Namespace::new("testapi")
    }

    fn payload(fields: &[(&str, &str)]) -> Map<String, Value> {
        fields
            .iter()
            .map(|(k, v)| (k.to_string(), json!(v)))
            .collect()
    }

    fn store_with_task(fields: &[(&str, &str)]) -> (tempfile::TempDir, QueueStore, TaskRef) {
        let dir = tempdir().unwrap();
        let store = QueueStore::new(dir.path());
        store.init(&ns()).unwrap();
        let task = store
            .create(&ns(), &SessionId::new("sess-1"), payload(fields))
            .unwrap();
        (dir, store, task)
    }

    // ─── Init & Create ────────────────────────────────────────────────────────

    #[test]
    fn init_creates_partitions_and_is_idempotent() {
        let dir = tempdir().unwrap();
        let store = QueueStore::new(dir.path());

        let ns_dir = store.init(&ns()).unwrap();
        assert!(ns_dir.join("created").is_dir());
        assert!(ns_dir.join("locked").is_dir());
        assert!(ns_dir.join("released").is_dir());

        // Second init over the same tree succeeds
        store.init(&ns()).unwrap();
    }

    #[test]
    fn init_rejects_unsafe_namespace() {
        let dir = tempdir().unwrap();
        let store = QueueStore::new(dir.path());
        let result = store.init(&Namespace::new("../escape"));
        assert!(matches!(result, Err(QueueError::InvalidNamespace(_))));
    }

    #[test]
    fn created_task_appears_exactly_once_under_created() {
        let (_dir, store, task) = store_with_task(&[("test", "hello")]);

        assert_eq!(task.state, TaskState::Created);
        assert!(store.path_of(&task).exists());

        let tasks = store.find_tasks(&ns()).unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0], task);
    }

    #[test]
    fn create_then_read_roundtrips_payload_plus_bookkeeping() {
        let (_dir, store, task) = store_with_task(&[("test", "hello"), ("refresh_token", "rt")]);

        let record = store.read(&task).unwrap();
        assert_eq!(record.session_id.as_str(), "sess-1");
        assert_eq!(record.str_field("test"), Some("hello"));
        assert_eq!(record.refresh_token(), Some("rt"));
        assert_eq!(record.created_at, record.updated_at);

        // Exactly the supplied fields plus the three bookkeeping fields
        let raw: Value =
            serde_json::from_slice(&std::fs::read(store.path_of(&task)).unwrap()).unwrap();
        assert_eq!(raw.as_object().unwrap().len(), 5);
    }

    #[test]
    fn create_rejects_path_traversal_session_ids() {
        let dir = tempdir().unwrap();
        let store = QueueStore::new(dir.path());
        store.init(&ns()).unwrap();

        for bad in ["../../../etc/passwd", "a\\b", "", ".hidden", ".", "..", "nul\0byte"] {
            let result = store.create(&ns(), &SessionId::new(bad), Map::new());
            assert!(
                matches!(result, Err(QueueError::InvalidSessionId(_))),
                "expected rejection for {bad:?}"
            );
        }
    }

    #[test]
    fn rapid_creates_get_distinct_ids() {
        let dir = tempdir().unwrap();
        let store = QueueStore::new(dir.path());
        store.init(&ns()).unwrap();

        let session = SessionId::new("same-session");
        let a = store.create(&ns(), &session, Map::new()).unwrap();
        let b = store.create(&ns(), &session, Map::new()).unwrap();
        assert_ne!(a.id, b.id);
        assert!(a.id < b.id);
    }

    // ─── Lock / Unlock ────────────────────────────────────────────────────────

    #[test]
    fn lock_moves_record_without_touching_content() {
        let (_dir, store, task) = store_with_task(&[("test", "hello")]);

        let locked = store.lock(&task).unwrap();
        assert_eq!(locked.state, TaskState::Locked);
        assert_eq!(locked.id, task.id);
        assert!(!store.path_of(&task).exists());
        assert!(store.path_of(&locked).exists());

        // Lock changes location, not content
        let record = store.read(&locked).unwrap();
        assert_eq!(record.session_id.as_str(), "sess-1");
        assert_eq!(record.updated_at, record.created_at);
    }

    #[test]
    fn lock_on_locked_record_is_noop() {
        let (_dir, store, task) = store_with_task(&[]);
        let locked = store.lock(&task).unwrap();

        let again = store.lock(&locked).unwrap();
        assert_eq!(again, locked);
        assert!(store.path_of(&locked).exists());
    }

    #[test]
    fn unlock_reissues_task_to_queue() {
        let (_dir, store, task) = store_with_task(&[]);
        let locked = store.lock(&task).unwrap();

        let unlocked = store.unlock(&locked).unwrap();
        assert_eq!(unlocked.state, TaskState::Created);
        assert_eq!(unlocked, task);
        assert!(store.path_of(&unlocked).exists());
        assert_eq!(store.find_tasks(&ns()).unwrap().len(), 1);
    }

    #[test]
    fn unlock_on_queued_record_is_noop() {
        let (_dir, store, task) = store_with_task(&[]);
        let result = store.unlock(&task).unwrap();
        assert_eq!(result, task);
    }

    #[test]
    fn locked_tasks_are_invisible_to_find_tasks() {
        let (_dir, store, task) = store_with_task(&[]);
        store.lock(&task).unwrap();
        assert!(store.find_tasks(&ns()).unwrap().is_empty());
        assert!(store.find_next_task(&ns()).unwrap().is_none());
    }

    // ─── Update ───────────────────────────────────────────────────────────────

    #[test]
    fn update_merges_shallow_and_bumps_updated_at() {
        let (_dir, store, task) = store_with_task(&[("status", "new"), ("keep", "me")]);
        let locked = store.lock(&task).unwrap();

        let before = store.read(&locked).unwrap();
        let merged = store
            .update(&locked, &payload(&[("status", "running"), ("extra", "field")]))
            .unwrap();

        assert_eq!(merged.str_field("status"), Some("running"));
        assert_eq!(merged.str_field("keep"), Some("me"));
        assert_eq!(merged.str_field("extra"), Some("field"));
        assert!(merged.updated_at > before.updated_at);
        assert_eq!(merged.created_at, before.created_at);

        // And the merge is durable
        let reread = store.read(&locked).unwrap();
        assert_eq!(reread.str_field("status"), Some("running"));
    }

    #[test]
    fn update_on_non_locked_record_fails_and_leaves_file_untouched() {
        let (_dir, store, task) = store_with_task(&[("status", "new")]);
        let bytes_before = std::fs::read(store.path_of(&task)).unwrap();

        let result = store.update(&task, &payload(&[("status", "sneaky")]));
        assert!(matches!(
            result,
            Err(QueueError::InvalidState { op: "update", .. })
        ));

        let bytes_after = std::fs::read(store.path_of(&task)).unwrap();
        assert_eq!(bytes_before, bytes_after);
    }

    #[test]
    fn repeated_updates_strictly_increase_updated_at() {
        let (_dir, store, task) = store_with_task(&[]);
        let locked = store.lock(&task).unwrap();

        let first = store.update(&locked, &payload(&[("n", "1")])).unwrap();
        let second = store.update(&locked, &payload(&[("n", "2")])).unwrap();
        assert!(second.updated_at > first.updated_at);
    }

    // ─── Release / Remove ─────────────────────────────────────────────────────

    #[test]
    fn release_requires_locked() {
        let (_dir, store, task) = store_with_task(&[]);

        for _ in 0..2 {
            let result = store.release(&task);
            assert!(matches!(
                result,
                Err(QueueError::InvalidState { op: "release", .. })
            ));
            // Illegal calls keep failing and the file keeps existing
            assert!(store.path_of(&task).exists());
        }
    }

    #[test]
    fn remove_requires_released() {
        let (_dir, store, task) = store_with_task(&[]);
        let locked = store.lock(&task).unwrap();

        for target in [&task, &locked] {
            let result = store.remove(target);
            assert!(matches!(
                result,
                Err(QueueError::InvalidState { op: "remove", .. })
            ));
        }
        assert!(store.path_of(&locked).exists());
    }

    #[test]
    fn full_lifecycle_leaves_no_record_behind() {
        let (_dir, store, task) = store_with_task(&[("refresh_token", "rt")]);

        let locked = store.lock(&task).unwrap();
        store
            .update(&locked, &payload(&[("status", "success")]))
            .unwrap();
        let released = store.release(&locked).unwrap();
        assert_eq!(released.state, TaskState::Released);
        store.remove(&released).unwrap();

        for state in TaskState::all() {
            let dir = store.partition_dir(&ns(), state);
            assert_eq!(std::fs::read_dir(dir).unwrap().count(), 0, "{state} not empty");
        }
    }

    // ─── Ordering ─────────────────────────────────────────────────────────────

    #[test]
    fn find_next_task_returns_oldest_first() {
        let dir = tempdir().unwrap();
        let store = QueueStore::new(dir.path());
        store.init(&ns()).unwrap();

        let first = store
            .create(&ns(), &SessionId::new("zeta"), Map::new())
            .unwrap();
        std::thread::sleep(std::time::Duration::from_millis(50));
        let second = store
            .create(&ns(), &SessionId::new("alpha"), Map::new())
            .unwrap();

        // Creation order wins, not session-name order
        let tasks = store.find_tasks(&ns()).unwrap();
        assert_eq!(tasks, vec![first.clone(), second]);
        assert_eq!(store.find_next_task(&ns()).unwrap(), Some(first));
    }

    #[test]
    fn find_tasks_skips_foreign_files() {
        let (_dir, store, task) = store_with_task(&[]);
        let created_dir = store.partition_dir(&ns(), TaskState::Created);
        std::fs::write(created_dir.join("README.txt"), b"notes").unwrap();
        std::fs::write(created_dir.join("not-a-task"), b"junk").unwrap();

        let tasks = store.find_tasks(&ns()).unwrap();
        assert_eq!(tasks, vec![task]);
    }

    // ─── Failure Surfaces ─────────────────────────────────────────────────────

    #[test]
    fn read_distinguishes_missing_from_corrupt() {
        let (_dir, store, task) = store_with_task(&[]);

        let ghost = TaskRef::new(
            ns(),
            TaskState::Created,
            TaskId::new(1, SessionId::new("nope")),
        );
        assert!(matches!(store.read(&ghost), Err(QueueError::NotFound(_))));

        std::fs::write(store.path_of(&task), b"{Hello").unwrap();
        assert!(matches!(
            store.read(&task),
            Err(QueueError::CorruptRecord { .. })
        ));
    }

    #[test]
    fn lock_race_loser_gets_not_found() {
        let (_dir, store, task) = store_with_task(&[]);
        store.lock(&task).unwrap();

        // A second worker still holding the stale `created` reference loses
        // the rename race
        let result = store.lock(&task);
        assert!(matches!(result, Err(QueueError::NotFound(_))));
    }

    /// A crash between the final progress update and release leaves the
    /// record locked with its progress durable; a manual release + remove
    /// completes without data loss.
    #[test]
    fn interrupted_run_leaves_locked_record_recoverable() {
        let (dir, store, task) = store_with_task(&[("refresh_token", "rt")]);

        let locked = store.lock(&task).unwrap();
        store
            .update(&locked, &payload(&[("status", "success")]))
            .unwrap();
        // Process dies here: no release, no remove.
        drop(store);

        // A fresh process inspects the queue
        let store = QueueStore::new(dir.path());
        store.init(&ns()).unwrap();
        let record = store.read(&locked).unwrap();
        assert_eq!(record.str_field("status"), Some("success"));

        let released = store.release(&locked).unwrap();
        store.remove(&released).unwrap();
    }

    // ─── Property Tests ───────────────────────────────────────────────────────

    fn arb_session() -> impl Strategy<Value = SessionId> {
        "[a-zA-Z0-9][a-zA-Z0-9_-]{0,24}".prop_map(SessionId::new)
    }

    fn arb_fields() -> impl Strategy<Value = Map<String, Value>> {
        proptest::collection::btree_map("[a-z_]{1,12}", "[ -~]{0,40}", 0..6).prop_map(|m| {
            m.into_iter()
                .filter(|(k, _)| !matches!(k.as_str(), "session_id"))
                .map(|(k, v)| (k, json!(v)))
                .collect()
        })
    }

    proptest! {
        /// Whatever fields go in come back out unchanged, alongside the
        /// three bookkeeping fields.
        #[test]
        fn payload_roundtrip(session in arb_session(), fields in arb_fields()) {
            let dir = tempdir().unwrap();
            let store = QueueStore::new(dir.path());
            store.init(&ns()).unwrap();

            let task = store.create(&ns(), &session, fields.clone()).unwrap();
            let record = store.read(&task).unwrap();

            prop_assert_eq!(&record.session_id, &session);
            for (key, field) in &fields {
                prop_assert_eq!(record.fields.get(key), Some(field));
            }
        }

        /// Every legal transition keeps exactly one record on disk, in
        /// exactly one partition.
        #[test]
        fn one_record_in_one_partition(session in arb_session(), fields in arb_fields()) {
            let dir = tempdir().unwrap();
            let store = QueueStore::new(dir.path());
            store.init(&ns()).unwrap();

            let count_records = |store: &QueueStore| {
                TaskState::all()
                    .iter()
                    .map(|s| {
                        std::fs::read_dir(store.partition_dir(&ns(), *s))
                            .unwrap()
                            .count()
                    })
                    .sum::<usize>()
            };

            let task = store.create(&ns(), &session, fields).unwrap();
            prop_assert_eq!(count_records(&store), 1);

            let locked = store.lock(&task).unwrap();
            prop_assert_eq!(count_records(&store), 1);

            let released = store.release(&locked).unwrap();
            prop_assert_eq!(count_records(&store), 1);

            store.remove(&released).unwrap();
            prop_assert_eq!(count_records(&store), 0);
        }
    }
}
