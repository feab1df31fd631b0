//! Task lifecycle values: state, reference, and record content.
//!
//! A task's state is encoded as its physical location (the partition
//! directory it lives in), never as a field inside the record. A [`TaskRef`]
//! is a pure value naming that location; state transitions produce a new
//! `TaskRef` rather than mutating the old one, mirroring the atomic rename
//! they describe.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::path::PathBuf;

use crate::types::{Namespace, SessionId, TaskId};

/// The three lifecycle states of a task. Monotonic: a task only ever
/// advances `Created → Locked → Released` (plus the operator-facing
/// `unlock` back-edge).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskState {
    /// Waiting in the queue, eligible for pickup.
    Created,
    /// Claimed by a worker; the only state in which the record may be
    /// mutated.
    Locked,
    /// Finished (success or terminal failure); eligible for removal.
    Released,
}

impl TaskState {
    /// The partition directory name for this state.
    pub fn dir_name(&self) -> &'static str {
        match self {
            TaskState::Created => "created",
            TaskState::Locked => "locked",
            TaskState::Released => "released",
        }
    }

    /// All states, in lifecycle order.
    pub fn all() -> [TaskState; 3] {
        [TaskState::Created, TaskState::Locked, TaskState::Released]
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dir_name())
    }
}

/// A reference to a task record: which namespace it belongs to, which
/// partition it is in, and its id.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TaskRef {
    pub namespace: Namespace,
    pub state: TaskState,
    pub id: TaskId,
}

impl TaskRef {
    pub fn new(namespace: Namespace, state: TaskState, id: TaskId) -> Self {
        TaskRef {
            namespace,
            state,
            id,
        }
    }

    /// Returns a reference to the same task in a different partition.
    /// This models the rename as a pure function; the store performs the
    /// actual filesystem move.
    pub fn with_state(&self, state: TaskState) -> TaskRef {
        TaskRef {
            namespace: self.namespace.clone(),
            state,
            id: self.id.clone(),
        }
    }

    /// Path of the record relative to the queue root.
    pub fn rel_path(&self) -> PathBuf {
        PathBuf::from(self.namespace.as_str())
            .join(self.state.dir_name())
            .join(self.id.file_name())
    }

    pub fn session(&self) -> &SessionId {
        self.id.session()
    }
}

impl fmt::Display for TaskRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.namespace, self.state, self.id)
    }
}

/// The on-disk content of a task record.
///
/// Three bookkeeping fields are always present; everything else (provider
/// credentials, accumulated progress) lives in the flattened `fields` map
/// and round-trips untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskRecord {
    pub session_id: SessionId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl TaskRecord {
    /// Creates a fresh record with `created_at == updated_at` and the given
    /// payload fields.
    pub fn new(session_id: SessionId, payload: Map<String, Value>) -> Self {
        let now = Utc::now();
        TaskRecord {
            session_id,
            created_at: now,
            updated_at: now,
            fields: payload,
        }
    }

    /// Looks up a string-valued payload field.
    pub fn str_field(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(Value::as_str)
    }

    /// The provider access token, if present.
    pub fn access_token(&self) -> Option<&str> {
        self.str_field("access_token")
    }

    /// The provider refresh token, if present.
    pub fn refresh_token(&self) -> Option<&str> {
        self.str_field("refresh_token")
    }
}
