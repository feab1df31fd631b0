//! Newtype wrappers for domain identifiers.
//!
//! These types prevent accidental mixing of different identifier kinds (e.g.
//! using a session id where a queue namespace is expected) and make the code
//! more self-documenting. All of them end up embedded in file names, so the
//! queue store validates them for path safety before first use.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A queue namespace, scoping one queue to one external API (e.g. "fitbit").
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Namespace(pub String);

impl Namespace {
    pub fn new(s: impl Into<String>) -> Self {
        Namespace(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Namespace {
    fn from(s: &str) -> Self {
        Namespace(s.to_string())
    }
}

/// An opaque session identifier correlating a task to the originating user
/// session. Supplied by the survey front end; treated as untrusted input.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn new(s: impl Into<String>) -> Self {
        SessionId(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for SessionId {
    fn from(s: String) -> Self {
        SessionId(s)
    }
}

impl From<&str> for SessionId {
    fn from(s: &str) -> Self {
        SessionId(s.to_string())
    }
}

/// A task identifier: creation timestamp (epoch milliseconds) plus the
/// originating session id.
///
/// The on-disk file name is `<stamp_ms>.<session>`. Ordering derives from
/// `(stamp_ms, session)`, so sorting task ids yields creation (FIFO) order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId {
    stamp_ms: u64,
    session: SessionId,
}

impl TaskId {
    pub fn new(stamp_ms: u64, session: SessionId) -> Self {
        TaskId { stamp_ms, session }
    }

    /// Parses a task id from a queue file name of the form
    /// `<stamp_ms>.<session>`. Returns `None` for anything else (temp files,
    /// editor droppings, ...), which callers skip.
    pub fn parse(file_name: &str) -> Option<Self> {
        let (stamp, session) = file_name.split_once('.')?;
        let stamp_ms = stamp.parse::<u64>().ok()?;
        if session.is_empty() {
            return None;
        }
        Some(TaskId {
            stamp_ms,
            session: SessionId::new(session),
        })
    }

    /// The on-disk file name for this task.
    pub fn file_name(&self) -> String {
        format!("{}.{}", self.stamp_ms, self.session.as_str())
    }

    pub fn stamp_ms(&self) -> u64 {
        self.stamp_ms
    }

    pub fn session(&self) -> &SessionId {
        &self.session
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.stamp_ms, self.session)
    }
}
