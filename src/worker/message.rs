//! Worker message types.
//!
//! The front end talks to the worker over a single message channel; the
//! wire shape is JSON-compatible so the same message can cross a process
//! boundary:
//!
//! ```json
//! {"job": "create", "sessionId": "abc123", "data": {"access_token": "..."}}
//! ```
//!
//! The worker acknowledges only via log output; there is no synchronous
//! reply.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::SessionId;

/// Messages accepted by the dispatch loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "job", rename_all = "lowercase")]
pub enum WorkerMessage {
    /// Enqueue a new task for the worker's namespace.
    #[serde(rename_all = "camelCase")]
    Create {
        /// The originating user session.
        session_id: SessionId,
        /// Task payload: provider credentials and any caller-supplied
        /// fields, stored verbatim on the queue record.
        data: Value,
    },

    /// Request a graceful stop after the current task.
    Shutdown,
}
