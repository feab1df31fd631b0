//! Durable task queue with crash-safe state transitions.
//!
//! A task progresses `created → locked → released`, each state being a
//! partition directory under the namespace; transitions are atomic renames.
//! See [`store::QueueStore`] for the operation contract and [`watch`] for
//! change notifications on the `created` partition.

pub mod record;
pub mod store;
pub mod watch;

pub use record::{TaskRecord, TaskRef, TaskState};
pub use store::{QueueError, QueueStore};
pub use watch::{ChangeKind, ChangeNotifier, QueueEvent, WatchError};
