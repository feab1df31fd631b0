//! Background worker: message types, per-task workflow, and dispatch loop.
//!
//! The worker drains one namespace's queue serially. Each task is locked,
//! its credentials refreshed, its data paged and persisted, and the record
//! released and removed; any failure leaves the record locked for
//! inspection. See [`dispatch::DispatchLoop`] for the control loop and
//! [`processor::TaskProcessor`] for the workflow.

pub mod dispatch;
pub mod message;
pub mod processor;

pub use dispatch::DispatchLoop;
pub use message::WorkerMessage;
pub use processor::{TaskError, TaskProcessor};
