//! Core domain types shared across the crate.

mod ids;

pub use ids::{Namespace, SessionId, TaskId};
