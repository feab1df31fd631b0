//! wearsync - durable ingestion of third-party time-series data on behalf of
//! OAuth-authorized user sessions.
//!
//! A gateway enqueues one task per authorized session; a worker drains the
//! queue serially, refreshing credentials and paging through the provider's
//! rate-limited API, persisting every page before deciding to fetch the
//! next. The queue is a directory tree whose state transitions are atomic
//! renames, so a crash never loses or duplicates work.

pub mod config;
pub mod gateway;
pub mod provider;
pub mod queue;
pub mod session;
pub mod types;
pub mod worker;
