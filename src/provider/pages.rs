//! Cursor-following pagination against the rate-limited provider.
//!
//! The loop starts from either the look-back query or a resume cursor and
//! repeats: fetch, persist, inspect. The ordering is deliberate - a page is
//! durably persisted *before* the loop decides whether to continue, so a
//! crash after any page leaves a complete artifact trail and the cursor for
//! the next page embedded in the last artifact's content.
//!
//! # Rate Limiting
//!
//! A 429 response suspends the loop for the server-issued `Retry-After`
//! (defaulting to the provider's hourly reset window when the header is
//! absent or unusable) plus a fixed safety margin, then retries the
//! *identical* request: no state advances and no artifact is written for
//! the 429 itself. There is no cap on retries; the provider's reset window
//! bounds them in practice.

use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{Days, NaiveDate, Utc};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::config::FetchPolicy;
use crate::session::SessionStore;
use crate::types::SessionId;

use super::api::{Cursor, PageFetch, PageRequest, SeriesApi};
use super::error::ProviderError;

/// Errors that can occur during a paging run.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The provider call itself failed.
    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Persisting an artifact failed; the run aborts so no page is skipped.
    #[error("artifact write failed: {0}")]
    Storage(#[from] io::Error),
}

/// Result type for paging operations.
pub type Result<T> = std::result::Result<T, FetchError>;

/// Drives a full paging run for one session, persisting every page.
pub struct PagedFetcher<A> {
    api: Arc<A>,
    artifacts: SessionStore,
    policy: FetchPolicy,
}

impl<A: SeriesApi> PagedFetcher<A> {
    pub fn new(api: Arc<A>, artifacts: SessionStore, policy: FetchPolicy) -> Self {
        PagedFetcher {
            api,
            artifacts,
            policy,
        }
    }

    /// Fetches and persists every page, returning artifact paths in fetch
    /// order.
    ///
    /// `resume` continues from a previously persisted cursor instead of the
    /// look-back query; the worker always starts fresh, but the hook keeps
    /// operator-driven resumption possible.
    #[instrument(skip(self, access_token, resume), fields(session = %session))]
    pub async fn fetch_all(
        &self,
        session: &SessionId,
        access_token: &str,
        resume: Option<Cursor>,
    ) -> Result<Vec<PathBuf>> {
        let mut request = match resume {
            Some(cursor) => PageRequest::Cursor(cursor),
            None => PageRequest::Initial {
                after_date: self.start_date(),
                limit: self.policy.page_limit,
            },
        };

        let mut artifacts = Vec::new();
        loop {
            match self.api.fetch_page(access_token, &request).await? {
                PageFetch::RateLimited { retry_after } => {
                    let base = retry_after
                        .map(Duration::from_secs)
                        .unwrap_or(self.policy.default_retry_after);
                    let wait = base + self.policy.retry_margin;
                    warn!(
                        wait_secs = wait.as_secs(),
                        page = artifacts.len(),
                        "rate limited; holding the identical request"
                    );
                    tokio::time::sleep(wait).await;
                    // `request` is untouched: the retry is identical.
                }
                PageFetch::Page { body } => {
                    let path = self.artifacts.save_page(session, artifacts.len(), &body)?;
                    debug!(path = %path.display(), "persisted page");
                    artifacts.push(path);

                    match next_cursor(&body) {
                        Some(cursor) => request = PageRequest::Cursor(cursor),
                        None => break,
                    }
                }
            }
        }

        debug!(pages = artifacts.len(), "paging run complete");
        Ok(artifacts)
    }

    /// First day of the look-back window.
    fn start_date(&self) -> NaiveDate {
        Utc::now().date_naive() - Days::new(u64::from(self.policy.lookback_days))
    }
}

/// Extracts the `pagination.next` cursor from a page body.
///
/// A body without a usable cursor ends the run. That includes a body that
/// is not JSON at all - the page is already persisted at that point, so the
/// anomaly is logged rather than failing the task.
fn next_cursor(body: &[u8]) -> Option<Cursor> {
    let value: Value = match serde_json::from_slice(body) {
        Ok(value) => value,
        Err(error) => {
            warn!(%error, "page body is not JSON; stopping pagination");
            return None;
        }
    };

    value
        .get("pagination")
        .and_then(|p| p.get("next"))
        .and_then(Value::as_str)
        .filter(|next| !next.is_empty())
        .map(Cursor::new)
}
