//! The seam to the remote provider.
//!
//! [`SeriesApi`] abstracts the two remote calls the worker makes: exchanging
//! a refresh credential for a fresh token pair, and fetching one page of
//! time-series data. The trait-based design enables mock providers for
//! testing the paging and workflow logic without a network.
//!
//! # Example (mock for testing)
//!
//! ```ignore
//! struct ScriptedApi {
//!     pages: Mutex<VecDeque<PageFetch>>,
//! }
//!
//! impl SeriesApi for ScriptedApi {
//!     async fn refresh_token(&self, _refresh: &str) -> Result<TokenResponse> {
//!         Ok(test_tokens())
//!     }
//!
//!     async fn fetch_page(&self, _token: &str, _req: &PageRequest) -> Result<PageFetch> {
//!         Ok(self.pages.lock().unwrap().pop_front().expect("script exhausted"))
//!     }
//! }
//! ```

use std::future::Future;

use chrono::NaiveDate;

use super::error::Result;
use super::token::TokenResponse;

/// An opaque pagination cursor issued by the provider.
///
/// The provider rejects offset-based paging; the only way to the next page
/// is the `pagination.next` value from the previous response, used verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cursor(pub String);

impl Cursor {
    pub fn new(s: impl Into<String>) -> Self {
        Cursor(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// One page request: either the opening query of a run or a cursor follow-up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageRequest {
    /// The first request of a run, reaching back over the look-back window.
    Initial { after_date: NaiveDate, limit: u32 },

    /// A follow-up request using the provider-issued cursor verbatim.
    Cursor(Cursor),
}

/// Outcome of a page request that got an answer from the provider.
///
/// A rate-limit response is data, not an error: the caller holds the
/// identical request and retries after the indicated delay.
#[derive(Debug, Clone)]
pub enum PageFetch {
    /// 2xx - the raw response body, persisted verbatim by the caller.
    Page { body: Vec<u8> },

    /// 429 - the parsed `Retry-After` value in seconds, when the header was
    /// present and numeric.
    RateLimited { retry_after: Option<u64> },
}

/// The remote provider boundary used by the worker.
pub trait SeriesApi: Send + Sync {
    /// Exchanges a refresh credential for a new access/refresh pair.
    fn refresh_token(
        &self,
        refresh_token: &str,
    ) -> impl Future<Output = Result<TokenResponse>> + Send;

    /// Fetches one page of time-series data with the given bearer token.
    fn fetch_page(
        &self,
        access_token: &str,
        request: &PageRequest,
    ) -> impl Future<Output = Result<PageFetch>> + Send;
}
