//! Provider API error types.
//!
//! Failures talking to the remote provider fall into a few operationally
//! distinct buckets: transport failures (including timeouts), a rejected
//! token operation, and an unexpected page status. A 429 rate-limit
//! response is deliberately *not* an error - it is a signal the paging loop
//! handles by waiting and retrying (see [`crate::provider::pages`]).

use thiserror::Error;

/// Errors returned by provider API calls.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Transport-level failure: connection, TLS, or timeout. The configured
    /// request timeout surfaces here.
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The token endpoint rejected the request (non-2xx).
    #[error("token request rejected: HTTP {status}: {detail}")]
    TokenRejected { status: u16, detail: String },

    /// The token endpoint answered 2xx but the body was not a token payload.
    #[error("malformed token response: {0}")]
    MalformedToken(#[from] serde_json::Error),

    /// A data page request came back with an unexpected status (anything
    /// other than 2xx or 429).
    #[error("unexpected status fetching page: HTTP {status}")]
    PageStatus { status: u16 },

    /// A configured or provider-issued URL failed to parse.
    #[error("invalid provider url: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

/// Result type for provider operations.
pub type Result<T> = std::result::Result<T, ProviderError>;
