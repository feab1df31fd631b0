//! HTTP implementation of the provider boundary.
//!
//! Token operations are form-encoded POSTs authenticated with HTTP Basic
//! auth built from the long-lived client id/secret; data pages are
//! bearer-authenticated GETs. Rate limiting arrives as HTTP 429 plus a
//! `Retry-After` header in seconds, which is surfaced as data, not as an
//! error. Every request carries the configured timeout; expiry surfaces as
//! a network failure and aborts the current task.

use chrono::NaiveDate;
use reqwest::header::RETRY_AFTER;
use reqwest::{StatusCode, Url};
use tracing::debug;

use crate::config::ProviderConfig;

use super::api::{Cursor, PageFetch, PageRequest, SeriesApi};
use super::error::{ProviderError, Result};
use super::token::{ExchangeRequest, RefreshRequest, TokenResponse};

/// Provider client speaking the real HTTP protocol.
#[derive(Debug, Clone)]
pub struct HttpProvider {
    http: reqwest::Client,
    config: ProviderConfig,
}

impl HttpProvider {
    /// Builds a client with the configured request timeout.
    pub fn new(config: &ProviderConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        Ok(HttpProvider {
            http,
            config: config.clone(),
        })
    }

    /// Exchanges an authorization code for the first token pair. Used by
    /// the gateway's OAuth callback, not by the worker.
    pub async fn exchange_code(&self, code: &str, state: &str) -> Result<TokenResponse> {
        let form = ExchangeRequest::new(
            code,
            &self.config.client_id,
            &self.config.redirect_uri,
            state,
            self.config.token_expires_in,
        );
        self.token_request(&form).await
    }

    /// POSTs a form body to the token endpoint and parses the token payload.
    async fn token_request<F: serde::Serialize>(&self, form: &F) -> Result<TokenResponse> {
        let response = self
            .http
            .post(&self.config.token_url)
            .basic_auth(&self.config.client_id, Some(&self.config.client_secret))
            .form(form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(ProviderError::TokenRejected {
                status: status.as_u16(),
                detail,
            });
        }

        let body = response.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }

    /// The opening request of a paging run: the list endpoint with a
    /// look-back date, ascending order, and the configured page size.
    fn initial_url(&self, after_date: NaiveDate, limit: u32) -> Result<Url> {
        let mut url = Url::parse(&self.config.series_url)?;
        url.query_pairs_mut()
            .append_pair("afterDate", &after_date.format("%Y-%m-%d").to_string())
            .append_pair("sort", "asc")
            .append_pair("offset", "0")
            .append_pair("limit", &limit.to_string());
        Ok(url)
    }
}

impl SeriesApi for HttpProvider {
    async fn refresh_token(&self, refresh_token: &str) -> Result<TokenResponse> {
        let form = RefreshRequest::new(
            refresh_token,
            &self.config.redirect_uri,
            self.config.token_expires_in,
        );
        self.token_request(&form).await
    }

    async fn fetch_page(&self, access_token: &str, request: &PageRequest) -> Result<PageFetch> {
        let url = match request {
            PageRequest::Initial { after_date, limit } => self.initial_url(*after_date, *limit)?,
            // The cursor is a complete URL issued by the provider; follow
            // it verbatim.
            PageRequest::Cursor(Cursor(next)) => Url::parse(next)?,
        };

        debug!(url = %url, "fetching page");
        let response = self.http.get(url).bearer_auth(access_token).send().await?;

        if response.status() == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok());
            return Ok(PageFetch::RateLimited { retry_after });
        }

        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::PageStatus {
                status: status.as_u16(),
            });
        }

        let body = response.bytes().await?;
        Ok(PageFetch::Page {
            body: body.to_vec(),
        })
    }
}
