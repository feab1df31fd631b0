//! Process configuration.
//!
//! All configuration is read once at startup from `WEARSYNC_*` environment
//! variables into an [`AppConfig`] value, which is then passed by reference
//! into each component constructor. There is no global configuration state;
//! tests construct their own values pointing at temporary directories.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::types::Namespace;

/// Default HTTP port for the gateway.
const DEFAULT_PORT: u16 = 3000;

/// Default queue namespace (the reference provider).
const DEFAULT_NAMESPACE: &str = "fitbit";

/// Default interval between idle polls of the queue (seconds).
const DEFAULT_POLL_INTERVAL_SECS: u64 = 5;

/// Default cooldown after finishing a task, successful or not (seconds).
const DEFAULT_COOLDOWN_SECS: u64 = 1;

/// Default look-back window for the initial data request (days).
const DEFAULT_LOOKBACK_DAYS: u32 = 30;

/// Default page size requested from the provider.
const DEFAULT_PAGE_LIMIT: u32 = 100;

/// Default outbound request timeout (seconds).
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Token lifetime requested from the provider (seconds). The provider treats
/// this as a hint; 8 hours is the longest it honors.
const DEFAULT_TOKEN_EXPIRES_IN: u64 = 28_800;

/// Errors raised while assembling configuration from the environment.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required environment variable is missing or empty.
    #[error("missing required environment variable: {0}")]
    MissingVar(&'static str),

    /// An environment variable is present but unparsable.
    #[error("invalid value for {var}: {value}")]
    InvalidVar { var: &'static str, value: String },
}

/// Result type for configuration loading.
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Top-level application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Root directory of the queue tree (`<queue-root>/<namespace>/...`).
    pub queue_dir: PathBuf,

    /// Root directory for per-session artifact storage.
    pub session_dir: PathBuf,

    /// Queue namespace this process serves.
    pub namespace: Namespace,

    /// Port the gateway listens on.
    pub port: u16,

    /// Remote provider settings.
    pub provider: ProviderConfig,

    /// Worker loop timing.
    pub dispatch: DispatchConfig,

    /// Pagination and backoff policy.
    pub fetch: FetchPolicy,
}

/// OAuth2 and API-endpoint settings for the remote provider.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    /// Long-lived OAuth client id.
    pub client_id: String,

    /// Long-lived OAuth client secret.
    pub client_secret: String,

    /// Redirect URI registered with the provider.
    pub redirect_uri: String,

    /// The provider's user-facing authorization page.
    pub authorize_url: String,

    /// The provider's token endpoint (code exchange and refresh).
    pub token_url: String,

    /// The paginated time-series list endpoint.
    pub series_url: String,

    /// Scopes requested at authorization time.
    pub scope: String,

    /// Token lifetime requested from the provider (seconds).
    pub token_expires_in: u64,

    /// Timeout applied to every outbound request. Expiry surfaces as a
    /// network failure and aborts the current task.
    pub request_timeout: Duration,
}

/// Timing for the worker's dispatch loop.
#[derive(Debug, Clone, Copy)]
pub struct DispatchConfig {
    /// How long to sleep when the queue is empty before polling again.
    pub poll_interval: Duration,

    /// How long to sleep after finishing a task before looking for the next.
    /// Bounds worst-case CPU spin and spaces out provider traffic.
    pub cooldown: Duration,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        DispatchConfig {
            poll_interval: Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
            cooldown: Duration::from_secs(DEFAULT_COOLDOWN_SECS),
        }
    }
}

/// Pagination and rate-limit backoff policy.
#[derive(Debug, Clone, Copy)]
pub struct FetchPolicy {
    /// Days before "now" the initial request reaches back.
    pub lookback_days: u32,

    /// Page size requested from the provider.
    pub page_limit: u32,

    /// Fallback wait when a 429 response carries no usable `Retry-After`
    /// header. The provider's quota resets hourly.
    pub default_retry_after: Duration,

    /// Safety margin added on top of every server-issued backoff.
    pub retry_margin: Duration,
}

impl Default for FetchPolicy {
    fn default() -> Self {
        FetchPolicy {
            lookback_days: DEFAULT_LOOKBACK_DAYS,
            page_limit: DEFAULT_PAGE_LIMIT,
            default_retry_after: Duration::from_secs(3600),
            retry_margin: Duration::from_secs(10),
        }
    }
}

impl AppConfig {
    /// Builds the configuration from `WEARSYNC_*` environment variables.
    ///
    /// Required: `WEARSYNC_QUEUE_DIR`, `WEARSYNC_SESSION_DIR`,
    /// `WEARSYNC_CLIENT_ID`, `WEARSYNC_CLIENT_SECRET`,
    /// `WEARSYNC_REDIRECT_URI`. Everything else has a default.
    pub fn from_env() -> Result<Self> {
        let provider = ProviderConfig {
            client_id: require("WEARSYNC_CLIENT_ID")?,
            client_secret: require("WEARSYNC_CLIENT_SECRET")?,
            redirect_uri: require("WEARSYNC_REDIRECT_URI")?,
            authorize_url: var_or("WEARSYNC_AUTHORIZE_URL", "https://www.fitbit.com/oauth2/authorize"),
            token_url: var_or("WEARSYNC_TOKEN_URL", "https://api.fitbit.com/oauth2/token"),
            series_url: var_or(
                "WEARSYNC_SERIES_URL",
                "https://api.fitbit.com/1.2/user/-/sleep/list.json",
            ),
            scope: var_or("WEARSYNC_SCOPE", "heartrate profile sleep"),
            token_expires_in: parsed_or("WEARSYNC_TOKEN_EXPIRES_IN", DEFAULT_TOKEN_EXPIRES_IN)?,
            request_timeout: Duration::from_secs(parsed_or(
                "WEARSYNC_REQUEST_TIMEOUT_SECS",
                DEFAULT_REQUEST_TIMEOUT_SECS,
            )?),
        };

        let dispatch = DispatchConfig {
            poll_interval: Duration::from_secs(parsed_or(
                "WEARSYNC_POLL_INTERVAL_SECS",
                DEFAULT_POLL_INTERVAL_SECS,
            )?),
            cooldown: Duration::from_secs(parsed_or(
                "WEARSYNC_COOLDOWN_SECS",
                DEFAULT_COOLDOWN_SECS,
            )?),
        };

        let fetch = FetchPolicy {
            lookback_days: parsed_or("WEARSYNC_LOOKBACK_DAYS", DEFAULT_LOOKBACK_DAYS)?,
            page_limit: parsed_or("WEARSYNC_PAGE_LIMIT", DEFAULT_PAGE_LIMIT)?,
            ..FetchPolicy::default()
        };

        Ok(AppConfig {
            queue_dir: PathBuf::from(require("WEARSYNC_QUEUE_DIR")?),
            session_dir: PathBuf::from(require("WEARSYNC_SESSION_DIR")?),
            namespace: Namespace::new(var_or("WEARSYNC_NAMESPACE", DEFAULT_NAMESPACE)),
            port: parsed_or("WEARSYNC_PORT", DEFAULT_PORT)?,
            provider,
            dispatch,
            fetch,
        })
    }
}

fn require(var: &'static str) -> Result<String> {
    match std::env::var(var) {
        Ok(v) if !v.is_empty() => Ok(v),
        _ => Err(ConfigError::MissingVar(var)),
    }
}

fn var_or(var: &str, default: &str) -> String {
    std::env::var(var)
        .ok()
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn parsed_or<T: std::str::FromStr>(var: &'static str, default: T) -> Result<T> {
    match std::env::var(var) {
        Ok(v) if !v.is_empty() => v
            .parse()
            .map_err(|_| ConfigError::InvalidVar { var, value: v }),
        _ => Ok(default),
    }
}
