//! OAuth front end for enrolling user sessions.
//!
//! The gateway sends the user through the provider's consent screen and, on
//! the way back, exchanges the authorization code for the first token pair
//! and enqueues an ingest task. It is deliberately thin: all it ever does
//! to the queue is *create* entries - it never touches a locked or released
//! record, which keeps cross-process write races impossible by
//! construction.
//!
//! Routes:
//!
//! - `GET /` and `GET /modules` - convenience redirects to the login route.
//! - `GET /modules/{namespace}/login?session_id=...` - redirect to the
//!   provider's authorization page, carrying the session id as OAuth
//!   `state`. A missing session id falls back to the current epoch millis.
//! - `GET /modules/{namespace}/callback?code=...&state=...` - exchange the
//!   code, enqueue the task, render a thank-you page.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use axum::Router;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Redirect, Response};
use axum::routing::get;
use serde::Deserialize;
use serde_json::{Map, Value};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info};
use url::Url;

use crate::config::{AppConfig, ProviderConfig};
use crate::provider::{HttpProvider, ProviderError};
use crate::queue::{QueueError, QueueStore};
use crate::types::{Namespace, SessionId};
use crate::worker::WorkerMessage;

/// Errors produced while handling a gateway request.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The provider rejected (or never answered) the code exchange.
    #[error("authorization exchange failed: {0}")]
    Exchange(#[from] ProviderError),

    /// Enqueuing the task failed.
    #[error("queue error: {0}")]
    Queue(#[from] QueueError),

    /// The worker's message channel is gone.
    #[error("worker unavailable: message channel closed")]
    WorkerUnavailable,
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = match &self {
            GatewayError::Exchange(_) => StatusCode::BAD_REQUEST,
            GatewayError::Queue(QueueError::InvalidSessionId(_)) => StatusCode::BAD_REQUEST,
            GatewayError::Queue(_) => StatusCode::INTERNAL_SERVER_ERROR,
            GatewayError::WorkerUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        };
        (status, self.to_string()).into_response()
    }
}

/// Where freshly exchanged sessions become queue entries.
#[derive(Clone)]
pub enum TaskSink {
    /// Write the queue record directly (standalone gateway process).
    Direct(QueueStore),
    /// Hand the payload to an in-process worker over its message channel.
    Worker(mpsc::Sender<WorkerMessage>),
}

impl TaskSink {
    async fn submit(
        &self,
        namespace: &Namespace,
        session: &SessionId,
        data: Value,
    ) -> Result<(), GatewayError> {
        match self {
            TaskSink::Direct(store) => {
                let payload = match data {
                    Value::Object(map) => map,
                    _ => Map::new(),
                };
                store.init(namespace)?;
                let task = store.create(namespace, session, payload)?;
                info!(task = %task, "created task");
                Ok(())
            }
            TaskSink::Worker(tx) => tx
                .send(WorkerMessage::Create {
                    session_id: session.clone(),
                    data,
                })
                .await
                .map_err(|_| GatewayError::WorkerUnavailable),
        }
    }
}

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    provider: Arc<HttpProvider>,
    config: Arc<ProviderConfig>,
    namespace: Namespace,
    sink: TaskSink,
}

impl AppState {
    pub fn new(config: &AppConfig, provider: HttpProvider, sink: TaskSink) -> Self {
        AppState {
            provider: Arc::new(provider),
            config: Arc::new(config.provider.clone()),
            namespace: config.namespace.clone(),
            sink,
        }
    }
}

/// Builds the gateway router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root_redirect))
        .route("/modules", get(root_redirect))
        .route("/modules/{namespace}/login", get(login))
        .route("/modules/{namespace}/callback", get(callback))
        .with_state(state)
}

async fn root_redirect(State(state): State<AppState>) -> Redirect {
    debug!("redirecting to login");
    Redirect::temporary(&format!("/modules/{}/login", state.namespace))
}

#[derive(Debug, Deserialize)]
struct LoginParams {
    session_id: Option<String>,
}

/// Sends the user to the provider's authorization page.
async fn login(
    Path(namespace): Path<String>,
    Query(params): Query<LoginParams>,
    State(state): State<AppState>,
) -> Result<Redirect, GatewayError> {
    let session_id = params
        .session_id
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| epoch_millis().to_string());

    let url = build_authorize_url(&state.config, &session_id).map_err(ProviderError::from)?;
    debug!(namespace = %namespace, session = %session_id, "redirecting to authorization page");
    Ok(Redirect::temporary(url.as_str()))
}

#[derive(Debug, Deserialize)]
struct CallbackParams {
    code: String,
    state: String,
}

/// Exchanges the authorization code (valid for minutes, so this happens
/// inline) and enqueues the ingest task. Data crawling itself is the
/// worker's business, triggered by the queue entry this creates.
async fn callback(
    Path(namespace): Path<String>,
    Query(params): Query<CallbackParams>,
    State(state): State<AppState>,
) -> Result<Html<String>, GatewayError> {
    let namespace = Namespace::new(namespace);
    let session = SessionId::new(params.state.clone());

    let token = state
        .provider
        .exchange_code(&params.code, &params.state)
        .await?;

    state
        .sink
        .submit(&namespace, &session, Value::Object(token.as_patch()))
        .await?;
    info!(namespace = %namespace, session = %session, "session enrolled");

    Ok(Html(thank_you_page(namespace.as_str())))
}

/// The provider authorization page with our client, scope, and state.
fn build_authorize_url(
    config: &ProviderConfig,
    session_id: &str,
) -> Result<Url, url::ParseError> {
    let mut url = Url::parse(&config.authorize_url)?;
    url.query_pairs_mut()
        .append_pair("client_id", &config.client_id)
        .append_pair("response_type", "code")
        .append_pair("scope", &config.scope)
        .append_pair("redirect_uri", &config.redirect_uri)
        .append_pair("state", session_id);
    Ok(url)
}

fn thank_you_page(namespace: &str) -> String {
    format!(
        r#"<!doctype html>
<html lang="en">
<head>
    <meta charset="utf-8">
    <meta name="viewport" content="width=device-width, initial-scale=1">
    <title>({namespace}) Thank you!</title>
</head>
<body>
    <h1>Thank you</h1>
    <p>Your <strong>{namespace}</strong> data will be included in our survey.</p>
</body>
</html>
"#
    )
}

fn epoch_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
