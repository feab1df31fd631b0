use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use wearsync::config::AppConfig;
use wearsync::gateway::{self, AppState, TaskSink};
use wearsync::provider::HttpProvider;
use wearsync::queue::{ChangeNotifier, QueueStore};
use wearsync::session::SessionStore;
use wearsync::worker::{DispatchLoop, TaskProcessor};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "wearsync=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mode = std::env::args().nth(1).unwrap_or_else(|| "serve".to_string());

    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(error) => {
            error!(%error, "invalid configuration");
            std::process::exit(1);
        }
    };

    let shutdown = CancellationToken::new();
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("interrupt received, shutting down");
                shutdown.cancel();
            }
        });
    }

    let result = match mode.as_str() {
        "serve" => serve(&config, shutdown).await,
        "worker" => worker(&config, shutdown).await,
        "gateway" => gateway_only(&config, shutdown).await,
        other => {
            error!(mode = other, "unknown mode; expected serve, worker, or gateway");
            std::process::exit(2);
        }
    };

    if let Err(error) = result {
        error!(%error, "fatal error");
        std::process::exit(1);
    }
}

/// Gateway and worker in one process, connected by the message channel.
async fn serve(config: &AppConfig, shutdown: CancellationToken) -> Result<(), BoxError> {
    let store = QueueStore::new(&config.queue_dir);
    store.init(&config.namespace)?;

    let provider = HttpProvider::new(&config.provider)?;
    let notifier = start_notifier(&store, config);
    let dispatch = build_dispatch(config, provider.clone(), &store);

    let (tx, rx) = mpsc::channel(16);
    let worker_shutdown = shutdown.clone();
    let worker_task = tokio::spawn(async move {
        if let Err(error) = dispatch.run(rx, notifier, worker_shutdown).await {
            error!(%error, "worker loop failed");
        }
    });

    let state = AppState::new(config, provider, TaskSink::Worker(tx));
    let result = run_http(gateway::router(state), config.port, shutdown.clone()).await;

    shutdown.cancel();
    let _ = worker_task.await;
    result
}

/// Worker only; tasks arrive through the queue directory.
async fn worker(config: &AppConfig, shutdown: CancellationToken) -> Result<(), BoxError> {
    let store = QueueStore::new(&config.queue_dir);
    store.init(&config.namespace)?;

    let provider = HttpProvider::new(&config.provider)?;
    let notifier = start_notifier(&store, config);
    let dispatch = build_dispatch(config, provider, &store);

    // No front end in this process; hold a sender so the loop only stops on
    // the shutdown signal.
    let (_tx, rx) = mpsc::channel(16);
    dispatch.run(rx, notifier, shutdown).await?;
    Ok(())
}

/// Gateway only; enqueues directly into the queue directory for a worker
/// running elsewhere.
async fn gateway_only(config: &AppConfig, shutdown: CancellationToken) -> Result<(), BoxError> {
    let store = QueueStore::new(&config.queue_dir);
    let queue_dir = store.init(&config.namespace)?;
    info!(queue_dir = %queue_dir.display(), namespace = %config.namespace, "queue initialized");

    let provider = HttpProvider::new(&config.provider)?;
    let state = AppState::new(config, provider, TaskSink::Direct(store));
    run_http(gateway::router(state), config.port, shutdown).await
}

fn build_dispatch(
    config: &AppConfig,
    provider: HttpProvider,
    store: &QueueStore,
) -> DispatchLoop<HttpProvider> {
    let processor = TaskProcessor::new(
        store.clone(),
        Arc::new(provider),
        SessionStore::new(&config.session_dir),
        config.fetch,
    );
    DispatchLoop::new(
        store.clone(),
        config.namespace.clone(),
        processor,
        config.dispatch,
    )
}

fn start_notifier(store: &QueueStore, config: &AppConfig) -> Option<ChangeNotifier> {
    match ChangeNotifier::watch(store, &config.namespace) {
        Ok(notifier) => Some(notifier),
        Err(error) => {
            // Polling still picks up every task; the watch only trims latency.
            warn!(%error, "directory watch unavailable, relying on polling");
            None
        }
    }
}

async fn run_http(
    app: axum::Router,
    port: u16,
    shutdown: CancellationToken,
) -> Result<(), BoxError> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("listening on {addr}");
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;
    Ok(())
}
