mod api;
mod config;
mod discovery;
mod dns;
mod error;
mod metrics;
mod notifier;
mod registry;
mod resolver;
mod supervisor;

use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use anyhow::{Context, Result};
use crate::config::Config;
use crate::discovery::client::DockerControlPlane;
use crate::discovery::snapshot;
use crate::discovery::watcher::Watcher;
use crate::metrics::Metrics;
use crate::notifier::Notifier;
use crate::registry::{Registry, Snapshot};

const VERSION: &str = env!("CARGO_PKG_VERSION");
const LISTENER_RESTART_DELAY: Duration = Duration::from_secs(1);

#[tokio::main]
async fn main() -> Result<()> {
    let arg = std::env::args().nth(1);
    if matches!(arg.as_deref(), Some("-v") | Some("--version")) {
        println!("disconter {}", VERSION);
        return Ok(());
    }

    let config = Config::resolve(arg.as_deref())?;

    // Initialize tracing
    let default_filter = if config.debug { "disconterd=debug" } else { "disconterd=info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter))
        )
        .init();

    tracing::info!("Starting disconter {}", VERSION);

    let metrics = Metrics::new(VERSION).context("Failed to register metrics")?;

    let client = DockerControlPlane::connect(&config.docker.socket, config.docker.timeout_secs)
        .with_context(|| format!("Failed to set up client for {}", config.docker.socket))?;
    let client = Arc::new(client);

    // The first listing must succeed; after that the watcher keeps retrying on its own
    let instances = snapshot::fetch(client.as_ref())
        .await
        .with_context(|| format!("Failed to list containers via {}", config.docker.socket))?;
    let registry = Arc::new(Registry::new());
    registry.replace(Snapshot::new(instances));
    metrics.set_registry_size(registry.len());
    tracing::info!("Initial registry: {} instances", registry.len());
    if registry.read().is_empty() {
        tracing::warn!("No running containers carry a {} label yet", shared::protocol::SERVICE_LABEL);
    }

    // Create cancellation token for graceful shutdown
    let cancel = CancellationToken::new();

    let (notifier, notify_rx) = Notifier::channel(config.notifications.capacity, metrics.clone());
    let notify_handle = tokio::spawn(notifier::log_notifications(notify_rx));

    // Spawn watcher task
    let watcher = Watcher::new(
        client,
        registry.clone(),
        notifier,
        metrics.clone(),
        Duration::from_millis(config.docker.reconnect_backoff_ms),
    );
    let watcher_handle = tokio::spawn(watcher.run(cancel.clone()));

    // Spawn DNS listener
    let dns_state = dns::server::DnsState {
        registry: registry.clone(),
        metrics: metrics.clone(),
        zone: config.dns.zone.clone(),
    };
    let dns_listen = config.dns.listen.clone();
    let dns_handle = tokio::spawn(supervisor::supervise(
        "DNS listener",
        LISTENER_RESTART_DELAY,
        cancel.clone(),
        move |cancel| dns::server::serve(dns_listen.clone(), dns_state.clone(), cancel),
    ));

    // Spawn metrics and inspection API
    let app = api::routes::router(api::routes::AppState {
        registry: registry.clone(),
        metrics: metrics.clone(),
    });
    let http_listen = config.metrics.listen.clone();
    let http_handle = tokio::spawn(supervisor::supervise(
        "HTTP listener",
        LISTENER_RESTART_DELAY,
        cancel.clone(),
        move |cancel| serve_http(http_listen.clone(), app.clone(), cancel),
    ));

    wait_for_signal().await?;
    tracing::info!("Shutdown signal received");

    // Trigger cancellation
    cancel.cancel();

    // Wait for all tasks to complete
    let _ = tokio::join!(watcher_handle, dns_handle, http_handle);

    // The watcher owned the last notifier, so the log task drains and exits
    if let Err(e) = notify_handle.await {
        tracing::error!("Notification task failed: {}", e);
    }

    tracing::info!("Shutdown complete");
    Ok(())
}

async fn serve_http(listen: String, app: axum::Router, cancel: CancellationToken) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(&listen)
        .await
        .with_context(|| format!("Failed to bind to {}", listen))?;

    tracing::info!("Metrics API listening on {}", listen);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await
        .context("HTTP server error")
}

#[cfg(unix)]
async fn wait_for_signal() -> Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = signal(SignalKind::terminate()).context("Failed to listen for SIGTERM")?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result.context("Failed to listen for ctrl-c"),
        _ = terminate.recv() => Ok(()),
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() -> Result<()> {
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")
}
