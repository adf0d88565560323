use std::sync::Arc;
use std::time::Duration;
use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use shared::protocol::{DIE_ACTION, START_ACTION};
use crate::discovery::client::{ContainerEvent, ControlPlane, EventKind, EventStream};
use crate::discovery::snapshot;
use crate::metrics::{Metrics, CONNECT_ERROR, EVENTS_ERROR, LIST_ERROR};
use crate::notifier::Notifier;
use crate::registry::{Registry, Snapshot};

/// Keeps the registry in sync with the container runtime.
///
/// Each pass of the main loop connects to the event endpoint (retrying with a fixed
/// backoff until it succeeds), refreshes the registry, then hands the open stream to a
/// session task and waits for it to finish before reconnecting. At most one session is
/// active at a time.
pub struct Watcher<C: ControlPlane> {
    client: Arc<C>,
    registry: Arc<Registry>,
    notifier: Notifier,
    metrics: Metrics,
    backoff: Duration,
}

impl<C: ControlPlane> Clone for Watcher<C> {
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
            registry: self.registry.clone(),
            notifier: self.notifier.clone(),
            metrics: self.metrics.clone(),
            backoff: self.backoff,
        }
    }
}

impl<C: ControlPlane> Watcher<C> {
    pub fn new(
        client: Arc<C>,
        registry: Arc<Registry>,
        notifier: Notifier,
        metrics: Metrics,
        backoff: Duration,
    ) -> Self {
        Self {
            client,
            registry,
            notifier,
            metrics,
            backoff,
        }
    }

    /// Run until cancelled
    pub async fn run(self, cancel: CancellationToken) {
        tracing::info!("Starting container event watcher");

        loop {
            let Some(events) = self.connect(&cancel).await else {
                break;
            };

            // A failed refresh keeps the previous snapshot; streaming starts regardless
            self.refresh().await;

            let mut session = tokio::spawn(self.clone().stream_events(events));

            tokio::select! {
                result = &mut session => {
                    if let Err(e) = result {
                        tracing::error!("Event session task failed: {}", e);
                    }
                    tracing::warn!("Event stream closed, reconnecting");
                }
                _ = cancel.cancelled() => {
                    session.abort();
                    break;
                }
            }
        }

        tracing::info!("Container event watcher shutting down");
    }

    /// Subscribe to events, retrying forever. Returns None only when cancelled.
    async fn connect(&self, cancel: &CancellationToken) -> Option<EventStream> {
        loop {
            tokio::select! {
                result = self.client.subscribe() => match result {
                    Ok(events) => {
                        tracing::info!("Subscribed to container events");
                        return Some(events);
                    }
                    Err(e) => {
                        tracing::warn!(
                            "Error connecting to container runtime: {}. Retrying in {:?}",
                            e,
                            self.backoff
                        );
                        self.metrics.discovery_error(CONNECT_ERROR);
                    }
                },
                _ = cancel.cancelled() => return None,
            }

            tokio::select! {
                _ = tokio::time::sleep(self.backoff) => {}
                _ = cancel.cancelled() => return None,
            }
        }
    }

    /// Read events until the stream ends or fails
    async fn stream_events(self, mut events: EventStream) {
        while let Some(item) = events.next().await {
            match item {
                Ok(event) => {
                    if !is_membership_change(&event) {
                        continue;
                    }
                    tracing::debug!("Container {} {}", event.actor_id, event.action);
                    self.refresh().await;
                    self.notifier.notify(describe(&event));
                }
                Err(e) if e.is_recoverable() => {
                    tracing::warn!("Skipping event: {}", e);
                    self.metrics.discovery_error(EVENTS_ERROR);
                }
                Err(e) => {
                    tracing::error!("Error reading container events: {}", e);
                    self.metrics.discovery_error(EVENTS_ERROR);
                    break;
                }
            }
        }
    }

    /// Fetch a new snapshot and install it. Returns false if the fetch failed,
    /// in which case the registry is left untouched.
    pub async fn refresh(&self) -> bool {
        match snapshot::fetch(self.client.as_ref()).await {
            Ok(instances) => {
                let snapshot = Snapshot::new(instances);
                let size = snapshot.len();
                let hash = snapshot.hash.clone();

                let previous = self.registry.replace(snapshot);
                self.metrics.set_registry_size(size);

                if previous.hash == hash {
                    tracing::debug!("Registry unchanged ({} instances)", size);
                } else {
                    tracing::info!("Registry refreshed: {} instances, hash {}", size, &hash[..12]);
                }
                true
            }
            Err(e) => {
                tracing::error!("Failed to list containers: {}", e);
                self.metrics.discovery_error(LIST_ERROR);
                false
            }
        }
    }
}

/// Whether an event can change which opted-in containers are running
pub fn is_membership_change(event: &ContainerEvent) -> bool {
    event.kind == EventKind::Container
        && snapshot::service_label(&event.attributes).is_some()
        && (event.action == START_ACTION || event.action == DIE_ACTION)
}

fn describe(event: &ContainerEvent) -> String {
    let name = event
        .attributes
        .get("name")
        .map(String::as_str)
        .unwrap_or("-");
    format!("container {} {} ({})", event.action, name, event.actor_id)
}
