use std::collections::HashMap;
use std::io;
use async_trait::async_trait;
use bollard::container::ListContainersOptions;
use bollard::models::{ContainerSummary, EventMessage, EventMessageTypeEnum};
use bollard::{Docker, API_DEFAULT_VERSION};
use bytes::Bytes;
use futures::stream::{BoxStream, Stream, StreamExt, TryStreamExt};
use http_body_util::{BodyExt, BodyStream, Empty};
use hyper::Request;
use hyper_util::rt::TokioIo;
use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::UnixStream;
use tokio_util::io::StreamReader;
use crate::error::DiscoveryError;

/// `GET /events?filters={"type":["container"]}`
const EVENTS_PATH: &str = "/events?filters=%7B%22type%22%3A%5B%22container%22%5D%7D";

/// A container as listed by the runtime, before any filtering
#[derive(Debug, Clone, Default)]
pub struct ContainerRecord {
    pub id: String,
    pub names: Vec<String>,
    pub state: String,
    pub labels: HashMap<String, String>,
    /// Attached networks in the order the runtime reported them
    pub networks: Vec<NetworkAttachment>,
}

#[derive(Debug, Clone, Default)]
pub struct NetworkAttachment {
    pub network: String,
    pub ip_address: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    Container,
    Other(String),
}

/// A decoded lifecycle event from the subscription
#[derive(Debug, Clone)]
pub struct ContainerEvent {
    pub kind: EventKind,
    pub action: String,
    pub actor_id: String,
    pub attributes: HashMap<String, String>,
}

pub type EventStream = BoxStream<'static, Result<ContainerEvent, DiscoveryError>>;

/// The parts of the container runtime's control API the discovery engine uses.
#[async_trait]
pub trait ControlPlane: Send + Sync + 'static {
    /// One-shot listing of the containers currently known to the runtime
    async fn list_containers(&self) -> Result<Vec<ContainerRecord>, DiscoveryError>;

    /// Connect to the event endpoint. The returned stream ends when the connection does;
    /// decode failures of single records are yielded as `DiscoveryError::Decode` items.
    async fn subscribe(&self) -> Result<EventStream, DiscoveryError>;
}

/// Docker (or Podman) control API over the local unix socket.
///
/// Listings go through bollard. The event subscription is a plain HTTP/1 request on
/// its own connection so the newline-delimited body can be decoded record by record.
pub struct DockerControlPlane {
    docker: Docker,
    socket: String,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

impl DockerControlPlane {
    pub fn connect(socket: &str, timeout_secs: u64) -> Result<Self, DiscoveryError> {
        let docker = Docker::connect_with_unix(socket, timeout_secs, API_DEFAULT_VERSION)
            .map_err(|e| DiscoveryError::Transport(e.to_string()))?;
        Ok(Self {
            docker,
            socket: socket.trim_start_matches("unix://").to_string(),
        })
    }
}

fn transport(err: impl std::fmt::Display) -> DiscoveryError {
    DiscoveryError::Transport(err.to_string())
}

/// `{"message": ...}` bodies become `Protocol` errors carrying the daemon's message
fn server_error(status: u16, body: &[u8]) -> DiscoveryError {
    let message = match serde_json::from_slice::<ErrorBody>(body) {
        Ok(error) => error.message,
        Err(e) => format!("failed to parse error from daemon: {}", e),
    };
    DiscoveryError::Protocol { status, message }
}

/// Decode a newline-delimited stream of event records.
///
/// A record that fails to decode is yielded as `Decode` and reading carries on with
/// the next line. A read failure is yielded as `Transport` and ends the stream.
pub fn decode_events<S>(body: S) -> EventStream
where
    S: Stream<Item = Result<Bytes, io::Error>> + Send + 'static,
{
    async_stream::stream! {
        let mut reader = Box::pin(BufReader::new(StreamReader::new(body)));
        let mut line = Vec::new();

        loop {
            line.clear();
            match reader.read_until(b'\n', &mut line).await {
                Ok(0) => break,
                Ok(_) => {
                    let record = line.trim_ascii();
                    if record.is_empty() {
                        continue;
                    }
                    match serde_json::from_slice::<EventMessage>(record) {
                        Ok(message) => {
                            yield Ok(convert_event(message));
                        }
                        Err(e) => {
                            yield Err(DiscoveryError::Decode(e.to_string()));
                        }
                    }
                }
                Err(e) => {
                    yield Err(transport(e));
                    break;
                }
            }
        }
    }
    .boxed()
}

#[async_trait]
impl ControlPlane for DockerControlPlane {
    async fn list_containers(&self) -> Result<Vec<ContainerRecord>, DiscoveryError> {
        let options = ListContainersOptions::<String> {
            all: false,
            ..Default::default()
        };

        // A body that fails to decode is a bad response here, not a skippable event
        let containers = self
            .docker
            .list_containers(Some(options))
            .await
            .map_err(|e| match DiscoveryError::from(e) {
                DiscoveryError::Decode(message) => DiscoveryError::Protocol {
                    status: 200,
                    message: format!("malformed container list: {}", message),
                },
                other => other,
            })?;
        Ok(containers.into_iter().map(convert_summary).collect())
    }

    async fn subscribe(&self) -> Result<EventStream, DiscoveryError> {
        let stream = UnixStream::connect(&self.socket)
            .await
            .map_err(|e| transport(format!("{}: {}", self.socket, e)))?;

        let (mut sender, connection) = hyper::client::conn::http1::handshake(TokioIo::new(stream))
            .await
            .map_err(transport)?;
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                tracing::debug!("Event connection closed: {}", e);
            }
        });

        let request = Request::get(EVENTS_PATH)
            .header(hyper::header::HOST, "docker")
            .body(Empty::<Bytes>::new())
            .map_err(transport)?;
        let response = sender.send_request(request).await.map_err(transport)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.into_body().collect().await.map_err(transport)?.to_bytes();
            return Err(server_error(status.as_u16(), &body));
        }

        let body = BodyStream::new(response.into_body())
            .try_filter_map(|frame| async move { Ok(frame.into_data().ok()) })
            .map_err(io::Error::other);

        Ok(decode_events(body))
    }
}

fn convert_summary(summary: ContainerSummary) -> ContainerRecord {
    let networks = summary
        .network_settings
        .and_then(|settings| settings.networks)
        .unwrap_or_default()
        .into_iter()
        .map(|(network, endpoint)| NetworkAttachment {
            network,
            ip_address: endpoint.ip_address.unwrap_or_default(),
        })
        .collect();

    ContainerRecord {
        id: summary.id.unwrap_or_default(),
        names: summary.names.unwrap_or_default(),
        state: summary.state.unwrap_or_default(),
        labels: summary.labels.unwrap_or_default(),
        networks,
    }
}

fn convert_event(message: EventMessage) -> ContainerEvent {
    let kind = match message.typ {
        Some(EventMessageTypeEnum::CONTAINER) => EventKind::Container,
        Some(other) => EventKind::Other(format!("{:?}", other)),
        None => EventKind::Other(String::new()),
    };

    let (actor_id, attributes) = message
        .actor
        .map(|actor| {
            (
                actor.id.unwrap_or_default(),
                actor.attributes.unwrap_or_default(),
            )
        })
        .unwrap_or_default();

    ContainerEvent {
        kind,
        action: message.action.unwrap_or_default(),
        actor_id,
        attributes,
    }
}
