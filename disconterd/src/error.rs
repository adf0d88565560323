use thiserror::Error;

/// Failures talking to the container runtime's control API
#[derive(Error, Debug)]
pub enum DiscoveryError {
    /// Control endpoint unreachable, or the connection dropped mid-request
    #[error("Transport error: {0}")]
    Transport(String),

    /// Non-success status or malformed response body from the control endpoint
    #[error("Unexpected response from container runtime ({status}): {message}")]
    Protocol { status: u16, message: String },

    /// A single event record that could not be decoded
    #[error("Failed to decode event: {0}")]
    Decode(String),

    /// A label value that could not be parsed; callers fall back to the default
    #[error("Invalid value {value:?} for label {key}")]
    Configuration { key: String, value: String },
}

impl DiscoveryError {
    /// Whether a streaming session can continue after this error
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Decode(_) | Self::Configuration { .. })
    }
}

impl From<bollard::errors::Error> for DiscoveryError {
    fn from(err: bollard::errors::Error) -> Self {
        use bollard::errors::Error;

        match err {
            Error::DockerResponseServerError { status_code, message } => Self::Protocol {
                status: status_code,
                message,
            },
            other @ (Error::JsonDataError { .. } | Error::JsonSerdeError { .. }) => Self::Decode(other.to_string()),
            other => Self::Transport(other.to_string()),
        }
    }
}
