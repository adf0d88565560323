use std::net::Ipv4Addr;
use serde::{Serialize, Deserialize};
use crate::protocol::{DEFAULT_PORT, DEFAULT_PRIORITY, DEFAULT_TTL, DEFAULT_WEIGHT};

/// A running container that opted into discovery.
/// This is the canonical data model shared by the watcher, resolver and API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceInstance {
    /// Runtime identifier, stable for the container's lifetime
    pub id: String,

    /// Container name without the leading slash, e.g. "web1"
    pub name: String,

    /// Last non-empty IPv4 address across the attached networks
    pub address: Ipv4Addr,

    /// Label-derived service configuration
    pub service: ServiceConfig,
}

/// Per-instance configuration populated from labels when the snapshot is built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Logical service name the instance advertises under
    pub name: String,

    pub priority: u16,
    pub weight: u16,
    pub port: u16,

    /// TTL in seconds applied to synthesized records, 0 means do not cache
    pub ttl: u32,
}

impl ServiceConfig {
    /// Service configuration with every optional field at its default
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            priority: DEFAULT_PRIORITY,
            weight: DEFAULT_WEIGHT,
            port: DEFAULT_PORT,
            ttl: DEFAULT_TTL,
        }
    }
}
