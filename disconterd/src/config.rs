use std::path::Path;
use serde::Deserialize;
use anyhow::{Context, Result};
use shared::protocol::DEFAULT_ZONE;

pub const DEFAULT_CONFIG_PATH: &str = "/etc/disconter/disconter.toml";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub debug: bool,
    #[serde(default)]
    pub docker: DockerConfig,
    #[serde(default)]
    pub dns: DnsConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub notifications: NotificationConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DockerConfig {
    #[serde(default = "default_socket")]
    pub socket: String,
    /// Delay between failed connection attempts to the events endpoint
    #[serde(default = "default_reconnect_backoff")]
    pub reconnect_backoff_ms: u64,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DnsConfig {
    #[serde(default = "default_dns_listen")]
    pub listen: String,
    #[serde(default = "default_zone")]
    pub zone: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_listen")]
    pub listen: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NotificationConfig {
    #[serde(default = "default_capacity")]
    pub capacity: usize,
}

fn default_socket() -> String {
    "/var/run/docker.sock".to_string()
}

fn default_reconnect_backoff() -> u64 {
    1000
}

fn default_timeout() -> u64 {
    5
}

fn default_dns_listen() -> String {
    "0.0.0.0:53535".to_string()
}

fn default_zone() -> String {
    DEFAULT_ZONE.to_string()
}

fn default_metrics_listen() -> String {
    "0.0.0.0:9553".to_string()
}

fn default_capacity() -> usize {
    64
}

impl Default for DockerConfig {
    fn default() -> Self {
        Self {
            socket: default_socket(),
            reconnect_backoff_ms: default_reconnect_backoff(),
            timeout_secs: default_timeout(),
        }
    }
}

impl Default for DnsConfig {
    fn default() -> Self {
        Self {
            listen: default_dns_listen(),
            zone: default_zone(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            listen: default_metrics_listen(),
        }
    }
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::parse(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Load the file named on the command line, or the default path if it exists.
    /// Environment overrides are applied on top in both cases.
    pub fn resolve(explicit: Option<&str>) -> Result<Self> {
        let mut config = match explicit {
            Some(path) => Self::load(path)?,
            None if Path::new(DEFAULT_CONFIG_PATH).exists() => Self::load(DEFAULT_CONFIG_PATH)?,
            None => Self::default(),
        };

        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    fn parse(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// Override settings from environment variables named after the command-line flags
    /// of earlier releases (`bind.dns` becomes `BIND_DNS`).
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(listen) = lookup("BIND_DNS") {
            self.dns.listen = listen;
        }
        if let Some(listen) = lookup("BIND_METRICS") {
            self.metrics.listen = listen;
        }
        if let Some(socket) = lookup("DOCKER_SOCKET") {
            self.docker.socket = socket;
        }
        if let Some(zone) = lookup("DNS_ZONE") {
            self.dns.zone = zone;
        }
        if let Some(debug) = lookup("DEBUG") {
            self.debug = debug
                .parse()
                .with_context(|| format!("Invalid boolean for DEBUG: {}", debug))?;
        }
        Ok(())
    }
}
