use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, IntGaugeVec, Opts, Registry, TextEncoder};

/// Error sources counted under `disconter_discovery_errors{type}`
pub const CONNECT_ERROR: &str = "connectToSocket";
pub const LIST_ERROR: &str = "listContainers";
pub const EVENTS_ERROR: &str = "listenForEvents";

/// Increment-only counters for the discovery engine and the DNS listener.
/// Nothing in the engine reads them back.
#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    discovery_errors: IntCounterVec,
    dns_queries: IntCounterVec,
    dns_queries_total: IntCounter,
    dns_errors: IntCounter,
    notifications_dropped: IntCounter,
    registry_instances: IntGauge,
}

impl Metrics {
    pub fn new(version: &str) -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let info = IntGaugeVec::new(Opts::new("disconter_info", "Build information"), &["version"])?;
        registry.register(Box::new(info.clone()))?;
        info.with_label_values(&[version]).set(1);

        let discovery_errors = IntCounterVec::new(
            Opts::new("disconter_discovery_errors", "Container runtime errors by source"),
            &["type"],
        )?;
        registry.register(Box::new(discovery_errors.clone()))?;

        let dns_queries = IntCounterVec::new(
            Opts::new("disconter_dns_queries", "DNS questions by record type"),
            &["type"],
        )?;
        registry.register(Box::new(dns_queries.clone()))?;

        let dns_queries_total = IntCounter::new("disconter_dns_queries_total", "DNS questions received")?;
        registry.register(Box::new(dns_queries_total.clone()))?;

        let dns_errors = IntCounter::new("disconter_dns_errors", "DNS replies that could not be sent")?;
        registry.register(Box::new(dns_errors.clone()))?;

        let notifications_dropped = IntCounter::new(
            "disconter_notifications_dropped_total",
            "Registry change notifications dropped on a full queue",
        )?;
        registry.register(Box::new(notifications_dropped.clone()))?;

        let registry_instances = IntGauge::new(
            "disconter_registry_instances",
            "Instances in the current registry snapshot",
        )?;
        registry.register(Box::new(registry_instances.clone()))?;

        Ok(Self {
            registry,
            discovery_errors,
            dns_queries,
            dns_queries_total,
            dns_errors,
            notifications_dropped,
            registry_instances,
        })
    }

    pub fn discovery_error(&self, source: &str) {
        self.discovery_errors.with_label_values(&[source]).inc();
    }

    pub fn dns_query(&self, record_type: &str) {
        self.dns_queries.with_label_values(&[record_type]).inc();
        self.dns_queries_total.inc();
    }

    pub fn dns_error(&self) {
        self.dns_errors.inc();
    }

    pub fn notification_dropped(&self) {
        self.notifications_dropped.inc();
    }

    pub fn set_registry_size(&self, size: usize) {
        self.registry_instances.set(size as i64);
    }

    /// Render every metric in the Prometheus text exposition format
    pub fn export(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}
