use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::str::FromStr;
use shared::protocol::{PORT_LABEL, PRIORITY_LABEL, RUNNING_STATE, SERVICE_LABEL, TTL_LABEL, WEIGHT_LABEL};
use shared::types::{ServiceConfig, ServiceInstance};
use crate::discovery::client::{ContainerRecord, ControlPlane, NetworkAttachment};
use crate::error::DiscoveryError;

/// List the runtime's containers and keep the ones that qualify for discovery.
/// Errors are returned as-is; retrying is up to the caller.
pub async fn fetch<C: ControlPlane + ?Sized>(client: &C) -> Result<Vec<ServiceInstance>, DiscoveryError> {
    let records = client.list_containers().await?;
    Ok(build(records))
}

/// Turn raw container records into service instances, preserving listing order.
///
/// A record qualifies when it is running and carries a non-empty service label.
/// Qualifying records without any IPv4 address are dropped.
pub fn build(records: Vec<ContainerRecord>) -> Vec<ServiceInstance> {
    records.into_iter().filter_map(convert_record).collect()
}

fn convert_record(record: ContainerRecord) -> Option<ServiceInstance> {
    if record.state != RUNNING_STATE {
        return None;
    }

    let service_name = service_label(&record.labels)?;

    let name = record
        .names
        .first()
        .map(|n| n.trim_start_matches('/').to_string())
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| record.id.clone());

    let Some(address) = last_address(&record.networks) else {
        let networks: Vec<&str> = record.networks.iter().map(|n| n.network.as_str()).collect();
        tracing::debug!("Skipping container {} - no IPv4 address on networks {:?}", name, networks);
        return None;
    };

    let mut service = ServiceConfig::new(service_name);
    apply_override(&record.labels, PRIORITY_LABEL, &mut service.priority);
    apply_override(&record.labels, WEIGHT_LABEL, &mut service.weight);
    apply_override(&record.labels, PORT_LABEL, &mut service.port);
    apply_override(&record.labels, TTL_LABEL, &mut service.ttl);

    Some(ServiceInstance {
        id: record.id,
        name,
        address,
        service,
    })
}

/// The opt-in service name; a missing key and an empty value both disqualify.
pub fn service_label(labels: &HashMap<String, String>) -> Option<&str> {
    labels
        .get(SERVICE_LABEL)
        .map(String::as_str)
        .filter(|name| !name.is_empty())
}

/// Last non-empty IPv4 address in the order the runtime reported the networks.
fn last_address(networks: &[NetworkAttachment]) -> Option<Ipv4Addr> {
    networks
        .iter()
        .filter(|n| !n.ip_address.is_empty())
        .filter_map(|n| n.ip_address.parse::<Ipv4Addr>().ok())
        .last()
}

fn apply_override<T: FromStr>(labels: &HashMap<String, String>, key: &str, field: &mut T) {
    let Some(value) = labels.get(key).filter(|v| !v.is_empty()) else {
        return;
    };

    match parse_label(key, value) {
        Ok(parsed) => *field = parsed,
        Err(e) => tracing::debug!("{}, keeping default", e),
    }
}

fn parse_label<T: FromStr>(key: &str, value: &str) -> Result<T, DiscoveryError> {
    value.trim().parse().map_err(|_| DiscoveryError::Configuration {
        key: key.to_string(),
        value: value.to_string(),
    })
}
