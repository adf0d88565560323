use std::net::Ipv4Addr;
use serde::Serialize;
use sha2::{Sha256, Digest};
use shared::types::{ServiceConfig, ServiceInstance};

#[derive(Serialize)]
struct HashView<'a> {
    id: &'a str,
    name: &'a str,
    address: Ipv4Addr,
    service: &'a ServiceConfig,
}

/// Computes a SHA-256 hash of a snapshot's instances.
/// Instances are sorted by id so the hash does not depend on runtime listing order.
pub fn compute_hash(instances: &[ServiceInstance]) -> String {
    let mut views: Vec<HashView> = instances
        .iter()
        .map(|instance| HashView {
            id: &instance.id,
            name: &instance.name,
            address: instance.address,
            service: &instance.service,
        })
        .collect();
    views.sort_by(|a, b| a.id.cmp(b.id));

    let json = serde_json::to_string(&views).expect("Failed to serialize instances for hashing");
    let mut hasher = Sha256::new();
    hasher.update(json.as_bytes());
    hex::encode(hasher.finalize())
}
