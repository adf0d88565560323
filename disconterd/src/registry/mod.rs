pub mod hash;

use std::collections::HashMap;
use std::sync::Arc;
use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};
use serde::Serialize;
use shared::types::ServiceInstance;

/// An immutable, complete view of the discoverable instances at one point in time.
#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    pub instances: Vec<ServiceInstance>,
    pub hash: String,
    pub fetched_at: DateTime<Utc>,
}

impl Snapshot {
    /// Build a snapshot, keeping one instance per id.
    /// A repeated id replaces the earlier entry in place.
    pub fn new(instances: Vec<ServiceInstance>) -> Self {
        let mut positions: HashMap<String, usize> = HashMap::with_capacity(instances.len());
        let mut unique: Vec<ServiceInstance> = Vec::with_capacity(instances.len());

        for instance in instances {
            match positions.get(&instance.id) {
                Some(&pos) => unique[pos] = instance,
                None => {
                    positions.insert(instance.id.clone(), unique.len());
                    unique.push(instance);
                }
            }
        }

        let hash = hash::compute_hash(&unique);
        Self {
            instances: unique,
            hash,
            fetched_at: Utc::now(),
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }
}

/// Holder of the current snapshot.
///
/// Writers install a whole new snapshot; readers get an `Arc` to whichever snapshot was
/// current at the time of the call and keep it for as long as they need. Neither side
/// takes a lock, and no caller can reach the underlying collection mutably.
pub struct Registry {
    current: ArcSwap<Snapshot>,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            current: ArcSwap::from_pointee(Snapshot::empty()),
        }
    }

    /// Atomically install a new snapshot, returning the one it replaced
    pub fn replace(&self, snapshot: Snapshot) -> Arc<Snapshot> {
        self.current.swap(Arc::new(snapshot))
    }

    /// The current snapshot
    pub fn read(&self) -> Arc<Snapshot> {
        self.current.load_full()
    }

    pub fn len(&self) -> usize {
        self.current.load().len()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}
