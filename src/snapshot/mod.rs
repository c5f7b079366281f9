//! Durable replica snapshot
//!
//! The snapshot maps a workload identity (`namespace/name`) to the replica
//! count captured when it was paused. It outlives the process so a later
//! resume pass, possibly after a restart, can restore the original scale.

mod configmap;

pub use configmap::ConfigMapReplicaStore;

use std::collections::BTreeMap;

use async_trait::async_trait;
use tracing::warn;

use crate::error::Result;

/// Default snapshot record name
pub const DEFAULT_SNAPSHOT_NAME: &str = "controller-replicas";

/// Default snapshot record namespace
pub const DEFAULT_SNAPSHOT_NAMESPACE: &str = "cattle-resources-system";

/// Durable key-value record of captured replica counts
#[async_trait]
pub trait ReplicaStore: Send + Sync {
    /// Record the captured count for an identity, creating the record on
    /// first use. Writes for different identities are independent.
    async fn record(&self, identity: &str, replicas: i32) -> Result<()>;

    /// Drop the entry for an identity. Missing entries are not an error.
    async fn forget(&self, identity: &str) -> Result<()>;

    /// Look up a single entry.
    async fn lookup(&self, identity: &str) -> Result<Option<i32>>;

    /// Load the whole record. A missing record is an empty snapshot.
    async fn load(&self) -> Result<ReplicaSnapshot>;

    /// Delete the whole record.
    async fn clear(&self) -> Result<()>;
}

/// Immutable view of the snapshot record, loaded once per resume pass
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReplicaSnapshot {
    entries: BTreeMap<String, i32>,
}

impl ReplicaSnapshot {
    /// Build from raw record data. Entries that are not non-negative integers
    /// are dropped with a warning.
    pub fn from_data(data: &BTreeMap<String, String>) -> Self {
        let entries = data
            .iter()
            .filter_map(|(identity, raw)| match parse_count(raw) {
                Some(replicas) => Some((identity.clone(), replicas)),
                None => {
                    warn!(identity = %identity, value = %raw, "Ignoring unparseable replica entry");
                    None
                }
            })
            .collect();
        Self { entries }
    }

    pub fn get(&self, identity: &str) -> Option<i32> {
        self.entries.get(identity).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Stringified form, as stored in the record
    pub fn to_data(&self) -> BTreeMap<String, String> {
        self.entries
            .iter()
            .map(|(k, v)| (k.clone(), v.to_string()))
            .collect()
    }
}

impl FromIterator<(String, i32)> for ReplicaSnapshot {
    fn from_iter<I: IntoIterator<Item = (String, i32)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().filter(|(_, v)| *v >= 0).collect(),
        }
    }
}

/// Parse a stored count. Negative values are rejected.
pub fn parse_count(raw: &str) -> Option<i32> {
    raw.trim().parse::<i32>().ok().filter(|v| *v >= 0)
}
