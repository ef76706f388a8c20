//! Cluster metadata.
//!
//! The `MetadataStore` trait abstracts over the consistent coordination service which is the sole
//! authority for cluster-wide state: the broker registry, topic descriptors, partition leadership
//! and consumer group offsets. All operations are remote calls which may fail as `Unavailable` or
//! `Timeout`; callers treat both as retryable.

mod embedded;
mod k8s;
#[cfg(test)]
mod memory;
mod models;

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::Result;

use crate::error::AppError;
pub use embedded::EmbeddedMetadataStore;
pub use k8s::KubernetesMetadataStore;
#[cfg(test)]
pub use memory::MemoryMetadataStore;
pub use models::{BrokerRegistration, GroupOffset, PartitionState, TopicDescriptor};

/// A shared handle to a metadata store.
pub type DynMetadataStore = Arc<dyn MetadataStore>;

/// The leader epoch assigned to every partition on topic creation.
pub const INITIAL_LEADER_EPOCH: i64 = 1;

/// The contract of the cluster metadata store.
#[async_trait::async_trait]
pub trait MetadataStore: Send + Sync + 'static {
    /// Register or renew a broker's registration, which expires after `ttl_seconds` unless
    /// renewed again.
    async fn register_broker(&self, broker_id: &str, address: &str, ttl_seconds: i64) -> Result<()>;

    /// Remove a broker's registration; removing an unknown broker is not an error.
    async fn deregister_broker(&self, broker_id: &str) -> Result<()>;

    /// List all live brokers, mapping broker ID to address.
    async fn list_brokers(&self) -> Result<BTreeMap<String, String>>;

    /// Create a topic, failing with `AlreadyExists` if the name is taken.
    async fn create_topic(&self, descriptor: &TopicDescriptor) -> Result<()>;

    /// Get a topic's descriptor, failing with `NotFound` if it does not exist.
    async fn get_topic(&self, name: &str) -> Result<TopicDescriptor>;

    /// List the descriptors of all topics.
    async fn list_topics(&self) -> Result<Vec<TopicDescriptor>>;

    /// Assign the initial leader and ISR of every partition of a topic over the live brokers.
    ///
    /// Fails with `InsufficientBrokers` if fewer brokers are live than the replication factor.
    async fn assign_initial_leaders(&self, topic: &str, partition_count: u32, replication_factor: u32) -> Result<Vec<PartitionState>>;

    /// Get the state of a partition, failing with `NotFound` if it has not been assigned.
    async fn get_partition_state(&self, topic: &str, partition: u32) -> Result<PartitionState>;

    /// Commit a group's next offset to read for a partition, overwriting any previous commit.
    async fn commit_offset(&self, group: &str, topic: &str, partition: u32, offset: i64) -> Result<()>;

    /// Fetch all offsets committed by a group for a topic, ordered by partition.
    ///
    /// Yields an empty vec when nothing has been committed.
    async fn fetch_group_offsets(&self, group: &str, topic: &str) -> Result<Vec<GroupOffset>>;

    /// Flush pending writes to durable storage. Backends without local state do nothing.
    async fn flush(&self) -> Result<()> {
        Ok(())
    }
}

/// Plan the initial partition states of a topic over the given live brokers.
///
/// Brokers are taken in ID order. The leader of partition `p` is `brokers[p % n]`, and the ISR is
/// the `replication_factor` brokers starting at the leader, wrapping around.
pub fn plan_initial_assignment(brokers: &BTreeMap<String, String>, partition_count: u32, replication_factor: u32) -> Result<Vec<PartitionState>> {
    let ids: Vec<&String> = brokers.keys().collect();
    if replication_factor == 0 || (ids.len() as u32) < replication_factor {
        return Err(AppError::InsufficientBrokers {
            required: replication_factor,
            live: ids.len() as u32,
        }
        .into());
    }
    let states = (0..partition_count as usize)
        .map(|partition| {
            let leader = partition % ids.len();
            let isr = (0..replication_factor as usize).map(|idx| ids[(leader + idx) % ids.len()].clone()).collect();
            PartitionState {
                leader: ids[leader].clone(),
                leader_epoch: INITIAL_LEADER_EPOCH,
                isr,
            }
        })
        .collect();
    Ok(states)
}
