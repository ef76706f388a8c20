//! Partition leadership coordination.
//!
//! The coordinator mediates every leadership-sensitive operation between the serving layer and
//! the metadata store. Partition states are cached for a bounded time; a cached state which names
//! another broker as leader is always re-fetched before a request is rejected, and the highest
//! leader epoch observed per partition is remembered so that a stale state can never replace a
//! newer one.
//!
//! Follower replication is not implemented, so `Acks::All` is satisfied by local durability on the
//! leader alone. `await_replication` is the point where follower acknowledgement would be awaited.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use anyhow::Result;

use crate::error::AppError;
use crate::grpc::Acks;
use crate::metadata::{DynMetadataStore, PartitionState, TopicDescriptor};

/// The maximum length of a topic name.
pub const MAX_TOPIC_NAME_LEN: usize = 249;

pub(crate) const METRIC_NOT_LEADER: &str = "kestrel_broker_not_leader_rejections";

/// Register the metrics of the replication subsystem.
pub fn register_metrics() {
    metrics::register_counter!(METRIC_NOT_LEADER, metrics::Unit::Count, "requests rejected because this broker does not lead the partition");
}

impl Acks {
    /// Decode the acknowledgement level of a request.
    pub fn from_request(val: i32) -> Result<Self> {
        Acks::from_i32(val).ok_or_else(|| AppError::InvalidInput(format!("unknown acks level {}", val)).into())
    }

    /// Whether this level requires the batch to be on disk before responding.
    pub fn requires_sync(&self) -> bool {
        !matches!(self, Acks::None)
    }
}

/// Coordinates partition leadership for a single broker.
pub struct ReplicationCoordinator {
    /// The ID of this broker.
    broker_id: String,
    /// The cluster metadata store.
    store: DynMetadataStore,
    /// The maximum age of a cached partition state.
    cache_ttl: Duration,
    cache: Mutex<HashMap<(String, u32), CachedState>>,
}

struct CachedState {
    state: PartitionState,
    fetched_at: Instant,
    /// Set when the cached state is known to be outdated.
    stale: bool,
    /// The highest leader epoch ever observed for the partition.
    highest_epoch: i64,
}

impl ReplicationCoordinator {
    /// Create a new instance.
    pub fn new(broker_id: String, store: DynMetadataStore, cache_ttl: Duration) -> Self {
        Self {
            broker_id,
            store,
            cache_ttl,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// The metadata store used by this coordinator.
    pub fn store(&self) -> &DynMetadataStore {
        &self.store
    }

    /// Ensure that this broker currently leads the given partition, returning its state.
    ///
    /// A cached state is used while fresh; if it names a different leader, the state is
    /// re-fetched before failing with `NotLeader`.
    #[tracing::instrument(level = "trace", skip(self))]
    pub async fn validate_leader(&self, topic: &str, partition: u32) -> Result<PartitionState> {
        let mut state = self.partition_state(topic, partition, false).await?;
        if state.leader != self.broker_id {
            state = self.partition_state(topic, partition, true).await?;
        }
        if state.leader != self.broker_id {
            metrics::increment_counter!(METRIC_NOT_LEADER);
            return Err(AppError::NotLeader {
                topic: topic.into(),
                partition,
                broker: self.broker_id.clone(),
                leader: state.leader,
            }
            .into());
        }
        Ok(state)
    }

    /// Check if this broker leads the given partition, without failing when it does not.
    pub async fn is_leader(&self, topic: &str, partition: u32) -> Result<bool> {
        let state = self.partition_state(topic, partition, false).await?;
        Ok(state.leader == self.broker_id)
    }

    /// Get the state of a partition, from cache unless it is stale or `refresh` is set.
    ///
    /// Fails with `Unavailable` if the metadata store yields a state whose epoch is lower than
    /// one previously observed.
    pub async fn partition_state(&self, topic: &str, partition: u32, refresh: bool) -> Result<PartitionState> {
        let key = (topic.to_string(), partition);
        if !refresh {
            if let Some(cached) = self.lock().get(&key) {
                if !cached.stale && cached.fetched_at.elapsed() < self.cache_ttl {
                    return Ok(cached.state.clone());
                }
            }
        }

        let state = self.store.get_partition_state(topic, partition).await?;
        let mut cache = self.lock();
        let highest_epoch = cache.get(&key).map(|cached| cached.highest_epoch).unwrap_or(i64::MIN);
        if state.leader_epoch < highest_epoch {
            tracing::warn!(topic, partition, epoch = state.leader_epoch, highest_epoch, "rejecting stale partition state");
            return Err(AppError::Unavailable(format!(
                "stale state for {}/{}: epoch {} is below observed epoch {}",
                topic, partition, state.leader_epoch, highest_epoch
            ))
            .into());
        }
        if highest_epoch != i64::MIN && state.leader_epoch > highest_epoch {
            tracing::info!(topic, partition, epoch = state.leader_epoch, leader = %state.leader, "observed partition leadership change");
        }
        cache.insert(
            key,
            CachedState {
                state: state.clone(),
                fetched_at: Instant::now(),
                stale: false,
                highest_epoch: state.leader_epoch,
            },
        );
        Ok(state)
    }

    /// Drop the cached state of a partition, keeping its fencing epoch.
    pub fn invalidate(&self, topic: &str, partition: u32) {
        if let Some(cached) = self.lock().get_mut(&(topic.to_string(), partition)) {
            cached.stale = true;
        }
    }

    /// Create a topic and assign the initial leadership of its partitions.
    ///
    /// If leader assignment fails after the topic was created, the topic is left without
    /// partition states and the error is returned; there is no rollback.
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn create_topic(&self, name: &str, partitions: i32, replication_factor: i32) -> Result<TopicDescriptor> {
        validate_topic_name(name)?;
        if partitions <= 0 {
            return Err(AppError::InvalidInput(format!("partition count must be positive, got {}", partitions)).into());
        }
        if replication_factor <= 0 {
            return Err(AppError::InvalidInput(format!("replication factor must be positive, got {}", replication_factor)).into());
        }
        let descriptor = TopicDescriptor {
            name: name.into(),
            partition_count: partitions as u32,
            replication_factor: replication_factor as u32,
        };
        self.store.create_topic(&descriptor).await?;
        if let Err(err) = self
            .store
            .assign_initial_leaders(name, descriptor.partition_count, descriptor.replication_factor)
            .await
        {
            tracing::error!(error = ?err, topic = name, "topic created but initial leader assignment failed");
            return Err(err);
        }
        tracing::info!(topic = name, partitions, replication_factor, "topic created");
        Ok(descriptor)
    }

    /// Wait for the replication demanded by the given acknowledgement level.
    ///
    /// Local durability is handled by the log append itself; without follower replication this
    /// has nothing further to wait for.
    pub async fn await_replication(&self, acks: Acks, state: &PartitionState) -> Result<()> {
        if acks == Acks::All && state.isr.iter().any(|id| id != &self.broker_id) {
            tracing::debug!(isr = ?state.isr, "acks=ALL satisfied by leader durability, follower replication is not available");
        }
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<(String, u32), CachedState>> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Validate a topic name: 1 to 249 characters of `[A-Za-z0-9._-]`, and not `.` or `..`.
pub fn validate_topic_name(name: &str) -> Result<()> {
    if name.is_empty() || name.len() > MAX_TOPIC_NAME_LEN {
        return Err(AppError::InvalidInput(format!("topic name must be 1 to {} characters long", MAX_TOPIC_NAME_LEN)).into());
    }
    if name == "." || name == ".." {
        return Err(AppError::InvalidInput(format!("topic name {} is reserved", name)).into());
    }
    if let Some(c) = name.chars().find(|c| !(c.is_ascii_alphanumeric() || *c == '.' || *c == '_' || *c == '-')) {
        return Err(AppError::InvalidInput(format!("invalid character {:?} in topic name", c)).into());
    }
    Ok(())
}
