//! An in-memory metadata store for tests.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use anyhow::Result;

use crate::error::AppError;
use crate::metadata::{plan_initial_assignment, GroupOffset, MetadataStore, PartitionState, TopicDescriptor};

/// An in-memory metadata store.
///
/// Alongside the store contract, this type exposes hooks to move partition leadership and to
/// simulate an outage or a slow coordination service.
#[derive(Default)]
pub struct MemoryMetadataStore {
    state: Mutex<MemoryState>,
    /// Set while the store simulates an outage.
    unavailable: AtomicBool,
    /// The latency added to every call, in milliseconds.
    delay_millis: AtomicU64,
}

#[derive(Default)]
struct MemoryState {
    /// Broker ID to address and registration expiry.
    brokers: BTreeMap<String, (String, Instant)>,
    topics: BTreeMap<String, TopicDescriptor>,
    partitions: HashMap<(String, u32), PartitionState>,
    /// (group, topic, partition) to committed offset.
    offsets: BTreeMap<(String, String, u32), i64>,
}

impl MemoryMetadataStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite the state of a partition, as an external re-election would.
    pub fn set_partition_state(&self, topic: &str, partition: u32, state: PartitionState) {
        self.lock().partitions.insert((topic.into(), partition), state);
    }

    /// Toggle a simulated outage; while unavailable every call fails as `Unavailable`.
    pub fn set_available(&self, available: bool) {
        self.unavailable.store(!available, Ordering::Release);
    }

    /// Add the given latency to every subsequent call.
    pub fn set_delay(&self, delay: Duration) {
        self.delay_millis.store(delay.as_millis() as u64, Ordering::Release);
    }

    async fn check_available(&self) -> Result<()> {
        let delay = self.delay_millis.load(Ordering::Acquire);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        if self.unavailable.load(Ordering::Acquire) {
            return Err(AppError::Unavailable("metadata store is unavailable".into()).into());
        }
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn live_brokers(state: &MemoryState) -> BTreeMap<String, String> {
        let now = Instant::now();
        state
            .brokers
            .iter()
            .filter(|(_, (_, expires_at))| *expires_at > now)
            .map(|(id, (address, _))| (id.clone(), address.clone()))
            .collect()
    }
}

#[async_trait::async_trait]
impl MetadataStore for MemoryMetadataStore {
    async fn register_broker(&self, broker_id: &str, address: &str, ttl_seconds: i64) -> Result<()> {
        self.check_available().await?;
        let expires_at = Instant::now() + Duration::from_secs(ttl_seconds.max(0) as u64);
        self.lock().brokers.insert(broker_id.into(), (address.into(), expires_at));
        Ok(())
    }

    async fn deregister_broker(&self, broker_id: &str) -> Result<()> {
        self.check_available().await?;
        self.lock().brokers.remove(broker_id);
        Ok(())
    }

    async fn list_brokers(&self) -> Result<BTreeMap<String, String>> {
        self.check_available().await?;
        Ok(Self::live_brokers(&self.lock()))
    }

    async fn create_topic(&self, descriptor: &TopicDescriptor) -> Result<()> {
        self.check_available().await?;
        let mut state = self.lock();
        if state.topics.contains_key(&descriptor.name) {
            return Err(AppError::AlreadyExists(format!("topic {}", descriptor.name)).into());
        }
        state.topics.insert(descriptor.name.clone(), descriptor.clone());
        Ok(())
    }

    async fn get_topic(&self, name: &str) -> Result<TopicDescriptor> {
        self.check_available().await?;
        self.lock()
            .topics
            .get(name)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("topic {}", name)).into())
    }

    async fn list_topics(&self) -> Result<Vec<TopicDescriptor>> {
        self.check_available().await?;
        Ok(self.lock().topics.values().cloned().collect())
    }

    async fn assign_initial_leaders(&self, topic: &str, partition_count: u32, replication_factor: u32) -> Result<Vec<PartitionState>> {
        self.check_available().await?;
        let mut state = self.lock();
        let plan = plan_initial_assignment(&Self::live_brokers(&state), partition_count, replication_factor)?;
        for (partition, partition_state) in plan.iter().enumerate() {
            state.partitions.insert((topic.into(), partition as u32), partition_state.clone());
        }
        Ok(plan)
    }

    async fn get_partition_state(&self, topic: &str, partition: u32) -> Result<PartitionState> {
        self.check_available().await?;
        self.lock()
            .partitions
            .get(&(topic.into(), partition))
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("partition {}/{}", topic, partition)).into())
    }

    async fn commit_offset(&self, group: &str, topic: &str, partition: u32, offset: i64) -> Result<()> {
        self.check_available().await?;
        self.lock().offsets.insert((group.into(), topic.into(), partition), offset);
        Ok(())
    }

    async fn fetch_group_offsets(&self, group: &str, topic: &str) -> Result<Vec<GroupOffset>> {
        self.check_available().await?;
        let state = self.lock();
        let offsets = state
            .offsets
            .iter()
            .filter(|((g, t, _), _)| g == group && t == topic)
            .map(|((g, t, partition), offset)| GroupOffset {
                group_id: g.clone(),
                topic: t.clone(),
                partition: *partition,
                offset: *offset,
            })
            .collect();
        Ok(offsets)
    }
}
