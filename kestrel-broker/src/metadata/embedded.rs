//! A durable single-node metadata store embedded in the broker process.

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::{Context, Result};

use crate::config::Config;
use crate::database::{Database, Tree};
use crate::error::{AppError, ERR_ITER_FAILURE};
use crate::metadata::{plan_initial_assignment, BrokerRegistration, GroupOffset, MetadataStore, PartitionState, TopicDescriptor};
use crate::utils;

/// A metadata store backed by the broker's local sled database.
///
/// This backend provides no coordination between brokers and is intended for single-node
/// deployments. Topic creation is made exclusive through compare-and-swap.
pub struct EmbeddedMetadataStore {
    db: Database,
    brokers: Tree,
    topics: Tree,
    partitions: Tree,
    offsets: Tree,
}

impl EmbeddedMetadataStore {
    /// Open the store under the configured data root.
    pub async fn new(config: Arc<Config>) -> Result<Self> {
        let db = Database::new(config).await.context("error opening metadata database")?;
        Ok(Self {
            brokers: db.get_brokers_tree().await?,
            topics: db.get_topics_tree().await?,
            partitions: db.get_partitions_tree().await?,
            offsets: db.get_offsets_tree().await?,
            db,
        })
    }

    /// Run a blocking database operation, mapping storage faults to `Unavailable`.
    async fn run<F, R>(&self, op: &'static str, f: F) -> Result<R>
    where
        F: FnOnce() -> Result<R> + Send + 'static,
        R: Send + 'static,
    {
        let res = Database::spawn_blocking(f).await?;
        res.map_err(|err| match err.downcast::<AppError>() {
            Ok(app_err) => app_err.into(),
            Err(err) => AppError::Unavailable(format!("error during metadata {}: {:#}", op, err)).into(),
        })
    }

    fn live_brokers(brokers: &Tree) -> Result<BTreeMap<String, String>> {
        let now = utils::now_millis();
        let mut live = BTreeMap::new();
        for kv_res in brokers.iter() {
            let (_, val) = kv_res.context(ERR_ITER_FAILURE)?;
            let registration: BrokerRegistration = utils::decode_model(&val)?;
            if registration.expires_at_millis > now {
                live.insert(registration.broker_id, registration.address);
            }
        }
        Ok(live)
    }
}

#[async_trait::async_trait]
impl MetadataStore for EmbeddedMetadataStore {
    #[tracing::instrument(level = "trace", skip(self))]
    async fn register_broker(&self, broker_id: &str, address: &str, ttl_seconds: i64) -> Result<()> {
        let registration = BrokerRegistration {
            broker_id: broker_id.into(),
            address: address.into(),
            ttl_seconds,
            expires_at_millis: utils::now_millis() + ttl_seconds.saturating_mul(1000),
        };
        let tree = self.brokers.clone();
        self.run("broker registration", move || {
            let bytes = utils::encode_model(&registration)?;
            tree.insert(registration.broker_id.as_bytes(), bytes)?;
            tree.flush()?;
            Ok(())
        })
        .await
    }

    async fn deregister_broker(&self, broker_id: &str) -> Result<()> {
        let (tree, id) = (self.brokers.clone(), broker_id.to_string());
        self.run("broker deregistration", move || {
            tree.remove(id.as_bytes())?;
            tree.flush()?;
            Ok(())
        })
        .await
    }

    async fn list_brokers(&self) -> Result<BTreeMap<String, String>> {
        let tree = self.brokers.clone();
        self.run("broker listing", move || Self::live_brokers(&tree)).await
    }

    #[tracing::instrument(level = "trace", skip(self))]
    async fn create_topic(&self, descriptor: &TopicDescriptor) -> Result<()> {
        let (tree, descriptor) = (self.topics.clone(), descriptor.clone());
        self.run("topic creation", move || {
            let bytes = utils::encode_model(&descriptor)?;
            let swap = tree.compare_and_swap(descriptor.name.as_bytes(), None as Option<&[u8]>, Some(bytes))?;
            if swap.is_err() {
                return Err(AppError::AlreadyExists(format!("topic {}", descriptor.name)).into());
            }
            tree.flush()?;
            Ok(())
        })
        .await
    }

    async fn get_topic(&self, name: &str) -> Result<TopicDescriptor> {
        let (tree, name) = (self.topics.clone(), name.to_string());
        self.run("topic lookup", move || match tree.get(name.as_bytes())? {
            Some(bytes) => utils::decode_model(&bytes),
            None => Err(AppError::NotFound(format!("topic {}", name)).into()),
        })
        .await
    }

    async fn list_topics(&self) -> Result<Vec<TopicDescriptor>> {
        let tree = self.topics.clone();
        self.run("topic listing", move || {
            let mut topics = Vec::new();
            for kv_res in tree.iter() {
                let (_, val) = kv_res.context(ERR_ITER_FAILURE)?;
                topics.push(utils::decode_model(&val)?);
            }
            Ok(topics)
        })
        .await
    }

    #[tracing::instrument(level = "trace", skip(self))]
    async fn assign_initial_leaders(&self, topic: &str, partition_count: u32, replication_factor: u32) -> Result<Vec<PartitionState>> {
        let (brokers, partitions, topic) = (self.brokers.clone(), self.partitions.clone(), topic.to_string());
        self.run("leader assignment", move || {
            let plan = plan_initial_assignment(&Self::live_brokers(&brokers)?, partition_count, replication_factor)?;
            let mut batch = sled::Batch::default();
            for (partition, state) in plan.iter().enumerate() {
                batch.insert(utils::encode_partition_key(&topic, partition as u32), utils::encode_model(state)?);
            }
            partitions.apply_batch(batch)?;
            partitions.flush()?;
            Ok(plan)
        })
        .await
    }

    async fn get_partition_state(&self, topic: &str, partition: u32) -> Result<PartitionState> {
        let (tree, topic) = (self.partitions.clone(), topic.to_string());
        self.run("partition state lookup", move || match tree.get(utils::encode_partition_key(&topic, partition))? {
            Some(bytes) => utils::decode_model(&bytes),
            None => Err(AppError::NotFound(format!("partition {}/{}", topic, partition)).into()),
        })
        .await
    }

    #[tracing::instrument(level = "trace", skip(self))]
    async fn commit_offset(&self, group: &str, topic: &str, partition: u32, offset: i64) -> Result<()> {
        let tree = self.offsets.clone();
        let record = GroupOffset {
            group_id: group.into(),
            topic: topic.into(),
            partition,
            offset,
        };
        self.run("offset commit", move || {
            let key = utils::encode_group_offset_key(&record.group_id, &record.topic, record.partition);
            tree.insert(key, utils::encode_model(&record)?)?;
            tree.flush()?;
            Ok(())
        })
        .await
    }

    async fn fetch_group_offsets(&self, group: &str, topic: &str) -> Result<Vec<GroupOffset>> {
        let (tree, prefix) = (self.offsets.clone(), utils::encode_group_topic_prefix(group, topic));
        let (group, topic) = (group.to_string(), topic.to_string());
        self.run("offset fetch", move || {
            let mut offsets = Vec::new();
            for kv_res in tree.scan_prefix(prefix) {
                let (_, val) = kv_res.context(ERR_ITER_FAILURE)?;
                let record: GroupOffset = utils::decode_model(&val)?;
                // A NUL inside a stored group or topic can extend this prefix.
                if record.group_id == group && record.topic == topic {
                    offsets.push(record);
                }
            }
            Ok(offsets)
        })
        .await
    }

    async fn flush(&self) -> Result<()> {
        self.db.flush().await?;
        Ok(())
    }
}
