//! A metadata store backed by the Kubernetes API server.
//!
//! Brokers register as `coordination.k8s.io/v1` Leases whose renew time and duration express the
//! registration TTL. Topic descriptors, partition states and group offsets are stored as
//! ConfigMaps. Exclusive topic creation relies on the API server rejecting the creation of an
//! object which already exists.
//!
//! Kubernetes object names are restricted to lowercase DNS subdomains, so every object name is
//! derived from a sanitized form of the original name plus a hash of it; the original names are
//! always kept in the object's data.

use std::collections::BTreeMap;
use std::future::Future;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::prelude::*;
use k8s_openapi::api::coordination::v1::{Lease, LeaseSpec};
use k8s_openapi::api::core::v1::ConfigMap;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{MicroTime, ObjectMeta};
use kube::api::{Api, DeleteParams, ListParams, Patch, PatchParams, PostParams};
use kube::client::Client;
use tokio::time::timeout;

use crate::error::AppError;
use crate::metadata::{plan_initial_assignment, GroupOffset, MetadataStore, PartitionState, TopicDescriptor};

/// The default timeout to use for interacting with the K8s API.
const API_TIMEOUT: Duration = Duration::from_secs(10);
/// The field manager name used for server-side apply.
const FIELD_MANAGER: &str = "kestrel-broker";
/// The number of attempts made to commit an offset when racing with a concurrent creation.
const COMMIT_ATTEMPTS: usize = 3;

const LABEL_PART_OF: &str = "app.kubernetes.io/part-of";
const LABEL_COMPONENT: &str = "app.kubernetes.io/component";
const ANNOTATION_ADDRESS: &str = "kestrel.io/address";
const PART_OF: &str = "kestrel";
const COMPONENT_BROKER: &str = "broker";
const COMPONENT_TOPIC: &str = "topic";
const COMPONENT_PARTITIONS: &str = "partitions";
const COMPONENT_OFFSETS: &str = "offsets";

const KEY_NAME: &str = "name";
const KEY_PARTITIONS: &str = "partitions";
const KEY_REPLICATION_FACTOR: &str = "replicationFactor";
const KEY_GROUP: &str = "group";
const KEY_TOPIC: &str = "topic";

/// A metadata store backed by Kubernetes Leases and ConfigMaps.
pub struct KubernetesMetadataStore {
    leases: Api<Lease>,
    config_maps: Api<ConfigMap>,
}

impl KubernetesMetadataStore {
    /// Create a new instance operating in the given namespace.
    pub fn new(client: Client, namespace: &str) -> Self {
        Self {
            leases: Api::namespaced(client.clone(), namespace),
            config_maps: Api::namespaced(client, namespace),
        }
    }

    /// Create a new instance using the in-cluster or local kubeconfig.
    pub async fn try_default(namespace: &str) -> Result<Self> {
        let client = Client::try_default().await.context("error initializing K8s client")?;
        Ok(Self::new(client, namespace))
    }

    async fn get_config_map(&self, name: &str, what: &str) -> Result<ConfigMap> {
        call(what, self.config_maps.get(name)).await?.map_err(|err| map_api_error(err, what))
    }

    async fn list_config_maps(&self, component: &str) -> Result<Vec<ConfigMap>> {
        let params = ListParams::default().labels(&format!("{}={},{}={}", LABEL_PART_OF, PART_OF, LABEL_COMPONENT, component));
        let list = call("config map listing", self.config_maps.list(&params))
            .await?
            .map_err(|err| map_api_error(err, "config map listing"))?;
        Ok(list.items)
    }
}

#[async_trait::async_trait]
impl MetadataStore for KubernetesMetadataStore {
    #[tracing::instrument(level = "trace", skip(self))]
    async fn register_broker(&self, broker_id: &str, address: &str, ttl_seconds: i64) -> Result<()> {
        let name = object_name("kestrel-broker", &[broker_id]);
        let now = Utc::now();
        let lease = Lease {
            metadata: ObjectMeta {
                name: Some(name.clone()),
                labels: Some(labels(COMPONENT_BROKER)),
                annotations: Some(BTreeMap::from([(ANNOTATION_ADDRESS.to_string(), address.to_string())])),
                ..Default::default()
            },
            spec: Some(LeaseSpec {
                holder_identity: Some(broker_id.into()),
                lease_duration_seconds: Some(ttl_seconds.clamp(1, i32::MAX as i64) as i32),
                renew_time: Some(MicroTime(now)),
                ..Default::default()
            }),
        };
        let mut params = PatchParams::apply(FIELD_MANAGER);
        params.force = true;
        call("broker registration", self.leases.patch(&name, &params, &Patch::Apply(&lease)))
            .await?
            .map_err(|err| map_api_error(err, "broker registration"))?;
        Ok(())
    }

    async fn deregister_broker(&self, broker_id: &str) -> Result<()> {
        let name = object_name("kestrel-broker", &[broker_id]);
        match call("broker deregistration", self.leases.delete(&name, &DeleteParams::default())).await? {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(resp)) if resp.code == 404 => Ok(()),
            Err(err) => Err(map_api_error(err, "broker deregistration")),
        }
    }

    async fn list_brokers(&self) -> Result<BTreeMap<String, String>> {
        let params = ListParams::default().labels(&format!("{}={},{}={}", LABEL_PART_OF, PART_OF, LABEL_COMPONENT, COMPONENT_BROKER));
        let leases = call("broker listing", self.leases.list(&params))
            .await?
            .map_err(|err| map_api_error(err, "broker listing"))?;
        let now = Utc::now();
        let live = leases
            .items
            .into_iter()
            .filter_map(|lease| {
                let spec = lease.spec?;
                let (MicroTime(renewed), ttl) = (spec.renew_time?, spec.lease_duration_seconds?);
                if renewed + chrono::Duration::seconds(ttl as i64) <= now {
                    return None;
                }
                let address = lease.metadata.annotations.as_ref()?.get(ANNOTATION_ADDRESS)?.clone();
                Some((spec.holder_identity?, address))
            })
            .collect();
        Ok(live)
    }

    #[tracing::instrument(level = "trace", skip(self))]
    async fn create_topic(&self, descriptor: &TopicDescriptor) -> Result<()> {
        let name = object_name("kestrel-topic", &[&descriptor.name]);
        let data = BTreeMap::from([
            (KEY_NAME.to_string(), descriptor.name.clone()),
            (KEY_PARTITIONS.to_string(), descriptor.partition_count.to_string()),
            (KEY_REPLICATION_FACTOR.to_string(), descriptor.replication_factor.to_string()),
        ]);
        let cm = config_map(name, COMPONENT_TOPIC, data);
        let what = format!("topic {}", descriptor.name);
        call(&what, self.config_maps.create(&PostParams::default(), &cm))
            .await?
            .map_err(|err| map_api_error(err, &what))?;
        Ok(())
    }

    async fn get_topic(&self, name: &str) -> Result<TopicDescriptor> {
        let what = format!("topic {}", name);
        let cm = self.get_config_map(&object_name("kestrel-topic", &[name]), &what).await?;
        decode_topic(&cm)
    }

    async fn list_topics(&self) -> Result<Vec<TopicDescriptor>> {
        self.list_config_maps(COMPONENT_TOPIC).await?.iter().map(decode_topic).collect()
    }

    #[tracing::instrument(level = "trace", skip(self))]
    async fn assign_initial_leaders(&self, topic: &str, partition_count: u32, replication_factor: u32) -> Result<Vec<PartitionState>> {
        let plan = plan_initial_assignment(&self.list_brokers().await?, partition_count, replication_factor)?;
        let mut data = BTreeMap::from([(KEY_TOPIC.to_string(), topic.to_string())]);
        for (partition, state) in plan.iter().enumerate() {
            encode_partition_state(partition as u32, state, &mut data);
        }
        let name = object_name("kestrel-partitions", &[topic]);
        let cm = config_map(name.clone(), COMPONENT_PARTITIONS, data);
        let mut params = PatchParams::apply(FIELD_MANAGER);
        params.force = true;
        let what = format!("partition states of topic {}", topic);
        call(&what, self.config_maps.patch(&name, &params, &Patch::Apply(&cm)))
            .await?
            .map_err(|err| map_api_error(err, &what))?;
        Ok(plan)
    }

    async fn get_partition_state(&self, topic: &str, partition: u32) -> Result<PartitionState> {
        let what = format!("partition {}/{}", topic, partition);
        let cm = self.get_config_map(&object_name("kestrel-partitions", &[topic]), &what).await?;
        decode_partition_state(&cm, partition)?.ok_or_else(|| AppError::NotFound(what).into())
    }

    #[tracing::instrument(level = "trace", skip(self))]
    async fn commit_offset(&self, group: &str, topic: &str, partition: u32, offset: i64) -> Result<()> {
        let name = object_name("kestrel-offsets", &[group, topic]);
        let what = format!("offsets of group {} on topic {}", group, topic);
        let patch = ConfigMap {
            data: Some(BTreeMap::from([(partition.to_string(), offset.to_string())])),
            ..Default::default()
        };
        for _ in 0..COMMIT_ATTEMPTS {
            match call(&what, self.config_maps.patch(&name, &PatchParams::default(), &Patch::Merge(&patch))).await? {
                Ok(_) => return Ok(()),
                Err(kube::Error::Api(resp)) if resp.code == 404 => (),
                Err(err) => return Err(map_api_error(err, &what)),
            }
            // The offsets object does not exist yet; create it, racing any other committer.
            let data = BTreeMap::from([
                (KEY_GROUP.to_string(), group.to_string()),
                (KEY_TOPIC.to_string(), topic.to_string()),
                (partition.to_string(), offset.to_string()),
            ]);
            match call(&what, self.config_maps.create(&PostParams::default(), &config_map(name.clone(), COMPONENT_OFFSETS, data))).await? {
                Ok(_) => return Ok(()),
                Err(kube::Error::Api(resp)) if resp.code == 409 => continue,
                Err(err) => return Err(map_api_error(err, &what)),
            }
        }
        Err(AppError::Unavailable(format!("conflict while committing {}", what)).into())
    }

    async fn fetch_group_offsets(&self, group: &str, topic: &str) -> Result<Vec<GroupOffset>> {
        let what = format!("offsets of group {} on topic {}", group, topic);
        let cm = match self.get_config_map(&object_name("kestrel-offsets", &[group, topic]), &what).await {
            Ok(cm) => cm,
            Err(err) if matches!(err.downcast_ref::<AppError>(), Some(AppError::NotFound(_))) => return Ok(vec![]),
            Err(err) => return Err(err),
        };
        let mut offsets = Vec::new();
        for (key, val) in cm.data.unwrap_or_default() {
            let partition = match key.parse::<u32>() {
                Ok(partition) => partition,
                Err(_) => continue, // Not a partition key.
            };
            let offset = val.parse::<i64>().with_context(|| format!("invalid offset {} stored for partition {}", val, partition))?;
            offsets.push(GroupOffset {
                group_id: group.into(),
                topic: topic.into(),
                partition,
                offset,
            });
        }
        offsets.sort_by_key(|offset| offset.partition);
        Ok(offsets)
    }
}

/// Run a K8s API call under the API timeout, surfacing an elapsed timeout as `Timeout`.
async fn call<T, F>(what: &str, fut: F) -> Result<Result<T, kube::Error>>
where
    F: Future<Output = Result<T, kube::Error>>,
{
    timeout(API_TIMEOUT, fut)
        .await
        .map_err(|_| AppError::Timeout(format!("timeout during K8s call for {}", what)).into())
}

/// Map an error from the K8s API into the matching application error.
fn map_api_error(err: kube::Error, what: &str) -> anyhow::Error {
    match err {
        kube::Error::Api(resp) if resp.code == 404 => AppError::NotFound(what.into()).into(),
        kube::Error::Api(resp) if resp.code == 409 => AppError::AlreadyExists(what.into()).into(),
        err => AppError::Unavailable(format!("K8s error for {}: {}", what, err)).into(),
    }
}

/// Build a DNS-subdomain-safe object name from a prefix and a set of arbitrary names.
pub(super) fn object_name(prefix: &str, parts: &[&str]) -> String {
    let mut name = String::from(prefix);
    let mut hashed = Vec::new();
    for part in parts {
        name.push('-');
        name.extend(
            part.chars()
                .take(40)
                .map(|c| c.to_ascii_lowercase())
                .map(|c| if c.is_ascii_alphanumeric() || c == '.' { c } else { '-' }),
        );
        hashed.extend_from_slice(part.as_bytes());
        hashed.push(0);
    }
    format!("{}-{:016x}", name, seahash::hash(&hashed))
}

fn labels(component: &str) -> BTreeMap<String, String> {
    BTreeMap::from([(LABEL_PART_OF.to_string(), PART_OF.to_string()), (LABEL_COMPONENT.to_string(), component.to_string())])
}

fn config_map(name: String, component: &str, data: BTreeMap<String, String>) -> ConfigMap {
    ConfigMap {
        metadata: ObjectMeta {
            name: Some(name),
            labels: Some(labels(component)),
            ..Default::default()
        },
        data: Some(data),
        ..Default::default()
    }
}

fn decode_topic(cm: &ConfigMap) -> Result<TopicDescriptor> {
    let data = cm.data.as_ref().context("topic config map has no data")?;
    let field = |key: &str| data.get(key).with_context(|| format!("topic config map is missing {}", key));
    Ok(TopicDescriptor {
        name: field(KEY_NAME)?.clone(),
        partition_count: field(KEY_PARTITIONS)?.parse().context("invalid topic partition count")?,
        replication_factor: field(KEY_REPLICATION_FACTOR)?.parse().context("invalid topic replication factor")?,
    })
}

/// Encode a partition state as `{p}.leader`, `{p}.epoch` and `{p}.isr` data keys.
pub(super) fn encode_partition_state(partition: u32, state: &PartitionState, data: &mut BTreeMap<String, String>) {
    data.insert(format!("{}.leader", partition), state.leader.clone());
    data.insert(format!("{}.epoch", partition), state.leader_epoch.to_string());
    data.insert(format!("{}.isr", partition), state.isr.join(","));
}

/// Decode the state of the given partition, if present.
pub(super) fn decode_partition_state(cm: &ConfigMap, partition: u32) -> Result<Option<PartitionState>> {
    let data = match cm.data.as_ref() {
        Some(data) => data,
        None => return Ok(None),
    };
    let (leader, epoch, isr) = match (
        data.get(&format!("{}.leader", partition)),
        data.get(&format!("{}.epoch", partition)),
        data.get(&format!("{}.isr", partition)),
    ) {
        (Some(leader), Some(epoch), Some(isr)) => (leader, epoch, isr),
        _ => return Ok(None),
    };
    Ok(Some(PartitionState {
        leader: leader.clone(),
        leader_epoch: epoch.parse().with_context(|| format!("invalid leader epoch {} for partition {}", epoch, partition))?,
        isr: isr.split(',').filter(|id| !id.is_empty()).map(String::from).collect(),
    }))
}
