//! RPC handlers of the broker service.

use std::sync::Arc;

use anyhow::Result;
use tonic::{Request, Response};

use super::{Deadline, Shared, DEFAULT_FETCH_MAX_MESSAGES, FETCH_MAX_MESSAGES_LIMIT, METRIC_FETCHED_RECORDS, METRIC_PRODUCED_RECORDS};
use crate::error::{AppError, AppErrorExt, RpcResult};
use crate::grpc::{self, Acks, BrokerService};
use crate::log::{Record, StoredRecord};
use crate::metadata::TopicDescriptor;

/// The gRPC handler of the broker service.
pub(super) struct BrokerHandler {
    shared: Arc<Shared>,
}

impl BrokerHandler {
    pub(super) fn new(shared: Arc<Shared>) -> Self {
        Self { shared }
    }
}

#[tonic::async_trait]
impl BrokerService for BrokerHandler {
    async fn produce(&self, request: Request<grpc::ProduceRequest>) -> RpcResult<Response<grpc::ProduceResponse>> {
        let _permit = self.shared.admit().await.map_err(AppError::grpc)?;
        let deadline = Deadline::from_metadata(request.metadata()).map_err(AppError::grpc)?;
        let res = self.shared.produce(deadline, request.into_inner()).await.map_err(AppError::grpc)?;
        Ok(Response::new(res))
    }

    async fn fetch(&self, request: Request<grpc::FetchRequest>) -> RpcResult<Response<grpc::FetchResponse>> {
        let _permit = self.shared.admit().await.map_err(AppError::grpc)?;
        let deadline = Deadline::from_metadata(request.metadata()).map_err(AppError::grpc)?;
        let res = self.shared.fetch(deadline, request.into_inner()).await.map_err(AppError::grpc)?;
        Ok(Response::new(res))
    }

    async fn commit_offsets(&self, request: Request<grpc::CommitOffsetsRequest>) -> RpcResult<Response<grpc::Empty>> {
        let _permit = self.shared.admit().await.map_err(AppError::grpc)?;
        let deadline = Deadline::from_metadata(request.metadata()).map_err(AppError::grpc)?;
        self.shared.commit_offsets(deadline, request.into_inner()).await.map_err(AppError::grpc)?;
        Ok(Response::new(grpc::Empty {}))
    }

    async fn fetch_offsets(&self, request: Request<grpc::FetchOffsetsRequest>) -> RpcResult<Response<grpc::FetchOffsetsResponse>> {
        let _permit = self.shared.admit().await.map_err(AppError::grpc)?;
        let deadline = Deadline::from_metadata(request.metadata()).map_err(AppError::grpc)?;
        let res = self.shared.fetch_offsets(deadline, request.into_inner()).await.map_err(AppError::grpc)?;
        Ok(Response::new(res))
    }

    async fn create_topic(&self, request: Request<grpc::CreateTopicRequest>) -> RpcResult<Response<grpc::Empty>> {
        let _permit = self.shared.admit().await.map_err(AppError::grpc)?;
        let deadline = Deadline::from_metadata(request.metadata()).map_err(AppError::grpc)?;
        let req = request.into_inner();
        deadline
            .run("creating topic", self.shared.coordinator.create_topic(&req.name, req.partitions, req.replication_factor))
            .await
            .map_err(AppError::grpc)?;
        Ok(Response::new(grpc::Empty {}))
    }
}

impl Shared {
    /// Append a batch of messages to a partition led by this broker.
    #[tracing::instrument(
        level = "debug",
        skip(self, deadline, req),
        fields(topic = %req.topic, partition = req.partition, count = req.messages.len())
    )]
    async fn produce(&self, deadline: Deadline, req: grpc::ProduceRequest) -> Result<grpc::ProduceResponse> {
        let partition = parse_partition(req.partition)?;
        let acks = Acks::from_request(req.acks)?;
        let store = self.coordinator.store();
        let topic = deadline.run("resolving topic", store.get_topic(&req.topic)).await?;
        check_partition_bounds(&topic, partition)?;
        let state = deadline.run("validating leadership", self.coordinator.validate_leader(&req.topic, partition)).await?;

        deadline.check("appending")?;
        let log = deadline.run("opening log", self.logs.get_or_open(&req.topic, partition)).await?;
        let count = req.messages.len() as i64;
        let records = req
            .messages
            .into_iter()
            .map(|msg| Record { key: msg.key, value: msg.value })
            .collect();
        // Once started, the append runs to completion even if the caller gives up.
        let first_offset = match log.append(records, acks.requires_sync()).await {
            Ok(first_offset) => first_offset,
            Err(err) => {
                // Leadership is re-read from the store before the next append to this partition.
                self.coordinator.invalidate(&req.topic, partition);
                return Err(err);
            }
        };

        deadline.run("awaiting replication", self.coordinator.await_replication(acks, &state)).await?;
        deadline.check("responding")?;
        metrics::counter!(METRIC_PRODUCED_RECORDS, count as u64);
        tracing::trace!(first_offset, "batch appended");
        Ok(grpc::ProduceResponse {
            partition: req.partition,
            offsets: (first_offset..first_offset + count).collect(),
        })
    }

    /// Read records from the local log of a partition.
    ///
    /// Leadership is not required. A partition without a local log behaves as an empty log.
    #[tracing::instrument(
        level = "debug",
        skip(self, deadline, req),
        fields(topic = %req.topic, partition = req.partition, offset = req.offset)
    )]
    async fn fetch(&self, deadline: Deadline, req: grpc::FetchRequest) -> Result<grpc::FetchResponse> {
        let partition = parse_partition(req.partition)?;
        let max_records = match req.max_messages {
            0 => DEFAULT_FETCH_MAX_MESSAGES,
            max if max < 0 => return Err(AppError::InvalidInput(format!("max messages must not be negative, got {}", max)).into()),
            max => (max as usize).min(FETCH_MAX_MESSAGES_LIMIT),
        };
        let topic = deadline.run("resolving topic", self.coordinator.store().get_topic(&req.topic)).await?;
        check_partition_bounds(&topic, partition)?;

        let log = match self.logs.get(&req.topic, partition) {
            Some(log) => Some(log),
            None => {
                let is_leader = deadline.run("resolving leadership", self.coordinator.is_leader(&req.topic, partition)).await?;
                if is_leader {
                    Some(deadline.run("opening log", self.logs.get_or_open(&req.topic, partition)).await?)
                } else {
                    None
                }
            }
        };
        let records = match log {
            Some(log) => deadline.run("reading log", log.read(req.offset, max_records)).await?,
            None if req.offset == 0 => Vec::new(),
            None => {
                return Err(AppError::OffsetOutOfRange {
                    offset: req.offset,
                    high_watermark: 0,
                }
                .into())
            }
        };

        metrics::counter!(METRIC_FETCHED_RECORDS, records.len() as u64);
        Ok(grpc::FetchResponse {
            records: records.into_iter().map(to_grpc_record).collect(),
        })
    }

    /// Commit the next offset to read for a consumer group.
    #[tracing::instrument(
        level = "debug",
        skip(self, deadline, req),
        fields(group = %req.group_id, topic = %req.topic, partition = req.partition, offset = req.offset)
    )]
    async fn commit_offsets(&self, deadline: Deadline, req: grpc::CommitOffsetsRequest) -> Result<()> {
        if req.group_id.is_empty() {
            return Err(AppError::InvalidInput("group id must not be empty".into()).into());
        }
        check_offset_key_part("group id", &req.group_id)?;
        check_offset_key_part("topic", &req.topic)?;
        let partition = parse_partition(req.partition)?;
        if req.offset < 0 {
            return Err(AppError::InvalidInput(format!("offset must not be negative, got {}", req.offset)).into());
        }
        let store = self.coordinator.store();
        deadline
            .run("committing offset", store.commit_offset(&req.group_id, &req.topic, partition, req.offset))
            .await
    }

    /// Fetch all committed offsets of a consumer group for a topic.
    #[tracing::instrument(level = "debug", skip(self, deadline, req), fields(group = %req.group_id, topic = %req.topic))]
    async fn fetch_offsets(&self, deadline: Deadline, req: grpc::FetchOffsetsRequest) -> Result<grpc::FetchOffsetsResponse> {
        check_offset_key_part("group id", &req.group_id)?;
        check_offset_key_part("topic", &req.topic)?;
        let store = self.coordinator.store();
        let mut offsets = deadline
            .run("fetching offsets", store.fetch_group_offsets(&req.group_id, &req.topic))
            .await?;
        offsets.sort_by_key(|offset| offset.partition);
        Ok(grpc::FetchOffsetsResponse {
            offsets: offsets
                .into_iter()
                .map(|offset| grpc::PartitionOffset {
                    partition: offset.partition as i32,
                    offset: offset.offset,
                })
                .collect(),
        })
    }
}

/// Decode the partition of a request.
fn parse_partition(partition: i32) -> Result<u32> {
    if partition < 0 {
        return Err(AppError::InvalidInput(format!("partition must not be negative, got {}", partition)).into());
    }
    Ok(partition as u32)
}

/// Group IDs and topics are NUL-separated in stored offset keys, so they may not contain NUL.
fn check_offset_key_part(field: &str, value: &str) -> Result<()> {
    if value.contains('\0') {
        return Err(AppError::InvalidInput(format!("{} must not contain NUL bytes", field)).into());
    }
    Ok(())
}

fn check_partition_bounds(topic: &TopicDescriptor, partition: u32) -> Result<()> {
    if partition >= topic.partition_count {
        return Err(AppError::NotFound(format!(
            "partition {} of topic {} ({} partitions)",
            partition, topic.name, topic.partition_count
        ))
        .into());
    }
    Ok(())
}

fn to_grpc_record(record: StoredRecord) -> grpc::Record {
    grpc::Record {
        message: Some(grpc::Message {
            key: record.key,
            value: record.value,
        }),
        offset: record.offset,
    }
}
