//! Consumer client.

use crate::client::Client;
use crate::error::ClientResult;
use crate::grpc::{CommitOffsetsRequest, FetchOffsetsRequest, FetchRequest, PartitionOffset};

impl Client {
    /// Create a new consumer for the given consumer group.
    pub fn consumer(&self, group_id: &str) -> Consumer {
        Consumer {
            client: self.clone(),
            group_id: group_id.into(),
        }
    }
}

/// A record read from a partition.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ConsumedRecord {
    pub offset: i64,
    pub key: Vec<u8>,
    pub value: Vec<u8>,
}

/// A client for reading records and tracking the progress of a consumer group.
#[derive(Clone)]
pub struct Consumer {
    client: Client,
    group_id: String,
}

impl Consumer {
    /// The consumer group of this consumer.
    pub fn group_id(&self) -> &str {
        &self.group_id
    }

    /// Fetch up to `max_messages` records of a partition starting at `offset`.
    ///
    /// A `max_messages` of `0` uses the broker's default.
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn fetch(&self, topic: &str, partition: i32, offset: i64, max_messages: i32) -> ClientResult<Vec<ConsumedRecord>> {
        let req = self.client.request(FetchRequest {
            topic: topic.into(),
            partition,
            offset,
            max_messages,
        });
        let res = self.client.conn().fetch(req).await?.into_inner();
        Ok(res
            .records
            .into_iter()
            .map(|record| {
                let msg = record.message.unwrap_or_default();
                ConsumedRecord {
                    offset: record.offset,
                    key: msg.key,
                    value: msg.value,
                }
            })
            .collect())
    }

    /// Commit `offset` as the next offset this group will read from the partition.
    #[tracing::instrument(level = "debug", skip(self), fields(group = %self.group_id))]
    pub async fn commit(&self, topic: &str, partition: i32, offset: i64) -> ClientResult<()> {
        let req = self.client.request(CommitOffsetsRequest {
            group_id: self.group_id.clone(),
            topic: topic.into(),
            partition,
            offset,
        });
        self.client.conn().commit_offsets(req).await?;
        Ok(())
    }

    /// Fetch all offsets committed by this group for a topic, ordered by partition.
    #[tracing::instrument(level = "debug", skip(self), fields(group = %self.group_id))]
    pub async fn fetch_offsets(&self, topic: &str) -> ClientResult<Vec<PartitionOffset>> {
        let req = self.client.request(FetchOffsetsRequest {
            group_id: self.group_id.clone(),
            topic: topic.into(),
        });
        let res = self.client.conn().fetch_offsets(req).await?.into_inner();
        Ok(res.offsets)
    }
}
