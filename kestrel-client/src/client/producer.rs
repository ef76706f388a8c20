//! Producer client.

use crate::client::Client;
use crate::error::ClientResult;
use crate::grpc::{Acks, Message, ProduceRequest};
use crate::partitioner::partition_for_key;

impl Client {
    /// Create a new producer.
    pub fn producer(&self) -> Producer {
        Producer { client: self.clone() }
    }
}

/// A client for appending messages to topics.
#[derive(Clone)]
pub struct Producer {
    client: Client,
}

impl Producer {
    /// Produce a single message, returning the partition it was written to and its offset.
    ///
    /// The partition is selected by hashing the key over the topic's `partition_count`.
    #[tracing::instrument(level = "debug", skip(self, key, value, partition_count))]
    pub async fn produce(&self, topic: &str, key: &[u8], value: &[u8], partition_count: u32, acks: Acks) -> ClientResult<(i32, i64)> {
        let partition = partition_for_key(key, partition_count)? as i32;
        let msg = Message {
            key: key.to_vec(),
            value: value.to_vec(),
        };
        let offsets = self.produce_batch(topic, partition, vec![msg], acks).await?;
        Ok((partition, offsets.first().copied().unwrap_or_default()))
    }

    /// Produce a batch of messages to a partition, returning the offset of each message.
    ///
    /// Either all messages of the batch are appended or none are.
    #[tracing::instrument(level = "debug", skip(self, messages))]
    pub async fn produce_batch(&self, topic: &str, partition: i32, messages: Vec<Message>, acks: Acks) -> ClientResult<Vec<i64>> {
        let req = self.client.request(ProduceRequest {
            topic: topic.into(),
            partition,
            messages,
            acks: acks as i32,
        });
        let res = self.client.conn().produce(req).await?.into_inner();
        Ok(res.offsets)
    }
}
