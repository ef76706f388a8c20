//! Admin client.

use crate::client::Client;
use crate::error::ClientResult;
use crate::grpc::CreateTopicRequest;

impl Client {
    /// Create a new admin handle.
    pub fn admin(&self) -> Admin {
        Admin { client: self.clone() }
    }
}

/// A client for cluster administration.
#[derive(Clone)]
pub struct Admin {
    client: Client,
}

impl Admin {
    /// Create a topic with the given number of partitions and replication factor.
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn create_topic(&self, name: &str, partitions: i32, replication_factor: i32) -> ClientResult<()> {
        let req = self.client.request(CreateTopicRequest {
            name: name.into(),
            partitions,
            replication_factor,
        });
        self.client.conn().create_topic(req).await?;
        Ok(())
    }
}
