//! Metadata models, encoded with protobuf for durable storage.

/// The immutable descriptor of a topic.
#[derive(Clone, PartialEq, Eq, ::prost::Message)]
pub struct TopicDescriptor {
    /// The name of the topic.
    #[prost(string, tag = "1")]
    pub name: ::prost::alloc::string::String,
    /// The number of partitions of the topic.
    #[prost(uint32, tag = "2")]
    pub partition_count: u32,
    /// The number of replicas of each partition.
    #[prost(uint32, tag = "3")]
    pub replication_factor: u32,
}

/// The leadership state of a partition.
#[derive(Clone, PartialEq, Eq, ::prost::Message)]
pub struct PartitionState {
    /// The ID of the broker leading the partition.
    #[prost(string, tag = "1")]
    pub leader: ::prost::alloc::string::String,
    /// The fencing token of the current leadership, incremented on every leadership change.
    #[prost(int64, tag = "2")]
    pub leader_epoch: i64,
    /// The brokers in sync with the leader, leader first.
    #[prost(string, repeated, tag = "3")]
    pub isr: ::prost::alloc::vec::Vec<::prost::alloc::string::String>,
}

/// A broker's liveness registration.
#[derive(Clone, PartialEq, Eq, ::prost::Message)]
pub struct BrokerRegistration {
    #[prost(string, tag = "1")]
    pub broker_id: ::prost::alloc::string::String,
    /// The address on which the broker serves clients.
    #[prost(string, tag = "2")]
    pub address: ::prost::alloc::string::String,
    #[prost(int64, tag = "3")]
    pub ttl_seconds: i64,
    /// The unix time in milliseconds after which the registration is expired.
    #[prost(int64, tag = "4")]
    pub expires_at_millis: i64,
}

/// A consumer group's committed offset for a partition.
#[derive(Clone, PartialEq, Eq, ::prost::Message)]
pub struct GroupOffset {
    #[prost(string, tag = "1")]
    pub group_id: ::prost::alloc::string::String,
    #[prost(string, tag = "2")]
    pub topic: ::prost::alloc::string::String,
    #[prost(uint32, tag = "3")]
    pub partition: u32,
    /// The next offset to be read by the group.
    #[prost(int64, tag = "4")]
    pub offset: i64,
}
