///////////////////////////////////////////////////////////////////////////////
// Components /////////////////////////////////////////////////////////////////

/// An empty message.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Empty {}
/// A key/value message.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Message {
    /// The key of the message, used for partition selection by producers.
    #[prost(bytes = "vec", tag = "1")]
    pub key: ::prost::alloc::vec::Vec<u8>,
    /// The value of the message.
    #[prost(bytes = "vec", tag = "2")]
    pub value: ::prost::alloc::vec::Vec<u8>,
}
/// A message as stored in a partition, along with its assigned offset.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Record {
    /// The stored message.
    #[prost(message, optional, tag = "1")]
    pub message: ::core::option::Option<Message>,
    /// The offset of the message within its partition.
    #[prost(int64, tag = "2")]
    pub offset: i64,
}
//////////////////////////////////////////////////////////////////////////////
// Produce ///////////////////////////////////////////////////////////////////

/// A request to append messages to a partition.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ProduceRequest {
    /// The target topic.
    #[prost(string, tag = "1")]
    pub topic: ::prost::alloc::string::String,
    /// The target partition.
    #[prost(int32, tag = "2")]
    pub partition: i32,
    /// The batch of messages to append.
    #[prost(message, repeated, tag = "3")]
    pub messages: ::prost::alloc::vec::Vec<Message>,
    /// The acknowledgement level of the batch.
    #[prost(enumeration = "Acks", tag = "4")]
    pub acks: i32,
}
/// A response to a produce request.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ProduceResponse {
    /// The partition to which the batch was written.
    #[prost(int32, tag = "1")]
    pub partition: i32,
    /// The offsets assigned to each message, in request order.
    #[prost(int64, repeated, tag = "2")]
    pub offsets: ::prost::alloc::vec::Vec<i64>,
}
//////////////////////////////////////////////////////////////////////////////
// Fetch /////////////////////////////////////////////////////////////////////

/// A request to read records from a partition.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct FetchRequest {
    /// The source topic.
    #[prost(string, tag = "1")]
    pub topic: ::prost::alloc::string::String,
    /// The source partition.
    #[prost(int32, tag = "2")]
    pub partition: i32,
    /// The offset of the first record to read.
    #[prost(int64, tag = "3")]
    pub offset: i64,
    /// The maximum number of records to return; `0` uses the server default.
    #[prost(int32, tag = "4")]
    pub max_messages: i32,
}
/// A response to a fetch request.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct FetchResponse {
    /// The records read, in offset order.
    #[prost(message, repeated, tag = "1")]
    pub records: ::prost::alloc::vec::Vec<Record>,
}
//////////////////////////////////////////////////////////////////////////////
// Consumer Group Offsets ////////////////////////////////////////////////////

/// A request to commit a consumer group offset.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CommitOffsetsRequest {
    /// The consumer group.
    #[prost(string, tag = "1")]
    pub group_id: ::prost::alloc::string::String,
    /// The topic.
    #[prost(string, tag = "2")]
    pub topic: ::prost::alloc::string::String,
    /// The partition.
    #[prost(int32, tag = "3")]
    pub partition: i32,
    /// The next offset to be read by the group.
    #[prost(int64, tag = "4")]
    pub offset: i64,
}
/// A request to fetch the committed offsets of a consumer group.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct FetchOffsetsRequest {
    /// The consumer group.
    #[prost(string, tag = "1")]
    pub group_id: ::prost::alloc::string::String,
    /// The topic.
    #[prost(string, tag = "2")]
    pub topic: ::prost::alloc::string::String,
}
/// A committed offset of a single partition.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PartitionOffset {
    /// The partition.
    #[prost(int32, tag = "1")]
    pub partition: i32,
    /// The committed offset.
    #[prost(int64, tag = "2")]
    pub offset: i64,
}
/// A response to a fetch offsets request.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct FetchOffsetsResponse {
    /// All committed offsets of the group for the topic, ordered by partition.
    #[prost(message, repeated, tag = "1")]
    pub offsets: ::prost::alloc::vec::Vec<PartitionOffset>,
}
//////////////////////////////////////////////////////////////////////////////
// Admin /////////////////////////////////////////////////////////////////////

/// A request to create a topic.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CreateTopicRequest {
    /// The name of the topic.
    #[prost(string, tag = "1")]
    pub name: ::prost::alloc::string::String,
    /// The number of partitions of the topic.
    #[prost(int32, tag = "2")]
    pub partitions: i32,
    /// The replication factor of the topic.
    #[prost(int32, tag = "3")]
    pub replication_factor: i32,
}
/// The acknowledgement level of a produce request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum Acks {
    /// Wait until the leader has durably persisted the batch.
    Leader = 0,
    /// Return as soon as the leader has accepted the batch.
    None = 1,
    /// Wait until the leader and all in-sync replicas have persisted the batch.
    All = 2,
}
#[doc = r" Generated client implementations."]
pub mod broker_service_client {
    #![allow(unused_variables, dead_code, missing_docs, clippy::let_unit_value)]
    use tonic::codegen::*;
    #[doc = " The Kestrel broker interface."]
    #[derive(Debug, Clone)]
    pub struct BrokerServiceClient<T> {
        inner: tonic::client::Grpc<T>,
    }
    impl BrokerServiceClient<tonic::transport::Channel> {
        #[doc = r" Attempt to create a new client by connecting to a given endpoint."]
        pub async fn connect<D>(dst: D) -> Result<Self, tonic::transport::Error>
        where
            D: std::convert::TryInto<tonic::transport::Endpoint>,
            D::Error: Into<StdError>,
        {
            let conn = tonic::transport::Endpoint::new(dst)?.connect().await?;
            Ok(Self::new(conn))
        }
    }
    impl<T> BrokerServiceClient<T>
    where
        T: tonic::client::GrpcService<tonic::body::BoxBody>,
        T::ResponseBody: Body + Send + Sync + 'static,
        T::Error: Into<StdError>,
        <T::ResponseBody as Body>::Error: Into<StdError> + Send,
    {
        pub fn new(inner: T) -> Self {
            let inner = tonic::client::Grpc::new(inner);
            Self { inner }
        }
        pub fn with_interceptor<F>(inner: T, interceptor: F) -> BrokerServiceClient<InterceptedService<T, F>>
        where
            F: tonic::service::Interceptor,
            T: tonic::codegen::Service<http::Request<tonic::body::BoxBody>, Response = http::Response<<T as tonic::client::GrpcService<tonic::body::BoxBody>>::ResponseBody>>,
            <T as tonic::codegen::Service<http::Request<tonic::body::BoxBody>>>::Error: Into<StdError> + Send + Sync,
        {
            BrokerServiceClient::new(InterceptedService::new(inner, interceptor))
        }
        #[doc = r" Compress requests with `gzip`."]
        #[doc = r""]
        #[doc = r" This requires the server to support it otherwise it might respond with an"]
        #[doc = r" error."]
        pub fn send_gzip(mut self) -> Self {
            self.inner = self.inner.send_gzip();
            self
        }
        #[doc = r" Enable decompressing responses with `gzip`."]
        pub fn accept_gzip(mut self) -> Self {
            self.inner = self.inner.accept_gzip();
            self
        }
        #[doc = " Append a batch of messages to a topic partition."]
        pub async fn produce(&mut self, request: impl tonic::IntoRequest<super::ProduceRequest>) -> Result<tonic::Response<super::ProduceResponse>, tonic::Status> {
            self.inner
                .ready()
                .await
                .map_err(|e| tonic::Status::new(tonic::Code::Unknown, format!("Service was not ready: {}", e.into())))?;
            let codec = tonic::codec::ProstCodec::default();
            let path = http::uri::PathAndQuery::from_static("/kestrel.BrokerService/Produce");
            self.inner.unary(request.into_request(), path, codec).await
        }
        #[doc = " Read records from a topic partition starting at an offset."]
        pub async fn fetch(&mut self, request: impl tonic::IntoRequest<super::FetchRequest>) -> Result<tonic::Response<super::FetchResponse>, tonic::Status> {
            self.inner
                .ready()
                .await
                .map_err(|e| tonic::Status::new(tonic::Code::Unknown, format!("Service was not ready: {}", e.into())))?;
            let codec = tonic::codec::ProstCodec::default();
            let path = http::uri::PathAndQuery::from_static("/kestrel.BrokerService/Fetch");
            self.inner.unary(request.into_request(), path, codec).await
        }
        #[doc = " Commit the next offset to read for a consumer group."]
        pub async fn commit_offsets(&mut self, request: impl tonic::IntoRequest<super::CommitOffsetsRequest>) -> Result<tonic::Response<super::Empty>, tonic::Status> {
            self.inner
                .ready()
                .await
                .map_err(|e| tonic::Status::new(tonic::Code::Unknown, format!("Service was not ready: {}", e.into())))?;
            let codec = tonic::codec::ProstCodec::default();
            let path = http::uri::PathAndQuery::from_static("/kestrel.BrokerService/CommitOffsets");
            self.inner.unary(request.into_request(), path, codec).await
        }
        #[doc = " Fetch all committed offsets of a consumer group for a topic."]
        pub async fn fetch_offsets(&mut self, request: impl tonic::IntoRequest<super::FetchOffsetsRequest>) -> Result<tonic::Response<super::FetchOffsetsResponse>, tonic::Status> {
            self.inner
                .ready()
                .await
                .map_err(|e| tonic::Status::new(tonic::Code::Unknown, format!("Service was not ready: {}", e.into())))?;
            let codec = tonic::codec::ProstCodec::default();
            let path = http::uri::PathAndQuery::from_static("/kestrel.BrokerService/FetchOffsets");
            self.inner.unary(request.into_request(), path, codec).await
        }
        #[doc = " Create a new topic."]
        pub async fn create_topic(&mut self, request: impl tonic::IntoRequest<super::CreateTopicRequest>) -> Result<tonic::Response<super::Empty>, tonic::Status> {
            self.inner
                .ready()
                .await
                .map_err(|e| tonic::Status::new(tonic::Code::Unknown, format!("Service was not ready: {}", e.into())))?;
            let codec = tonic::codec::ProstCodec::default();
            let path = http::uri::PathAndQuery::from_static("/kestrel.BrokerService/CreateTopic");
            self.inner.unary(request.into_request(), path, codec).await
        }
    }
}
