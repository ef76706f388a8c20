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
#[doc = r" Generated server implementations."]
pub mod broker_service_server {
    #![allow(unused_variables, dead_code, missing_docs, clippy::let_unit_value)]
    use tonic::codegen::*;
    #[doc = "Generated trait containing gRPC methods that should be implemented for use with BrokerServiceServer."]
    #[async_trait]
    pub trait BrokerService: Send + Sync + 'static {
        #[doc = " Append a batch of messages to a topic partition."]
        async fn produce(&self, request: tonic::Request<super::ProduceRequest>) -> Result<tonic::Response<super::ProduceResponse>, tonic::Status>;
        #[doc = " Read records from a topic partition starting at an offset."]
        async fn fetch(&self, request: tonic::Request<super::FetchRequest>) -> Result<tonic::Response<super::FetchResponse>, tonic::Status>;
        #[doc = " Commit the next offset to read for a consumer group."]
        async fn commit_offsets(&self, request: tonic::Request<super::CommitOffsetsRequest>) -> Result<tonic::Response<super::Empty>, tonic::Status>;
        #[doc = " Fetch all committed offsets of a consumer group for a topic."]
        async fn fetch_offsets(
            &self,
            request: tonic::Request<super::FetchOffsetsRequest>,
        ) -> Result<tonic::Response<super::FetchOffsetsResponse>, tonic::Status>;
        #[doc = " Create a new topic."]
        async fn create_topic(&self, request: tonic::Request<super::CreateTopicRequest>) -> Result<tonic::Response<super::Empty>, tonic::Status>;
    }
    #[doc = " The Kestrel broker interface."]
    #[derive(Debug)]
    pub struct BrokerServiceServer<T: BrokerService> {
        inner: _Inner<T>,
        accept_compression_encodings: (),
        send_compression_encodings: (),
    }
    struct _Inner<T>(Arc<T>);
    impl<T: BrokerService> BrokerServiceServer<T> {
        pub fn new(inner: T) -> Self {
            let inner = Arc::new(inner);
            let inner = _Inner(inner);
            Self {
                inner,
                accept_compression_encodings: Default::default(),
                send_compression_encodings: Default::default(),
            }
        }
        pub fn with_interceptor<F>(inner: T, interceptor: F) -> InterceptedService<Self, F>
        where
            F: tonic::service::Interceptor,
        {
            InterceptedService::new(Self::new(inner), interceptor)
        }
    }
    impl<T, B> tonic::codegen::Service<http::Request<B>> for BrokerServiceServer<T>
    where
        T: BrokerService,
        B: Body + Send + 'static,
        B::Error: Into<StdError> + Send + 'static,
    {
        type Response = http::Response<tonic::body::BoxBody>;
        type Error = Never;
        type Future = BoxFuture<Self::Response, Self::Error>;
        fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Ready(Ok(()))
        }
        fn call(&mut self, req: http::Request<B>) -> Self::Future {
            let inner = self.inner.clone();
            match req.uri().path() {
                "/kestrel.BrokerService/Produce" => {
                    #[allow(non_camel_case_types)]
                    struct ProduceSvc<T: BrokerService>(pub Arc<T>);
                    impl<T: BrokerService> tonic::server::UnaryService<super::ProduceRequest> for ProduceSvc<T> {
                        type Response = super::ProduceResponse;
                        type Future = BoxFuture<tonic::Response<Self::Response>, tonic::Status>;
                        fn call(&mut self, request: tonic::Request<super::ProduceRequest>) -> Self::Future {
                            let inner = self.0.clone();
                            let fut = async move { (*inner).produce(request).await };
                            Box::pin(fut)
                        }
                    }
                    let accept_compression_encodings = self.accept_compression_encodings;
                    let send_compression_encodings = self.send_compression_encodings;
                    let inner = self.inner.clone();
                    let fut = async move {
                        let inner = inner.0;
                        let method = ProduceSvc(inner);
                        let codec = tonic::codec::ProstCodec::default();
                        let mut grpc =
                            tonic::server::Grpc::new(codec).apply_compression_config(accept_compression_encodings, send_compression_encodings);
                        let res = grpc.unary(method, req).await;
                        Ok(res)
                    };
                    Box::pin(fut)
                }
                "/kestrel.BrokerService/Fetch" => {
                    #[allow(non_camel_case_types)]
                    struct FetchSvc<T: BrokerService>(pub Arc<T>);
                    impl<T: BrokerService> tonic::server::UnaryService<super::FetchRequest> for FetchSvc<T> {
                        type Response = super::FetchResponse;
                        type Future = BoxFuture<tonic::Response<Self::Response>, tonic::Status>;
                        fn call(&mut self, request: tonic::Request<super::FetchRequest>) -> Self::Future {
                            let inner = self.0.clone();
                            let fut = async move { (*inner).fetch(request).await };
                            Box::pin(fut)
                        }
                    }
                    let accept_compression_encodings = self.accept_compression_encodings;
                    let send_compression_encodings = self.send_compression_encodings;
                    let inner = self.inner.clone();
                    let fut = async move {
                        let inner = inner.0;
                        let method = FetchSvc(inner);
                        let codec = tonic::codec::ProstCodec::default();
                        let mut grpc =
                            tonic::server::Grpc::new(codec).apply_compression_config(accept_compression_encodings, send_compression_encodings);
                        let res = grpc.unary(method, req).await;
                        Ok(res)
                    };
                    Box::pin(fut)
                }
                "/kestrel.BrokerService/CommitOffsets" => {
                    #[allow(non_camel_case_types)]
                    struct CommitOffsetsSvc<T: BrokerService>(pub Arc<T>);
                    impl<T: BrokerService> tonic::server::UnaryService<super::CommitOffsetsRequest> for CommitOffsetsSvc<T> {
                        type Response = super::Empty;
                        type Future = BoxFuture<tonic::Response<Self::Response>, tonic::Status>;
                        fn call(&mut self, request: tonic::Request<super::CommitOffsetsRequest>) -> Self::Future {
                            let inner = self.0.clone();
                            let fut = async move { (*inner).commit_offsets(request).await };
                            Box::pin(fut)
                        }
                    }
                    let accept_compression_encodings = self.accept_compression_encodings;
                    let send_compression_encodings = self.send_compression_encodings;
                    let inner = self.inner.clone();
                    let fut = async move {
                        let inner = inner.0;
                        let method = CommitOffsetsSvc(inner);
                        let codec = tonic::codec::ProstCodec::default();
                        let mut grpc =
                            tonic::server::Grpc::new(codec).apply_compression_config(accept_compression_encodings, send_compression_encodings);
                        let res = grpc.unary(method, req).await;
                        Ok(res)
                    };
                    Box::pin(fut)
                }
                "/kestrel.BrokerService/FetchOffsets" => {
                    #[allow(non_camel_case_types)]
                    struct FetchOffsetsSvc<T: BrokerService>(pub Arc<T>);
                    impl<T: BrokerService> tonic::server::UnaryService<super::FetchOffsetsRequest> for FetchOffsetsSvc<T> {
                        type Response = super::FetchOffsetsResponse;
                        type Future = BoxFuture<tonic::Response<Self::Response>, tonic::Status>;
                        fn call(&mut self, request: tonic::Request<super::FetchOffsetsRequest>) -> Self::Future {
                            let inner = self.0.clone();
                            let fut = async move { (*inner).fetch_offsets(request).await };
                            Box::pin(fut)
                        }
                    }
                    let accept_compression_encodings = self.accept_compression_encodings;
                    let send_compression_encodings = self.send_compression_encodings;
                    let inner = self.inner.clone();
                    let fut = async move {
                        let inner = inner.0;
                        let method = FetchOffsetsSvc(inner);
                        let codec = tonic::codec::ProstCodec::default();
                        let mut grpc =
                            tonic::server::Grpc::new(codec).apply_compression_config(accept_compression_encodings, send_compression_encodings);
                        let res = grpc.unary(method, req).await;
                        Ok(res)
                    };
                    Box::pin(fut)
                }
                "/kestrel.BrokerService/CreateTopic" => {
                    #[allow(non_camel_case_types)]
                    struct CreateTopicSvc<T: BrokerService>(pub Arc<T>);
                    impl<T: BrokerService> tonic::server::UnaryService<super::CreateTopicRequest> for CreateTopicSvc<T> {
                        type Response = super::Empty;
                        type Future = BoxFuture<tonic::Response<Self::Response>, tonic::Status>;
                        fn call(&mut self, request: tonic::Request<super::CreateTopicRequest>) -> Self::Future {
                            let inner = self.0.clone();
                            let fut = async move { (*inner).create_topic(request).await };
                            Box::pin(fut)
                        }
                    }
                    let accept_compression_encodings = self.accept_compression_encodings;
                    let send_compression_encodings = self.send_compression_encodings;
                    let inner = self.inner.clone();
                    let fut = async move {
                        let inner = inner.0;
                        let method = CreateTopicSvc(inner);
                        let codec = tonic::codec::ProstCodec::default();
                        let mut grpc =
                            tonic::server::Grpc::new(codec).apply_compression_config(accept_compression_encodings, send_compression_encodings);
                        let res = grpc.unary(method, req).await;
                        Ok(res)
                    };
                    Box::pin(fut)
                }
                _ => Box::pin(async move {
                    Ok(http::Response::builder()
                        .status(200)
                        .header("grpc-status", "12")
                        .header("content-type", "application/grpc")
                        .body(empty_body())
                        .unwrap())
                }),
            }
        }
    }
    impl<T: BrokerService> Clone for BrokerServiceServer<T> {
        fn clone(&self) -> Self {
            let inner = self.inner.clone();
            Self {
                inner,
                accept_compression_encodings: self.accept_compression_encodings,
                send_compression_encodings: self.send_compression_encodings,
            }
        }
    }
    impl<T: BrokerService> Clone for _Inner<T> {
        fn clone(&self) -> Self {
            Self(self.0.clone())
        }
    }
    impl<T: std::fmt::Debug> std::fmt::Debug for _Inner<T> {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "{:?}", self.0)
        }
    }
    impl<T: BrokerService> tonic::transport::NamedService for BrokerServiceServer<T> {
        const NAME: &'static str = "kestrel.BrokerService";
    }
}
