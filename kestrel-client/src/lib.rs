//! The Kestrel Rust client library.
//!
//! A `Client` holds a connection to a single broker. Producers, consumers and admin handles are
//! created from a client and share its connection.

mod client;
mod error;
mod grpc;
mod partitioner;

pub use crate::client::admin::Admin;
pub use crate::client::consumer::{ConsumedRecord, Consumer};
pub use crate::client::producer::Producer;
pub use crate::client::Client;
pub use crate::error::{ClientError, ClientResult, ErrorKind};
pub use crate::grpc::{Acks, Message, PartitionOffset};
pub use crate::partitioner::{fnv1a_32, partition_for_key};
