//! Kestrel client.

pub mod admin;
pub mod consumer;
pub mod producer;

use std::time::Duration;

use tonic::transport::{Channel, Endpoint};
use tonic::Request;

use crate::error::{ClientError, ClientResult, ErrorKind};
use crate::grpc::BrokerServiceClient;

/// A client connected to a single Kestrel broker.
///
/// Clients are cheap to clone; all clones share the same underlying connection.
#[derive(Clone)]
pub struct Client {
    conn: BrokerServiceClient<Channel>,
    /// The timeout applied to each request, sent to the broker as the request deadline.
    timeout: Option<Duration>,
}

impl Client {
    /// Connect to the broker at the given URL, e.g. `http://127.0.0.1:7000`.
    pub async fn connect(url: &str) -> ClientResult<Self> {
        let endpoint = parse_endpoint(url)?;
        let chan = endpoint.connect().await?;
        tracing::debug!(url, "connected to kestrel broker");
        Ok(Self::from_channel(chan))
    }

    /// Create a client for the broker at the given URL which connects on first use.
    pub fn connect_lazy(url: &str) -> ClientResult<Self> {
        let endpoint = parse_endpoint(url)?;
        Ok(Self::from_channel(endpoint.connect_lazy()))
    }

    fn from_channel(chan: Channel) -> Self {
        Self {
            conn: BrokerServiceClient::new(chan),
            timeout: None,
        }
    }

    /// Set the timeout applied to each request made by this client.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// A handle to the underlying connection.
    pub(crate) fn conn(&self) -> BrokerServiceClient<Channel> {
        self.conn.clone()
    }

    /// Wrap the given message as a request carrying this client's timeout.
    pub(crate) fn request<T>(&self, msg: T) -> Request<T> {
        let mut req = Request::new(msg);
        if let Some(timeout) = self.timeout {
            req.set_timeout(timeout);
        }
        req
    }
}

fn parse_endpoint(url: &str) -> ClientResult<Endpoint> {
    Endpoint::from_shared(url.to_string()).map_err(|err| ClientError::new(ErrorKind::InvalidInput, format!("invalid broker URL {:?}: {}", url, err)))
}
