//! Shared test setup.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tempfile::TempDir;

use crate::config::Config;
use crate::metadata::MemoryMetadataStore;
use crate::server::BrokerServer;

/// A running broker backed by an in-memory metadata store.
pub struct TestBroker {
    pub config: Arc<Config>,
    pub store: Arc<MemoryMetadataStore>,
    pub server: BrokerServer,
    pub addr: SocketAddr,
    pub client: kestrel_client::Client,
    _tmpdir: TempDir,
}

impl TestBroker {
    /// Start a broker using the default test config.
    pub async fn start() -> Result<Self> {
        Self::start_with(|_| ()).await
    }

    /// Start a broker, applying the given changes to the default test config.
    pub async fn start_with(configure: impl FnOnce(&mut Config)) -> Result<Self> {
        let (config, tmpdir) = Config::new_test()?;
        let mut config = config.as_ref().clone();
        configure(&mut config);
        let config = Arc::new(config);
        let store = Arc::new(MemoryMetadataStore::new());
        let server = BrokerServer::new(config.clone(), store.clone());
        let addr = server.start().await.context("error starting test broker")?;
        let client = kestrel_client::Client::connect(&format!("http://{}", addr))
            .await
            .context("error connecting to test broker")?;
        Ok(Self {
            config,
            store,
            server,
            addr,
            client,
            _tmpdir: tmpdir,
        })
    }
}
