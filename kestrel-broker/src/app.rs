use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use futures::stream::StreamExt;
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::{BroadcastStream, SignalStream};
use tokio_stream::StreamMap;

use crate::config::{Config, MetadataBackend};
use crate::metadata::{DynMetadataStore, EmbeddedMetadataStore, KubernetesMetadataStore};
use crate::server::{spawn_prom_server, BrokerServer};

/// A long-running service driven by the app.
#[async_trait::async_trait]
pub trait Service: Send + Sync + 'static {
    /// Start the service, returning the address it serves on.
    async fn start(&self) -> Result<SocketAddr>;
    /// Gracefully shut down the service.
    async fn shutdown(&self) -> Result<()>;
}

/// The application object for when Kestrel is running as a broker.
pub struct App<S: Service> {
    /// The application's runtime config.
    config: Arc<Config>,
    /// The service driven by this app.
    service: Arc<S>,
    /// A handle to the metrics recorder, served over HTTP when present.
    metrics: Option<PrometheusHandle>,

    /// A channel used for triggering graceful shutdown.
    shutdown_tx: broadcast::Sender<()>,
    /// A channel used for triggering graceful shutdown.
    shutdown_rx: BroadcastStream<()>,
}

impl App<BrokerServer> {
    /// Build the broker app using the metadata backend selected by the given config.
    pub async fn new_broker(config: Arc<Config>, metrics: Option<PrometheusHandle>) -> Result<Self> {
        let store: DynMetadataStore = match config.metadata_backend {
            MetadataBackend::Embedded => Arc::new(
                EmbeddedMetadataStore::new(config.clone())
                    .await
                    .context("error opening embedded metadata store")?,
            ),
            MetadataBackend::Kubernetes => Arc::new(
                KubernetesMetadataStore::try_default(&config.namespace)
                    .await
                    .context("error initializing kubernetes metadata store")?,
            ),
        };
        let server = BrokerServer::new(config.clone(), store);
        Ok(Self::new(config, server, metrics))
    }
}

impl<S: Service> App<S> {
    /// Create a new instance.
    pub fn new(config: Arc<Config>, service: S, metrics: Option<PrometheusHandle>) -> Self {
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        Self {
            config,
            service: Arc::new(service),
            metrics,
            shutdown_tx,
            shutdown_rx: BroadcastStream::new(shutdown_rx),
        }
    }

    /// A channel which triggers graceful shutdown of the app when sent on.
    #[cfg(test)]
    pub fn shutdown_handle(&self) -> broadcast::Sender<()> {
        self.shutdown_tx.clone()
    }

    pub fn spawn(self) -> JoinHandle<Result<()>> {
        tokio::spawn(self.run())
    }

    async fn run(mut self) -> Result<()> {
        let mut signals = StreamMap::new();
        signals.insert("sigterm", SignalStream::new(signal(SignalKind::terminate()).context("error building signal stream")?));
        signals.insert("sigint", SignalStream::new(signal(SignalKind::interrupt()).context("error building signal stream")?));

        let addr = self.service.start().await.context("error starting broker")?;
        tracing::info!(%addr, node_id = %self.config.node_id, "Kestrel broker is running");
        let metrics_server = self
            .metrics
            .take()
            .map(|handle| spawn_prom_server(handle, self.config.metrics_port, self.shutdown_tx.subscribe()));

        loop {
            tokio::select! {
                Some((_, sig)) = signals.next() => {
                    tracing::debug!(signal = ?sig, "signal received, beginning graceful shutdown");
                    break;
                }
                _ = self.shutdown_rx.next() => break,
            }
        }

        // Begin shutdown routine.
        tracing::debug!("Kestrel is shutting down");
        let _ = self.shutdown_tx.send(());
        let res = self.service.shutdown().await.context("error shutting down broker");
        if let Some(metrics_server) = metrics_server {
            if let Err(err) = metrics_server.await.context("error joining metrics server handle").and_then(|res| res) {
                tracing::error!(error = ?err, "error shutting down metrics server");
            }
        }

        tracing::debug!("Kestrel shutdown complete");
        res
    }
}
