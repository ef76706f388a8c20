//! The broker's RPC server and its lifecycle.
//!
//! A `BrokerServer` moves through the phases `Idle -> Running -> Draining -> Closed`. Starting
//! binds the listener, registers the broker in the metadata store and opens the logs of every
//! partition it leads. Shutting down stops the listener, waits for in-flight requests up to the
//! configured grace period, closes all logs and deregisters the broker.

mod deadline;
#[cfg(test)]
mod deadline_test;
mod handlers;
mod prom;

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use arc_swap::ArcSwap;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, Mutex, OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::transport::Server;

use crate::app::Service;
use crate::config::Config;
use crate::error::{AppError, ERR_SHUTTING_DOWN};
use crate::grpc::BrokerServiceServer;
use crate::log::SegmentedLog;
use crate::metadata::DynMetadataStore;
use crate::replication::ReplicationCoordinator;
pub use deadline::Deadline;
use handlers::BrokerHandler;
pub use prom::spawn_prom_server;

/// The number of records returned by a fetch which does not specify a maximum.
pub const DEFAULT_FETCH_MAX_MESSAGES: usize = 500;
/// The upper bound on the number of records returned by a single fetch.
pub const FETCH_MAX_MESSAGES_LIMIT: usize = 10_000;
/// The interval at which retention is enforced on open logs.
const RETENTION_CHECK_INTERVAL: Duration = Duration::from_secs(60);

pub(crate) const METRIC_PRODUCED_RECORDS: &str = "kestrel_broker_produced_records";
pub(crate) const METRIC_FETCHED_RECORDS: &str = "kestrel_broker_fetched_records";
pub(crate) const METRIC_REGISTRATION_FAILURES: &str = "kestrel_broker_registration_failures";

/// Register the metrics of the serving layer.
pub fn register_metrics() {
    metrics::register_counter!(METRIC_PRODUCED_RECORDS, metrics::Unit::Count, "the number of records appended by produce requests");
    metrics::register_counter!(METRIC_FETCHED_RECORDS, metrics::Unit::Count, "the number of records returned by fetch requests");
    metrics::register_counter!(METRIC_REGISTRATION_FAILURES, metrics::Unit::Count, "the number of failed broker registration renewals");
}

/// The partitioned log broker.
pub struct BrokerServer {
    config: Arc<Config>,
    shared: Arc<Shared>,
    lifecycle: Mutex<Lifecycle>,
}

/// The lifecycle phase of a broker server.
enum Lifecycle {
    Idle,
    Running(Running),
    Draining,
    Closed,
}

/// The resources of a running broker server.
struct Running {
    local_addr: SocketAddr,
    /// A channel used for stopping the listener and background tasks.
    shutdown_tx: broadcast::Sender<()>,
    server: JoinHandle<Result<()>>,
    renewal: JoinHandle<()>,
    retention: Option<JoinHandle<()>>,
}

/// State shared between the server and its request handlers.
pub(crate) struct Shared {
    config: Arc<Config>,
    coordinator: ReplicationCoordinator,
    logs: LogRegistry,
    /// Permits for in-flight requests; all permits are taken while draining.
    in_flight: Arc<Semaphore>,
    /// Cleared once the server begins draining.
    accepting: AtomicBool,
}

impl BrokerServer {
    /// Create a new instance.
    pub fn new(config: Arc<Config>, store: DynMetadataStore) -> Self {
        let coordinator = ReplicationCoordinator::new(config.node_id.clone(), store, config.leader_cache_ttl());
        let shared = Arc::new(Shared {
            logs: LogRegistry::new(PathBuf::from(&config.storage_data_path), config.segment_bytes),
            in_flight: Arc::new(Semaphore::new(config.max_in_flight_requests as usize)),
            accepting: AtomicBool::new(true),
            coordinator,
            config: config.clone(),
        });
        Self {
            config,
            shared,
            lifecycle: Mutex::new(Lifecycle::Idle),
        }
    }

    /// The address this server is listening on, if running.
    #[cfg(test)]
    pub async fn local_addr(&self) -> Option<SocketAddr> {
        match &*self.lifecycle.lock().await {
            Lifecycle::Running(running) => Some(running.local_addr),
            _ => None,
        }
    }

    /// The partition logs currently open on this broker.
    #[cfg(test)]
    pub fn logs(&self) -> &LogRegistry {
        &self.shared.logs
    }

    /// Start serving, returning the bound address.
    ///
    /// Starting a running server returns its address; starting a server which has been shut
    /// down fails.
    #[tracing::instrument(level = "debug", skip(self), fields(node_id = %self.config.node_id))]
    pub async fn start(&self) -> Result<SocketAddr> {
        let mut lifecycle = self.lifecycle.lock().await;
        match &*lifecycle {
            Lifecycle::Running(running) => return Ok(running.local_addr),
            Lifecycle::Draining | Lifecycle::Closed => return Err(AppError::Unavailable(ERR_SHUTTING_DOWN.into()).into()),
            Lifecycle::Idle => (),
        }

        let listener = TcpListener::bind(&self.config.rpc_addr)
            .await
            .with_context(|| format!("error binding broker listener to {}", self.config.rpc_addr))?;
        let local_addr = listener.local_addr().context("error reading broker listener address")?;
        let advertised_addr = self.config.advertised_addr.clone().unwrap_or_else(|| local_addr.to_string());

        let store = self.shared.coordinator.store();
        store
            .register_broker(&self.config.node_id, &advertised_addr, self.config.registration_ttl_seconds)
            .await
            .context("error registering broker")?;
        if let Err(err) = self.shared.open_led_partitions().await {
            self.shared.logs.close_all().await;
            if let Err(dereg_err) = store.deregister_broker(&self.config.node_id).await {
                tracing::warn!(error = ?dereg_err, "error deregistering broker after failed start");
            }
            return Err(err.context("error opening logs of led partitions"));
        }

        let (shutdown_tx, _) = broadcast::channel(1);
        let renewal = tokio::spawn(self.shared.clone().renew_registration(advertised_addr.clone(), shutdown_tx.subscribe()));
        let retention = self
            .config
            .retention_policy()
            .max_age()
            .map(|max_age| tokio::spawn(self.shared.clone().enforce_retention(max_age, shutdown_tx.subscribe())));

        let service = BrokerServiceServer::new(BrokerHandler::new(self.shared.clone()));
        let mut server_shutdown = shutdown_tx.subscribe();
        let server_fut = Server::builder()
            .add_service(service)
            .serve_with_incoming_shutdown(TcpListenerStream::new(listener), async move {
                let _res = server_shutdown.recv().await;
            });
        let server = tokio::spawn(async move { server_fut.await.context("error from broker gRPC server") });

        tracing::info!(%local_addr, %advertised_addr, logs = self.shared.logs.len(), "broker is serving");
        *lifecycle = Lifecycle::Running(Running {
            local_addr,
            shutdown_tx,
            server,
            renewal,
            retention,
        });
        Ok(local_addr)
    }

    /// Gracefully shut down the server.
    ///
    /// New requests are rejected, in-flight requests are awaited up to the shutdown grace period,
    /// all logs are flushed and closed, and the broker is deregistered on a best-effort basis.
    /// Shutting down a server which is not running is a no-op.
    #[tracing::instrument(level = "debug", skip(self), fields(node_id = %self.config.node_id))]
    pub async fn shutdown(&self) -> Result<()> {
        let mut lifecycle = self.lifecycle.lock().await;
        let running = match std::mem::replace(&mut *lifecycle, Lifecycle::Draining) {
            Lifecycle::Running(running) => running,
            Lifecycle::Idle | Lifecycle::Closed | Lifecycle::Draining => {
                *lifecycle = Lifecycle::Closed;
                return Ok(());
            }
        };
        tracing::info!("broker is draining");

        self.shared.accepting.store(false, Ordering::Release);
        let _res = running.shutdown_tx.send(());
        let grace = self.config.shutdown_grace();
        let permits = self.config.max_in_flight_requests;
        match tokio::time::timeout(grace, self.shared.in_flight.acquire_many(permits)).await {
            Ok(Ok(_permits)) => tracing::debug!("all in-flight requests have completed"),
            Ok(Err(_closed)) => (),
            Err(_elapsed) => tracing::warn!(?grace, "shutdown grace period elapsed with requests still in flight"),
        }
        self.shared.in_flight.close();

        match tokio::time::timeout(grace, running.server).await {
            Ok(Ok(Ok(()))) => (),
            Ok(Ok(Err(err))) => tracing::error!(error = ?err, "error from broker gRPC server"),
            Ok(Err(err)) => tracing::error!(error = ?err, "error joining broker gRPC server task"),
            Err(_elapsed) => tracing::warn!("broker gRPC server did not stop within the grace period"),
        }
        if let Err(err) = running.renewal.await {
            tracing::error!(error = ?err, "error joining registration renewal task");
        }
        if let Some(retention) = running.retention {
            if let Err(err) = retention.await {
                tracing::error!(error = ?err, "error joining retention task");
            }
        }

        self.shared.logs.close_all().await;
        if let Err(err) = self.shared.coordinator.store().deregister_broker(&self.config.node_id).await {
            tracing::warn!(error = ?err, "error deregistering broker");
        }
        if let Err(err) = self.shared.coordinator.store().flush().await {
            tracing::error!(error = ?err, "error flushing metadata store");
        }

        *lifecycle = Lifecycle::Closed;
        tracing::info!("broker shutdown complete");
        Ok(())
    }
}

#[async_trait::async_trait]
impl Service for BrokerServer {
    async fn start(&self) -> Result<SocketAddr> {
        BrokerServer::start(self).await
    }

    async fn shutdown(&self) -> Result<()> {
        BrokerServer::shutdown(self).await
    }
}

impl Shared {
    /// Admit a new request, failing if the server is draining.
    async fn admit(&self) -> Result<OwnedSemaphorePermit> {
        if !self.accepting.load(Ordering::Acquire) {
            return Err(AppError::Unavailable(ERR_SHUTTING_DOWN.into()).into());
        }
        let permit = self
            .in_flight
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| AppError::Unavailable(ERR_SHUTTING_DOWN.into()))?;
        Ok(permit)
    }

    /// Open the logs of all partitions which this broker currently leads.
    async fn open_led_partitions(&self) -> Result<()> {
        let topics = self.coordinator.store().list_topics().await?;
        for topic in topics {
            for partition in 0..topic.partition_count {
                match self.coordinator.is_leader(&topic.name, partition).await {
                    Ok(true) => {
                        self.logs.get_or_open(&topic.name, partition).await?;
                    }
                    Ok(false) => (),
                    Err(err) => tracing::warn!(error = ?err, topic = %topic.name, partition, "error resolving partition leadership"),
                }
            }
        }
        Ok(())
    }

    /// Renew this broker's registration until shutdown.
    async fn renew_registration(self: Arc<Self>, address: String, mut shutdown: broadcast::Receiver<()>) {
        let mut interval = tokio::time::interval(self.config.registration_renew_interval());
        interval.tick().await;
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let store = self.coordinator.store();
                    if let Err(err) = store.register_broker(&self.config.node_id, &address, self.config.registration_ttl_seconds).await {
                        metrics::increment_counter!(METRIC_REGISTRATION_FAILURES);
                        tracing::warn!(error = ?err, "error renewing broker registration");
                    }
                }
                _ = shutdown.recv() => break,
            }
        }
        tracing::debug!("registration renewal stopped");
    }

    /// Periodically delete expired sealed segments of all open logs until shutdown.
    async fn enforce_retention(self: Arc<Self>, max_age: Duration, mut shutdown: broadcast::Receiver<()>) {
        let mut interval = tokio::time::interval(RETENTION_CHECK_INTERVAL);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    for log in self.logs.all() {
                        match log.enforce_retention(max_age).await {
                            Ok(0) => (),
                            Ok(deleted) => {
                                let (topic, partition, earliest_offset) = (log.topic(), log.partition(), log.earliest_offset());
                                tracing::info!(topic, partition, deleted, earliest_offset, "retention deleted expired segments")
                            }
                            Err(err) => {
                                tracing::error!(error = ?err, topic = log.topic(), partition = log.partition(), "error enforcing retention")
                            }
                        }
                    }
                }
                _ = shutdown.recv() => break,
            }
        }
    }
}

/// The set of partition logs open on this broker.
pub struct LogRegistry {
    data_root: PathBuf,
    segment_bytes: u64,
    logs: ArcSwap<HashMap<(String, u32), SegmentedLog>>,
    /// Serializes log opening so that a partition is never opened twice.
    open_lock: Mutex<()>,
}

impl LogRegistry {
    fn new(data_root: PathBuf, segment_bytes: u64) -> Self {
        Self {
            data_root,
            segment_bytes,
            logs: ArcSwap::from_pointee(HashMap::new()),
            open_lock: Mutex::new(()),
        }
    }

    /// Get the open log of a partition.
    pub fn get(&self, topic: &str, partition: u32) -> Option<SegmentedLog> {
        self.logs.load().get(&(topic.to_string(), partition)).cloned()
    }

    /// Get the log of a partition, opening it if needed.
    pub async fn get_or_open(&self, topic: &str, partition: u32) -> Result<SegmentedLog> {
        if let Some(log) = self.get(topic, partition) {
            return Ok(log);
        }
        let _guard = self.open_lock.lock().await;
        if let Some(log) = self.get(topic, partition) {
            return Ok(log);
        }
        let log = SegmentedLog::open(&self.data_root, topic, partition, self.segment_bytes).await?;
        let mut logs = self.logs.load().as_ref().clone();
        logs.insert((topic.to_string(), partition), log.clone());
        self.logs.store(Arc::new(logs));
        Ok(log)
    }

    /// All open logs.
    pub fn all(&self) -> Vec<SegmentedLog> {
        self.logs.load().values().cloned().collect()
    }

    /// The number of open logs.
    pub fn len(&self) -> usize {
        self.logs.load().len()
    }

    /// Flush and close all open logs.
    async fn close_all(&self) {
        let _guard = self.open_lock.lock().await;
        for log in self.logs.load().values() {
            if let Err(err) = log.close().await {
                tracing::error!(error = ?err, topic = log.topic(), partition = log.partition(), "error closing partition log");
            }
        }
    }
}
