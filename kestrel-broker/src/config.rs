//! Runtime configuration.

use std::time::Duration;

use anyhow::{ensure, Context, Result};
use serde::Deserialize;

/// The default path to use for data storage.
pub const DEFAULT_DATA_PATH: &str = "/usr/local/kestrel/data";
/// The smallest segment capacity accepted.
const MIN_SEGMENT_BYTES: u64 = 1024;
/// The largest segment capacity accepted; index positions are stored as u32.
const MAX_SEGMENT_BYTES: u64 = u32::MAX as u64;

/// Runtime configuration data.
#[derive(Clone, Debug, Deserialize)]
pub struct Config {
    /// The server's logging config, which uses Rust's `env_logger` directives.
    pub rust_log: String,
    /// The unique identifier of this broker within the cluster.
    pub node_id: String,
    /// The address on which the gRPC server listens.
    #[serde(default = "Config::default_rpc_addr")]
    pub rpc_addr: String,
    /// The address registered in the metadata store for this broker.
    ///
    /// Defaults to `rpc_addr` when not set.
    #[serde(default)]
    pub advertised_addr: Option<String>,
    /// The port used for serving Prometheus metrics.
    #[serde(default = "Config::default_metrics_port")]
    pub metrics_port: u16,

    /// The root directory of all partition logs.
    #[serde(default = "Config::default_data_path")]
    pub storage_data_path: String,
    /// The byte capacity of each log segment.
    #[serde(default = "Config::default_segment_bytes")]
    pub segment_bytes: u64,

    /// The TTL of this broker's registration in the metadata store.
    #[serde(default = "Config::default_registration_ttl_seconds")]
    pub registration_ttl_seconds: i64,
    /// The maximum age of a cached partition state before it is re-fetched.
    #[serde(default = "Config::default_leader_cache_ttl_millis")]
    pub leader_cache_ttl_millis: u64,
    /// The deadline for in-flight requests to finish during shutdown.
    #[serde(default = "Config::default_shutdown_grace_seconds")]
    pub shutdown_grace_seconds: u64,
    /// The maximum number of requests served concurrently.
    #[serde(default = "Config::default_max_in_flight_requests")]
    pub max_in_flight_requests: u32,

    /// The metadata store backend to use.
    #[serde(default)]
    pub metadata_backend: MetadataBackend,
    /// The Kubernetes namespace used by the `kubernetes` metadata backend.
    #[serde(default = "Config::default_namespace")]
    pub namespace: String,

    /// The retention strategy of partition logs.
    #[serde(default)]
    pub retention_policy_strategy: RetentionStrategy,
    /// The maximum age in seconds of sealed segments under the `time` strategy.
    #[serde(default)]
    pub retention_policy_retention_seconds: Option<u64>,
}

/// The metadata store backend.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MetadataBackend {
    /// A durable single-node store embedded in the broker process.
    Embedded,
    /// A cluster-wide store backed by the Kubernetes API server.
    Kubernetes,
}

impl Default for MetadataBackend {
    fn default() -> Self {
        Self::Embedded
    }
}

/// The retention policy of partition logs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetentionPolicy {
    /// The retention strategy.
    pub strategy: RetentionStrategy,
    /// The maximum age in seconds of sealed segments under the `time` strategy.
    pub retention_seconds: Option<u64>,
}

impl RetentionPolicy {
    /// The default retention age, one week.
    pub const DEFAULT_RETENTION_SECONDS: u64 = 60 * 60 * 24 * 7;

    /// The maximum age of sealed segments, or `None` if data is retained indefinitely.
    pub fn max_age(&self) -> Option<Duration> {
        match self.strategy {
            RetentionStrategy::Retain => None,
            RetentionStrategy::Time => Some(Duration::from_secs(self.retention_seconds.unwrap_or(Self::DEFAULT_RETENTION_SECONDS))),
        }
    }
}

/// The retention strategy of partition logs.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RetentionStrategy {
    /// Retain all data.
    Retain,
    /// Delete sealed segments older than the configured age.
    Time,
}

impl Default for RetentionStrategy {
    fn default() -> Self {
        Self::Retain
    }
}

impl std::fmt::Display for RetentionStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Retain => write!(f, "retain"),
            Self::Time => write!(f, "time"),
        }
    }
}

impl Config {
    /// Create a new config instance.
    ///
    /// Currently this routine just parses the runtime environment and builds the application
    /// config from that.
    #[allow(clippy::new_without_default)]
    pub fn new() -> Result<Self> {
        let config: Config = envy::from_env().context("error building config from env")?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the values of this config.
    pub fn validate(&self) -> Result<()> {
        ensure!(!self.node_id.trim().is_empty(), "NODE_ID must not be empty");
        ensure!(
            (MIN_SEGMENT_BYTES..=MAX_SEGMENT_BYTES).contains(&self.segment_bytes),
            "SEGMENT_BYTES must be within {}..={}, got {}",
            MIN_SEGMENT_BYTES,
            MAX_SEGMENT_BYTES,
            self.segment_bytes
        );
        ensure!(self.registration_ttl_seconds >= 1, "REGISTRATION_TTL_SECONDS must be at least 1");
        ensure!(self.max_in_flight_requests >= 1, "MAX_IN_FLIGHT_REQUESTS must be at least 1");
        Ok(())
    }

    /// The retention policy of partition logs.
    pub fn retention_policy(&self) -> RetentionPolicy {
        RetentionPolicy {
            strategy: self.retention_policy_strategy,
            retention_seconds: self.retention_policy_retention_seconds,
        }
    }

    /// The address registered in the metadata store for this broker.
    pub fn advertised_addr(&self) -> &str {
        self.advertised_addr.as_deref().unwrap_or(&self.rpc_addr)
    }

    /// The bound on partition state cache staleness.
    pub fn leader_cache_ttl(&self) -> Duration {
        Duration::from_millis(self.leader_cache_ttl_millis)
    }

    /// The deadline for in-flight requests to finish during shutdown.
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_seconds)
    }

    /// The interval at which this broker's registration is renewed.
    pub fn registration_renew_interval(&self) -> Duration {
        Duration::from_millis((self.registration_ttl_seconds.max(1) as u64 * 1000) / 3)
    }

    fn default_rpc_addr() -> String {
        "0.0.0.0:7000".into()
    }

    fn default_metrics_port() -> u16 {
        7002
    }

    fn default_data_path() -> String {
        DEFAULT_DATA_PATH.into()
    }

    fn default_segment_bytes() -> u64 {
        64 * 1024 * 1024
    }

    fn default_registration_ttl_seconds() -> i64 {
        10
    }

    fn default_leader_cache_ttl_millis() -> u64 {
        2000
    }

    fn default_shutdown_grace_seconds() -> u64 {
        10
    }

    fn default_max_in_flight_requests() -> u32 {
        4096
    }

    fn default_namespace() -> String {
        "default".into()
    }
}

#[cfg(test)]
impl Config {
    /// Build a config for use in tests, rooted in a fresh temporary directory.
    pub fn new_test() -> Result<(std::sync::Arc<Self>, tempfile::TempDir)> {
        let tmpdir = tempfile::tempdir_in("/tmp").context("error creating tmp dir in /tmp")?;
        let config = Config {
            rust_log: "error".into(),
            node_id: "broker-0".into(),
            rpc_addr: "127.0.0.1:0".into(),
            advertised_addr: None,
            metrics_port: 7002,
            storage_data_path: tmpdir.path().to_string_lossy().to_string(),
            segment_bytes: Self::default_segment_bytes(),
            registration_ttl_seconds: 10,
            leader_cache_ttl_millis: 2000,
            shutdown_grace_seconds: 2,
            max_in_flight_requests: 64,
            metadata_backend: MetadataBackend::Embedded,
            namespace: "default".into(),
            retention_policy_strategy: RetentionStrategy::Retain,
            retention_policy_retention_seconds: None,
        };
        Ok((std::sync::Arc::new(config), tmpdir))
    }
}
