//! The Kestrel partitioned log broker.

mod app;
#[cfg(test)]
mod app_test;
mod config;
#[cfg(test)]
mod config_test;
mod database;
mod error;
#[cfg(test)]
mod fixtures;
mod grpc;
mod log;
mod metadata;
mod replication;
#[cfg(test)]
mod replication_test;
mod server;
mod utils;

use std::io::Write;
use std::sync::{Arc, OnceLock};

use anyhow::{Context, Result};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusRecorder};
use tracing_subscriber::prelude::*;

use crate::app::App;
use crate::config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    // Setup tracing/logging system.
    tracing_subscriber::registry()
        // Filter spans based on the RUST_LOG env var.
        .with(tracing_subscriber::EnvFilter::from_default_env())
        // Send a copy of all spans to stdout in compact form.
        .with(tracing_subscriber::fmt::layer().compact().with_target(true).with_level(true).with_ansi(true))
        // Install this registry as the global tracing registry.
        .try_init()
        .context("error initializing logging/tracing system")?;

    let cfg = Arc::new(Config::new()?);
    let recorder = get_metrics_recorder(&cfg);
    metrics::set_recorder(recorder).context("error setting prometheus metrics recorder")?;
    log::register_metrics();
    replication::register_metrics();
    server::register_metrics();

    tracing::info!(
        node_id = %cfg.node_id,
        rpc_addr = %cfg.rpc_addr,
        advertised_addr = %cfg.advertised_addr(),
        metadata_backend = ?cfg.metadata_backend,
        storage_data_path = %cfg.storage_data_path,
        retention_policy = %cfg.retention_policy().strategy,
        "starting Kestrel broker",
    );
    let app = App::new_broker(cfg, Some(recorder.handle())).await?;
    match app.spawn().await {
        Ok(Err(err)) => tracing::error!(error = ?err, "broker exited with an error"),
        Err(err) => tracing::error!(error = ?err, "error joining broker task"),
        Ok(Ok(())) => (),
    }

    // Ensure any pending output is flushed.
    let _ = std::io::stdout().flush();
    let _ = std::io::stderr().flush();

    Ok(())
}

/// Get a handle to the metrics recorder, initializing it as needed.
pub fn get_metrics_recorder(config: &Config) -> &'static PrometheusRecorder {
    static RECORDER: OnceLock<PrometheusRecorder> = OnceLock::new();
    RECORDER.get_or_init(|| PrometheusBuilder::new().add_global_label("node_id", config.node_id.clone()).build())
}
