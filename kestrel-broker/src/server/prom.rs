use anyhow::Result;
use axum::http::{header::HeaderName, HeaderMap, HeaderValue, StatusCode};
use axum::{extract::Extension, routing::get, AddExtensionLayer, Router};
use futures::prelude::*;
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

/// Spawn the broker's Prometheus `/metrics` endpoint on the given port.
pub fn spawn_prom_server(handle: PrometheusHandle, port: u16, mut shutdown: broadcast::Receiver<()>) -> JoinHandle<Result<()>> {
    let app = Router::new().route("/metrics", get(prometheus_scrape)).layer(AddExtensionLayer::new(handle));
    let server = axum::Server::bind(&([0, 0, 0, 0], port).into())
        .serve(app.into_make_service())
        .with_graceful_shutdown(async move {
            let _res = shutdown.recv().await;
        });
    tracing::info!("metrics server is listening at 0.0.0.0:{}/metrics", port);
    tokio::spawn(server.map_err(anyhow::Error::from))
}

async fn prometheus_scrape(Extension(handle): Extension<PrometheusHandle>) -> (StatusCode, HeaderMap, String) {
    let mut headers = HeaderMap::new();
    headers.insert(HeaderName::from_static("content-type"), HeaderValue::from_static("text/plain; version=0.0.4"));
    (StatusCode::OK, headers, handle.render())
}
