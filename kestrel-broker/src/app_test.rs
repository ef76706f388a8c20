use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};

use crate::app::{App, Service};
use crate::config::Config;

#[derive(Default)]
struct FakeService {
    fail_start: bool,
    starts: Arc<AtomicUsize>,
    shutdowns: Arc<AtomicUsize>,
}

#[async_trait::async_trait]
impl Service for FakeService {
    async fn start(&self) -> Result<SocketAddr> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        if self.fail_start {
            bail!("listener address already in use");
        }
        Ok(([127, 0, 0, 1], 7000).into())
    }

    async fn shutdown(&self) -> Result<()> {
        self.shutdowns.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[tokio::test]
async fn app_starts_service_and_shuts_it_down_on_signal() -> Result<()> {
    let (config, _tmpdir) = Config::new_test()?;
    let service = FakeService::default();
    let (starts, shutdowns) = (service.starts.clone(), service.shutdowns.clone());
    let app = App::new(config, service, None);
    let shutdown_tx = app.shutdown_handle();
    let handle = app.spawn();

    let _ = shutdown_tx.send(());
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .context("timeout waiting for app to shut down")?
        .context("error joining app task")??;

    let (starts, shutdowns) = (starts.load(Ordering::SeqCst), shutdowns.load(Ordering::SeqCst));
    assert_eq!(starts, 1, "expected service to be started once, got {}", starts);
    assert_eq!(shutdowns, 1, "expected service to be shut down once, got {}", shutdowns);
    Ok(())
}

#[tokio::test]
async fn app_returns_start_failure() -> Result<()> {
    let (config, _tmpdir) = Config::new_test()?;
    let service = FakeService {
        fail_start: true,
        ..Default::default()
    };
    let shutdowns = service.shutdowns.clone();
    let res = App::new(config, service, None).spawn().await.context("error joining app task")?;

    assert!(res.is_err(), "expected start failure to be returned, got {:?}", res);
    let shutdowns = shutdowns.load(Ordering::SeqCst);
    assert_eq!(shutdowns, 0, "expected no shutdown after a failed start, got {}", shutdowns);
    Ok(())
}
