use std::time::Duration;

use anyhow::{Context, Result};
use tonic::metadata::{MetadataMap, MetadataValue};

use super::deadline::*;
use crate::error::AppError;

#[test]
fn parse_grpc_timeout_accepts_all_units() -> Result<()> {
    let cases = [
        ("1H", Duration::from_secs(3600)),
        ("2M", Duration::from_secs(120)),
        ("30S", Duration::from_secs(30)),
        ("250m", Duration::from_millis(250)),
        ("10u", Duration::from_micros(10)),
        ("99999999n", Duration::from_nanos(99_999_999)),
    ];
    for (val, expected) in cases {
        let timeout = parse_grpc_timeout(val)?;
        assert_eq!(timeout, expected, "expected {:?} for {:?}, got {:?}", expected, val, timeout);
    }
    Ok(())
}

#[test]
fn parse_grpc_timeout_rejects_malformed_values() {
    for val in ["", "S", "10", "10s", "-5S", "123456789S", "1.5S", "１S"] {
        let res = parse_grpc_timeout(val);
        assert!(res.is_err(), "expected {:?} to be rejected, got {:?}", val, res);
    }
}

#[test]
fn deadline_from_metadata() -> Result<()> {
    let deadline = Deadline::from_metadata(&MetadataMap::new())?;
    deadline.check("anything")?;

    let mut metadata = MetadataMap::new();
    metadata.insert(GRPC_TIMEOUT_HEADER, MetadataValue::from_static("5S"));
    let deadline = Deadline::from_metadata(&metadata)?;
    deadline.check("anything")?;

    let mut metadata = MetadataMap::new();
    metadata.insert(GRPC_TIMEOUT_HEADER, MetadataValue::from_static("bogus"));
    let res = Deadline::from_metadata(&metadata);
    assert!(res.is_err(), "expected invalid header to be rejected, got {:?}", res);
    Ok(())
}

#[tokio::test]
async fn elapsed_deadline_cancels() -> Result<()> {
    let deadline = Deadline::after(Duration::ZERO);
    let err = deadline.check("appending").err().context("expected elapsed deadline to fail the check")?;
    let app_err = err.downcast::<AppError>().context("unexpected error type")?;
    assert!(matches!(app_err, AppError::Cancelled(_)), "expected Cancelled, got {:?}", app_err);

    let deadline = Deadline::after(Duration::from_millis(20));
    let res = deadline
        .run("waiting", async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;
    let err = res.err().context("expected slow future to be cancelled")?;
    let app_err = err.downcast::<AppError>().context("unexpected error type")?;
    assert!(matches!(app_err, AppError::Cancelled(_)), "expected Cancelled, got {:?}", app_err);

    let val = Deadline::after(Duration::from_secs(5)).run("waiting", async { Ok(7) }).await?;
    assert_eq!(val, 7, "expected 7, got {}", val);
    Ok(())
}
