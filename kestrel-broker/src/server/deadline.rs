//! Per-request deadlines taken from the `grpc-timeout` request header.

use std::future::Future;
use std::time::Duration;

use anyhow::Result;
use tokio::time::Instant;
use tonic::metadata::MetadataMap;

use crate::error::AppError;

/// The request header carrying the caller's timeout.
pub const GRPC_TIMEOUT_HEADER: &str = "grpc-timeout";

/// The maximum number of digits allowed in a `grpc-timeout` value.
const MAX_TIMEOUT_DIGITS: usize = 8;

/// The point in time after which the caller is no longer waiting for a response.
#[derive(Clone, Copy, Debug, Default)]
pub struct Deadline {
    expires_at: Option<Instant>,
}

impl Deadline {
    /// A deadline which never expires.
    pub fn none() -> Self {
        Self { expires_at: None }
    }

    /// A deadline expiring after the given duration.
    pub fn after(timeout: Duration) -> Self {
        Self {
            expires_at: Some(Instant::now() + timeout),
        }
    }

    /// Build the deadline of a request from its metadata.
    pub fn from_metadata(metadata: &MetadataMap) -> Result<Self> {
        let val = match metadata.get(GRPC_TIMEOUT_HEADER) {
            Some(val) => val,
            None => return Ok(Self::none()),
        };
        let val = val
            .to_str()
            .map_err(|_| AppError::InvalidInput(format!("{} header is not valid ASCII", GRPC_TIMEOUT_HEADER)))?;
        Ok(Self::after(parse_grpc_timeout(val)?))
    }

    /// Fail with `Cancelled` if this deadline has elapsed.
    pub fn check(&self, step: &str) -> Result<()> {
        match self.expires_at {
            Some(expires_at) if Instant::now() >= expires_at => Err(AppError::Cancelled(format!("deadline elapsed before {}", step)).into()),
            _ => Ok(()),
        }
    }

    /// Drive the given future to completion, failing with `Cancelled` if this deadline elapses first.
    pub async fn run<F, T>(&self, step: &str, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        self.check(step)?;
        match self.expires_at {
            None => fut.await,
            Some(expires_at) => match tokio::time::timeout_at(expires_at, fut).await {
                Ok(res) => res,
                Err(_) => Err(AppError::Cancelled(format!("deadline elapsed while {}", step)).into()),
            },
        }
    }
}

/// Parse a `grpc-timeout` value: up to 8 ASCII digits followed by one unit of
/// `H`, `M`, `S`, `m`, `u` or `n`.
pub fn parse_grpc_timeout(val: &str) -> Result<Duration> {
    let invalid = || AppError::InvalidInput(format!("invalid {} value {:?}", GRPC_TIMEOUT_HEADER, val));
    if val.len() < 2 || !val.is_ascii() {
        return Err(invalid().into());
    }
    let (digits, unit) = val.split_at(val.len() - 1);
    if digits.len() > MAX_TIMEOUT_DIGITS || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid().into());
    }
    let amount: u64 = digits.parse().map_err(|_| invalid())?;
    let timeout = match unit {
        "H" => Duration::from_secs(amount * 60 * 60),
        "M" => Duration::from_secs(amount * 60),
        "S" => Duration::from_secs(amount),
        "m" => Duration::from_millis(amount),
        "u" => Duration::from_micros(amount),
        "n" => Duration::from_nanos(amount),
        _ => return Err(invalid().into()),
    };
    Ok(timeout)
}
