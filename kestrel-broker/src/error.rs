//! Kestrel error abstractions.

use thiserror::Error;
use tonic::Status;

// Error messages.
pub const ERR_ITER_FAILURE: &str = "error returned during key/value iteration from database";
pub const ERR_DB_FLUSH: &str = "error flushing database state";
pub const ERR_SHUTTING_DOWN: &str = "the broker is shutting down";

/// Application error variants.
///
/// Each variant is a distinct error kind which is surfaced to RPC callers as its own status code.
#[derive(Debug, Error)]
pub enum AppError {
    /// The target topic, partition or group is unknown.
    #[error("not found: {0}")]
    NotFound(String),
    /// The target resource already exists.
    #[error("already exists: {0}")]
    AlreadyExists(String),
    /// The request was sent to a broker which does not lead the target partition.
    #[error("broker {broker} is not the leader of {topic}/{partition}, current leader is {leader}")]
    NotLeader {
        topic: String,
        partition: u32,
        broker: String,
        leader: String,
    },
    /// The requested offset is not valid for the local log.
    #[error("offset {offset} is out of range, high watermark is {high_watermark}")]
    OffsetOutOfRange { offset: i64, high_watermark: i64 },
    /// Not enough live brokers to satisfy the requested replication factor.
    #[error("insufficient live brokers: replication factor {required} requested, {live} live")]
    InsufficientBrokers { required: u32, live: u32 },
    /// A local storage fault.
    #[error("storage failure: {0}")]
    IoFailure(String),
    /// The metadata store or a network dependency is unavailable.
    #[error("unavailable: {0}")]
    Unavailable(String),
    /// A call to the metadata store or a network dependency timed out.
    #[error("timeout: {0}")]
    Timeout(String),
    /// The caller's deadline elapsed or the caller cancelled the request.
    #[error("cancelled: {0}")]
    Cancelled(String),
    /// The given input was invalid.
    #[error("validation error: {0}")]
    InvalidInput(String),
    /// The server has hit an internal error, but will remain online.
    #[error("internal server error")]
    Ise(anyhow::Error),
}

/// An extension trait for the `AppError`.
pub trait AppErrorExt {
    /// Get the gRPC status for this error.
    fn into_status(self) -> Status;

    /// Translate the given error as an app error and map into a gRPC status object.
    fn grpc(err: anyhow::Error) -> Status;
}

impl AppErrorExt for AppError {
    fn into_status(self) -> Status {
        match self {
            AppError::NotFound(_) => Status::not_found(self.to_string()),
            AppError::AlreadyExists(_) => Status::already_exists(self.to_string()),
            AppError::NotLeader { .. } => Status::failed_precondition(self.to_string()),
            AppError::OffsetOutOfRange { .. } => Status::out_of_range(self.to_string()),
            AppError::InsufficientBrokers { .. } => Status::resource_exhausted(self.to_string()),
            AppError::IoFailure(_) => Status::internal(self.to_string()),
            AppError::Unavailable(_) => Status::unavailable(self.to_string()),
            AppError::Timeout(_) => Status::deadline_exceeded(self.to_string()),
            AppError::Cancelled(_) => Status::cancelled(self.to_string()),
            AppError::InvalidInput(_) => Status::invalid_argument(self.to_string()),
            AppError::Ise(_) => Status::internal(self.to_string()),
        }
    }

    fn grpc(err: anyhow::Error) -> Status {
        err.downcast::<tonic::Status>()
            .or_else(|err| err.downcast::<Self>().map(Self::into_status))
            .or_else(|err| err.downcast::<ShutdownError>().map(|err| Self::IoFailure(format!("{:#}", err.0)).into_status()))
            .unwrap_or_else(|err| Self::Ise(err).into_status())
    }
}

/// The error type used to indicate that a system shutdown is required.
#[derive(Debug, thiserror::Error)]
#[error("fatal error: {0}")]
pub struct ShutdownError(#[from] pub anyhow::Error);

/// A result type where the error is a `ShutdownError`.
pub type ShutdownResult<T> = ::std::result::Result<T, ShutdownError>;

/// A result type used with the gRPC system.
pub type RpcResult<T> = ::std::result::Result<T, tonic::Status>;
