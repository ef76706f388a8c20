//! Client error abstractions.

use std::fmt;

use tonic::{Code, Status};

/// A result type where the error is a `ClientError`.
pub type ClientResult<T> = ::std::result::Result<T, ClientError>;

/// An error returned from a Kestrel client operation.
#[derive(Debug, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct ClientError {
    kind: ErrorKind,
    message: String,
}

/// The kind of a client error, as reported by the broker.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// The target topic, partition or group is unknown.
    NotFound,
    /// The target resource already exists.
    AlreadyExists,
    /// The broker does not lead the target partition.
    NotLeader,
    /// The requested offset is not valid for the broker's log.
    OffsetOutOfRange,
    /// Not enough live brokers for the requested replication factor.
    InsufficientBrokers,
    /// A storage fault on the broker.
    IoFailure,
    /// The broker or its metadata store is unavailable.
    Unavailable,
    /// A call timed out.
    Timeout,
    /// The request was cancelled.
    Cancelled,
    /// The request was invalid.
    InvalidInput,
    /// The connection to the broker could not be established.
    Transport,
    /// Any other error.
    Internal,
}

impl ClientError {
    pub(crate) fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into() }
    }

    /// The kind of this error.
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// The error message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Whether the failed request may succeed if retried.
    ///
    /// A `NotLeader` error is retryable against the current leader of the partition.
    pub fn is_retryable(&self) -> bool {
        matches!(self.kind, ErrorKind::NotLeader | ErrorKind::Unavailable | ErrorKind::Timeout | ErrorKind::Transport)
    }
}

impl From<Status> for ClientError {
    fn from(status: Status) -> Self {
        let kind = match status.code() {
            Code::NotFound => ErrorKind::NotFound,
            Code::AlreadyExists => ErrorKind::AlreadyExists,
            Code::FailedPrecondition => ErrorKind::NotLeader,
            Code::OutOfRange => ErrorKind::OffsetOutOfRange,
            Code::ResourceExhausted => ErrorKind::InsufficientBrokers,
            Code::Unavailable => ErrorKind::Unavailable,
            Code::DeadlineExceeded => ErrorKind::Timeout,
            Code::Cancelled => ErrorKind::Cancelled,
            Code::InvalidArgument => ErrorKind::InvalidInput,
            Code::Internal if status.message().starts_with("storage failure") => ErrorKind::IoFailure,
            _ => ErrorKind::Internal,
        };
        Self::new(kind, status.message())
    }
}

impl From<tonic::transport::Error> for ClientError {
    fn from(err: tonic::transport::Error) -> Self {
        Self::new(ErrorKind::Transport, err.to_string())
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::NotFound => "not found",
            ErrorKind::AlreadyExists => "already exists",
            ErrorKind::NotLeader => "not leader",
            ErrorKind::OffsetOutOfRange => "offset out of range",
            ErrorKind::InsufficientBrokers => "insufficient brokers",
            ErrorKind::IoFailure => "storage failure",
            ErrorKind::Unavailable => "unavailable",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::InvalidInput => "invalid input",
            ErrorKind::Transport => "transport error",
            ErrorKind::Internal => "internal error",
        };
        f.write_str(name)
    }
}
