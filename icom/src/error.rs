//! Error type shared by every layer of the crate.
//!
//! Callers are expected to retry on [`IcomError::Timeout`] and not on the
//! other variants; [`IcomError::is_retryable`] encodes that rule.

use std::io;

use thiserror::Error;

use crate::kind::TransportKind;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, IcomError>;

#[derive(Error, Debug)]
pub enum IcomError {
    /// Malformed specification, flag combination, endpoint or call sequence.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A type or flag token that the codec does not know.
    #[error("lookup failed: unknown token {0:?}")]
    Lookup(String),

    /// The transport kind exists but has no implementation.
    #[error("transport {0} is not implemented")]
    NotImplemented(TransportKind),

    /// Creating the link for `endpoint` failed (socket, bind, listen, mkfifo).
    #[error("failed to initialise link {endpoint:?}: {source}")]
    Link {
        endpoint: String,
        #[source]
        source: io::Error,
    },

    /// The peer refused the connection; the link stays pending.
    #[error("connection refused by {0}")]
    ConnectionRefused(String),

    /// A bounded wait elapsed before a header, payload or ack was transferred.
    #[error("timed out")]
    Timeout,

    /// Fewer bytes were moved than the header declared.
    #[error("partial transfer: {actual} of {expected} bytes")]
    PartialTransfer { expected: usize, actual: usize },

    /// Unrecoverable transport failure (includes peer close before a header).
    #[error("I/O error: {0}")]
    Io(#[source] io::Error),

    /// A buffer or endpoint list could not be allocated.
    #[error("out of memory")]
    OutOfMemory,
}

impl IcomError {
    /// `true` for conditions worth retrying (currently only timeouts).
    pub fn is_retryable(&self) -> bool {
        matches!(self, IcomError::Timeout)
    }

    pub(crate) fn link(endpoint: &str, source: io::Error) -> Self {
        IcomError::Link {
            endpoint: endpoint.to_string(),
            source,
        }
    }
}

impl From<io::Error> for IcomError {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => IcomError::Timeout,
            io::ErrorKind::ConnectionRefused => IcomError::ConnectionRefused(err.to_string()),
            _ => IcomError::Io(err),
        }
    }
}

impl From<std::collections::TryReserveError> for IcomError {
    fn from(_: std::collections::TryReserveError) -> Self {
        IcomError::OutOfMemory
    }
}
