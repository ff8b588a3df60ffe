//! Provider Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};
use std::io::Error as IoError;

/// A provider error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for provider operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// Remote object does not exist
    #[display("object not found: {_0}")]
    NotFound(#[error(not(source))] String),
    /// Credentials were rejected (expired or revoked access token)
    #[display("unauthorized")]
    Unauthorized,
    /// The account does not have room for the object
    #[display("storage full: {requested} bytes requested, {free} bytes free")]
    StorageFull { requested: u64, free: u64 },
    /// Underlying I/O error
    #[display("I/O error: {_0}")]
    Io(IoError),
    /// Network-related error (connection resets, timeouts, etc.)
    #[display("network error: {_0}")]
    Network(#[error(not(source))] String),
    /// Object name contains separators or is otherwise unusable
    #[display("invalid object name: {_0:?}")]
    InvalidName(#[error(not(source))] String),
    /// Provider-specific error
    #[display("provider error: {_0}")]
    Provider(#[error(not(source))] String),
    /// The account's provider kind is not compiled in or not configured
    #[display("unsupported provider: {_0}")]
    Unsupported(#[error(not(source))] String),
}
impl From<IoError> for ErrorKind {
    fn from(err: IoError) -> Self {
        Self::Io(err)
    }
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Io(_) | Self::Network(_) | Self::Provider(_))
    }

    /// Returns `true` if refreshing the access token might make the call succeed.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Unauthorized)
    }

    pub fn is_storage_full(&self) -> bool {
        matches!(self, Self::StorageFull { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}
