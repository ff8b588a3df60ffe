//! Pool Error Types
//!
//! Structured errors using `exn` for automatic location tracking and error
//! tree construction. Provider and metadata errors are attached as children
//! of the pool error they caused.

use colossus_metadata::{AccountId, FileId};
use colossus_provider::error::Error as ProviderError;
use derive_more::{Display, Error};

/// A pool error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for pool operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Outcomes a caller of the pool has to tell apart.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// The accounts don't have enough free space between them. `available`
    /// is what could be placed: the free space at planning time, or the bytes
    /// actually uploaded when space ran out mid-upload.
    #[display("not enough storage: {needed} bytes needed, {available} bytes available")]
    NoCapacity { needed: u64, available: u64 },
    /// A remote operation on one account failed.
    #[display("account {_0} is unavailable")]
    AccountUnavailable(#[error(not(source))] AccountId),
    /// The account's refresh token was rejected; only reconnecting it helps.
    #[display("account {_0} must be reconnected")]
    AuthExpired(#[error(not(source))] AccountId),
    #[display("file not found: {_0}")]
    NotFound(#[error(not(source))] FileId),
    /// Some chunks were uploaded before the upload failed. They have been
    /// deleted again (best effort).
    #[display("upload failed after placing {placed} of {needed} bytes")]
    PartialUploadFailure { needed: u64, placed: u64 },
    #[display("no storage accounts connected")]
    NoAccounts,
    #[display("invalid input: {_0}")]
    InvalidInput(#[error(not(source))] String),
    #[display("metadata store error")]
    Metadata,
    /// Downloaded bytes don't match what was uploaded.
    #[display("file {_0} is corrupted")]
    Corrupted(#[error(not(source))] FileId),
}

impl ErrorKind {
    /// Attribute a provider failure to the account it happened on, keeping the
    /// provider's error tree as a child.
    #[track_caller]
    pub fn account(err: ProviderError, account: AccountId) -> Error {
        match err.is_unauthorized() {
            true => err.raise(ErrorKind::AuthExpired(account)),
            false => err.raise(ErrorKind::AccountUnavailable(account)),
        }
    }

    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::AccountUnavailable(_) | Self::PartialUploadFailure { .. } | Self::Metadata)
    }

    /// The account the user has to reconnect, if that is what it takes.
    pub fn reconnect_required(&self) -> Option<AccountId> {
        match self {
            Self::AuthExpired(account) => Some(*account),
            _ => None,
        }
    }
}
