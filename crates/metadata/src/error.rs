//! Metadata Error Types
//!
//! Structured errors using `exn` for automatic location tracking and error
//! tree construction, matching the other crates in the workspace.

use crate::models::{AccountId, FileId};
use derive_more::{Display, Error};

/// A metadata store error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for metadata store operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    #[display("database error")]
    Database,
    #[display("database migration error")]
    Migration,
    #[display("file not found: {_0}")]
    FileNotFound(#[error(not(source))] FileId),
    #[display("account not found: {_0}")]
    AccountNotFound(#[error(not(source))] AccountId),
    /// The account is already connected for this user.
    #[display("account already connected: {_0}")]
    AccountExists(#[error(not(source))] String),
    /// Files still have data on the account; disconnecting it would orphan them.
    #[display("account {account} still holds {files} file(s)")]
    AccountInUse { account: AccountId, files: u64 },
    /// A stored or supplied value does not fit the schema.
    #[display("invalid metadata: {_0}")]
    InvalidData(#[error(not(source))] &'static str),
    /// A chunk layout that does not exactly cover the file.
    #[display("invalid chunk layout: {_0}")]
    InvalidLayout(#[error(not(source))] String),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Database)
    }
}
