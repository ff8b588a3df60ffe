//! The two collaborator interfaces the pool depends on.
//!
//! The pool only ever talks to these traits so it can be driven by any
//! backing store; [`Repository`](crate::Repository) is the SQLite one.

use crate::error::Result;
use crate::models::{Account, AccountId, FileFilter, FileId, FileRecord, NewFile, UserId};
use async_trait::async_trait;
use time::UtcDateTime;

/// Connected accounts and their credentials.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Every account `owner` has connected, oldest connection first.
    async fn list_accounts(&self, owner: UserId) -> Result<Vec<Account>>;

    /// One account, only if it belongs to `owner`.
    ///
    /// Returns [`AccountNotFound`](crate::error::ErrorKind::AccountNotFound)
    /// otherwise.
    async fn account(&self, id: AccountId, owner: UserId) -> Result<Account>;

    /// Store a refreshed access token.
    async fn update_token(&self, id: AccountId, access_token: &str, expiry: Option<UtcDateTime>) -> Result<()>;
}

/// Persisted file metadata and chunk layouts.
#[async_trait]
pub trait FileStore: Send + Sync {
    /// Persist a file with its complete layout, all or nothing.
    ///
    /// Returns [`InvalidLayout`](crate::error::ErrorKind::InvalidLayout) if
    /// the layout does not exactly cover the file.
    async fn create(&self, file: NewFile) -> Result<FileRecord>;

    /// Files owned by `owner` matching `filter`, newest first.
    async fn find(&self, owner: UserId, filter: &FileFilter) -> Result<Vec<FileRecord>>;

    /// One file, trashed or not, only if it belongs to `owner`.
    ///
    /// Returns [`FileNotFound`](crate::error::ErrorKind::FileNotFound)
    /// otherwise.
    async fn find_one(&self, id: FileId, owner: UserId) -> Result<FileRecord>;

    /// Remove a file and its chunk records.
    async fn delete(&self, id: FileId) -> Result<()>;

    /// Set or clear the soft-delete flag.
    async fn set_deleted(&self, id: FileId, deleted: bool) -> Result<()>;
}
