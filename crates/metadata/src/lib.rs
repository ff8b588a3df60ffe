//! SQLite store for pooled storage accounts and file metadata.
//!
//! This crate provides the two collaborators the pool consumes:
//! - a **credential store** holding every connected account with its tokens
//!   (read on every operation, written only when a token is refreshed), and
//! - a **file store** holding each uploaded file together with its layout:
//!   either one object on one account, or an ordered list of byte-range
//!   chunks spread across accounts.
//!
//! Both are exposed as traits ([`CredentialStore`], [`FileStore`]) and
//! implemented by [`Repository`].

mod db;
pub mod error;
mod models;
mod repo;
mod store;

pub use crate::db::Database;
pub use crate::models::{
    Account, AccountId, Chunk, FileFilter, FileId, FileRecord, Layout, NewAccount, NewFile, ProviderKind, UserId,
};
pub use crate::repo::Repository;
pub use crate::store::{CredentialStore, FileStore};
