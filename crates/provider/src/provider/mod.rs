//! Remote provider trait and implementations.
//!
//! This module defines the [`RemoteProvider`] trait, a unified interface over
//! every kind of storage account that can be pooled (a local directory, a
//! Google Drive account, an in-memory mock for tests).

#[cfg(feature = "drive")]
pub mod drive;
mod local;
#[cfg(feature = "mock")]
mod mock;

#[cfg(feature = "drive")]
pub use self::drive::DriveProvider;
pub use self::local::LocalProvider;
#[cfg(feature = "mock")]
pub use self::mock::MockProvider;
use crate::error::Result;
use crate::models::{Quota, RemoteObject};
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::{Stream, TryStreamExt};
use std::pin::Pin;

/// Owned stream of object bytes.
///
/// `'static` so it can outlive the provider call that opened it and be handed
/// straight to whoever is consuming the download.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send + 'static>>;

/// Unified interface for remote storage accounts.
///
/// One value of this trait is one authenticated account. Objects are
/// addressed by the opaque id the provider returned from
/// [`create()`](Self::create); callers never construct ids themselves.
///
/// # Examples
///
/// ```
/// use bytes::Bytes;
/// use colossus_provider::{RemoteProvider, error::Result};
///
/// async fn store_if_room(provider: &dyn RemoteProvider, data: Bytes) -> Result<Option<String>> {
///     if provider.quota().await?.free() < data.len() as u64 {
///         return Ok(None);
///     }
///     let object = provider.create("notes.txt", "text/plain", data).await?;
///     Ok(Some(object.id))
/// }
/// ```
#[async_trait]
pub trait RemoteProvider: Send + Sync {
    /// Label of the account behind this provider (used for logging only).
    fn name(&self) -> &str;

    /// Fetch the current capacity and usage of the account.
    ///
    /// Never cached: every call asks the provider.
    async fn quota(&self) -> Result<Quota>;

    /// Store `data` as a new object.
    ///
    /// Returns [`StorageFull`](crate::error::ErrorKind::StorageFull) when the
    /// account cannot hold the object. `name` must pass
    /// [`validate_object_name`](crate::validate_object_name).
    async fn create(&self, name: &str, mime_type: &str, data: Bytes) -> Result<RemoteObject>;

    /// Open an object for streaming reads.
    ///
    /// The request is made (and [`NotFound`](crate::error::ErrorKind::NotFound)
    /// reported) before returning; failures after that point arrive as `Err`
    /// items in the stream.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use futures::TryStreamExt;
    /// # use colossus_provider::{RemoteProvider, error::Result};
    /// # async fn example(provider: &dyn RemoteProvider) -> Result<()> {
    /// let mut stream = provider.reader("object-id").await?;
    /// while let Some(bytes) = stream.try_next().await? {
    ///     println!("received {} bytes", bytes.len());
    /// }
    /// # Ok(())
    /// # }
    /// ```
    async fn reader(&self, remote_id: &str) -> Result<ByteStream>;

    /// Read a whole object into memory.
    ///
    /// Default implementation drains [`reader()`](Self::reader).
    async fn read(&self, remote_id: &str) -> Result<Bytes> {
        let buffer = self
            .reader(remote_id)
            .await?
            .try_fold(BytesMut::new(), |mut buffer, bytes| async move {
                buffer.extend_from_slice(&bytes);
                Ok(buffer)
            })
            .await?;
        Ok(buffer.freeze())
    }

    /// Delete an object.
    ///
    /// Returns [`NotFound`](crate::error::ErrorKind::NotFound) if the object
    /// does not exist.
    async fn delete(&self, remote_id: &str) -> Result<()>;
}
