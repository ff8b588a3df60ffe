//! In-memory provider for testing.

use crate::error::{ErrorKind, Result};
use crate::models::{Quota, RemoteObject};
use crate::name::validate as validate_object_name;
use crate::provider::{ByteStream, RemoteProvider};
use async_stream::stream;
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::RwLock;

/// Reads are delivered in frames of this size so multi-frame streams get
/// exercised.
const FRAME_SIZE: usize = 64 * 1024;

/// In-memory provider for testing.
///
/// Objects live in a `HashMap` behind a [`RwLock`]. Capacity is enforced on
/// [`create()`](RemoteProvider::create) just like a real account, and each
/// kind of remote failure can be switched on independently:
///
/// - [`fail_quota()`](Self::fail_quota): quota requests error
/// - [`fail_creates()`](Self::fail_creates): uploads error
/// - [`fail_deletes()`](Self::fail_deletes): deletions error
/// - [`break_reads_after()`](Self::break_reads_after): read streams error
///   after a number of bytes
/// - [`with_reported_capacity()`](Self::with_reported_capacity): quota
///   claims more room than uploads are allowed to use
///
/// # Examples
///
/// ```
/// use bytes::Bytes;
/// use colossus_provider::RemoteProvider;
/// use colossus_provider::provider::MockProvider;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let provider = MockProvider::new("alice@example.com", 1024);
/// let object = provider.create("notes.txt", "text/plain", Bytes::from_static(b"hi")).await?;
/// assert_eq!(provider.quota().await?.free(), 1022);
/// assert!(provider.contains(&object.id).await);
/// # Ok(())
/// # }
/// ```
pub struct MockProvider {
    name: String,
    capacity: u64,
    reported_capacity: Option<u64>,
    preexisting_usage: u64,
    objects: RwLock<HashMap<String, Bytes>>,
    counter: AtomicU64,
    create_calls: AtomicU64,
    quota_fails: AtomicBool,
    creates_fail: AtomicBool,
    deletes_fail: AtomicBool,
    reads_break_after: RwLock<Option<usize>>,
}

impl MockProvider {
    /// Create an empty mock account with `capacity` bytes of room.
    pub fn new(name: impl Into<String>, capacity: u64) -> Self {
        Self {
            name: name.into(),
            capacity,
            reported_capacity: None,
            preexisting_usage: 0,
            objects: RwLock::new(HashMap::new()),
            counter: AtomicU64::new(0),
            create_calls: AtomicU64::new(0),
            quota_fails: AtomicBool::new(false),
            creates_fail: AtomicBool::new(false),
            deletes_fail: AtomicBool::new(false),
            reads_break_after: RwLock::new(None),
        }
    }

    /// Pretend `bytes` are already used by files this pool doesn't know about.
    pub fn with_usage(mut self, bytes: u64) -> Self {
        self.preexisting_usage = bytes;
        self
    }

    /// Report `capacity` from [`quota()`](RemoteProvider::quota) while still
    /// enforcing the real capacity on uploads. Simulates free space shrinking
    /// between a quota check and an upload.
    pub fn with_reported_capacity(mut self, capacity: u64) -> Self {
        self.reported_capacity = Some(capacity);
        self
    }

    pub fn fail_quota(&self, fail: bool) {
        self.quota_fails.store(fail, Ordering::SeqCst);
    }

    pub fn fail_creates(&self, fail: bool) {
        self.creates_fail.store(fail, Ordering::SeqCst);
    }

    pub fn fail_deletes(&self, fail: bool) {
        self.deletes_fail.store(fail, Ordering::SeqCst);
    }

    /// Make every read stream fail after delivering `bytes` bytes.
    pub async fn break_reads_after(&self, bytes: Option<usize>) {
        *self.reads_break_after.write().await = bytes;
    }

    pub async fn contains(&self, remote_id: &str) -> bool {
        self.objects.read().await.contains_key(remote_id)
    }

    pub async fn object_count(&self) -> usize {
        self.objects.read().await.len()
    }

    /// Number of [`create()`](RemoteProvider::create) calls, successful or not.
    pub fn create_calls(&self) -> u64 {
        self.create_calls.load(Ordering::SeqCst)
    }

    async fn used(&self) -> u64 {
        let stored: u64 = self.objects.read().await.values().map(|data| data.len() as u64).sum();
        self.preexisting_usage + stored
    }
}

#[async_trait]
impl RemoteProvider for MockProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn quota(&self) -> Result<Quota> {
        if self.quota_fails.load(Ordering::SeqCst) {
            exn::bail!(ErrorKind::Network("mock quota failure".to_string()));
        }
        Ok(Quota::new(self.reported_capacity.unwrap_or(self.capacity), self.used().await))
    }

    async fn create(&self, name: &str, _mime_type: &str, data: Bytes) -> Result<RemoteObject> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        let name = validate_object_name(name)?;
        if self.creates_fail.load(Ordering::SeqCst) {
            exn::bail!(ErrorKind::Network("mock upload failure".to_string()));
        }
        let mut objects = self.objects.write().await;
        let used = self.preexisting_usage + objects.values().map(|data| data.len() as u64).sum::<u64>();
        let requested = data.len() as u64;
        let free = self.capacity.saturating_sub(used);
        if requested > free {
            exn::bail!(ErrorKind::StorageFull { requested, free });
        }
        let id = format!("{}-{}", self.counter.fetch_add(1, Ordering::SeqCst), name);
        objects.insert(id.clone(), data);
        Ok(RemoteObject::new(id, requested))
    }

    async fn reader(&self, remote_id: &str) -> Result<ByteStream> {
        let data = self
            .objects
            .read()
            .await
            .get(remote_id)
            .cloned()
            .ok_or_else(|| exn::Exn::from(ErrorKind::NotFound(remote_id.to_string())))?;
        let break_after = *self.reads_break_after.read().await;
        Ok(Box::pin(stream! {
            let mut sent = 0;
            for frame in data.chunks(FRAME_SIZE) {
                if break_after.is_some_and(|limit| sent + frame.len() > limit) {
                    let limit = break_after.unwrap_or(sent);
                    yield Ok(data.slice(sent..limit));
                    yield Err(exn::Exn::from(ErrorKind::Network("mock connection reset".to_string())));
                    return;
                }
                sent += frame.len();
                yield Ok(Bytes::copy_from_slice(frame));
            }
        }))
    }

    async fn delete(&self, remote_id: &str) -> Result<()> {
        if self.deletes_fail.load(Ordering::SeqCst) {
            exn::bail!(ErrorKind::Network("mock delete failure".to_string()));
        }
        self.objects
            .write()
            .await
            .remove(remote_id)
            .map(|_| ())
            .ok_or_else(|| exn::Exn::from(ErrorKind::NotFound(remote_id.to_string())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[tokio::test]
    async fn test_create_and_read() {
        let provider = MockProvider::new("mock", 100);
        let object = provider.create("a.txt", "text/plain", Bytes::from_static(b"hello")).await.unwrap();
        assert_eq!(provider.read(&object.id).await.unwrap(), Bytes::from_static(b"hello"));
        assert_eq!(provider.create_calls(), 1);
    }

    #[tokio::test]
    async fn test_capacity_enforced() {
        let provider = MockProvider::new("mock", 10).with_usage(4);
        assert_eq!(provider.quota().await.unwrap().free(), 6);
        let err = provider.create("a", "x/y", Bytes::from(vec![0u8; 7])).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::StorageFull { requested: 7, free: 6 }));
    }

    #[tokio::test]
    async fn test_reported_capacity_overstates_room() {
        let provider = MockProvider::new("mock", 10).with_reported_capacity(1000);
        assert_eq!(provider.quota().await.unwrap().free(), 1000);
        assert!(provider.create("a", "x/y", Bytes::from(vec![0u8; 11])).await.is_err());
    }

    #[tokio::test]
    async fn test_fault_injection() {
        let provider = MockProvider::new("mock", 100);
        let object = provider.create("a", "x/y", Bytes::from_static(b"abc")).await.unwrap();
        provider.fail_quota(true);
        assert!(provider.quota().await.is_err());
        provider.fail_creates(true);
        assert!(provider.create("b", "x/y", Bytes::from_static(b"abc")).await.is_err());
        provider.fail_deletes(true);
        assert!(provider.delete(&object.id).await.is_err());
        assert!(provider.contains(&object.id).await);
    }

    #[tokio::test]
    async fn test_broken_reads() {
        let provider = MockProvider::new("mock", 1 << 20);
        let data = Bytes::from(vec![7u8; FRAME_SIZE * 2]);
        let object = provider.create("a", "x/y", data).await.unwrap();
        provider.break_reads_after(Some(FRAME_SIZE + 10)).await;
        let items: Vec<_> = provider.reader(&object.id).await.unwrap().collect().await;
        let delivered: usize = items.iter().filter_map(|item| item.as_ref().ok()).map(Bytes::len).sum();
        assert_eq!(delivered, FRAME_SIZE + 10);
        assert!(items.last().unwrap().is_err());
    }

    #[tokio::test]
    async fn test_delete_not_found() {
        let provider = MockProvider::new("mock", 100);
        let err = provider.delete("nope").await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::NotFound(_)));
    }
}
