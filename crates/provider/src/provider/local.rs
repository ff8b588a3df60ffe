//! Local directory provider.
//!
//! Treats a directory as a storage account with a fixed advertised capacity.
//! Useful for pooling several disks (or mount points of other services) and
//! for exercising the pool without network access.

use crate::error::{ErrorKind, Result};
use crate::models::{Quota, RemoteObject};
use crate::name::validate as validate_object_name;
use crate::provider::{ByteStream, RemoteProvider};
use async_trait::async_trait;
use bytes::Bytes;
use futures::TryStreamExt;
use std::fs::create_dir_all as sync_create_dir;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, LazyLock};
use time::OffsetDateTime;
use tokio::fs;
use tokio::sync::Mutex;
use tokio_util::io::ReaderStream;

/// Objects being written land under this prefix first and are renamed into
/// place once complete.
const PARTIAL_PREFIX: &str = ".partial-";

/// One write lock per root directory, shared by every provider in the
/// process that points at it.
static WRITE_LOCKS: LazyLock<std::sync::Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>> = LazyLock::new(Default::default);

fn write_lock(root: &Path) -> Arc<Mutex<()>> {
    let mut locks = WRITE_LOCKS.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    locks.entry(root.to_path_buf()).or_default().clone()
}

/// Local directory provider.
///
/// Every object is a file directly inside the root directory. Usage is the
/// sum of the file sizes in that directory, measured on every
/// [`quota()`](RemoteProvider::quota) call.
///
/// # Examples
///
/// ```no_run
/// use colossus_provider::provider::LocalProvider;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// // A 10 GiB "account" on an external disk.
/// let provider = LocalProvider::new("external", "/mnt/external/colossus", 10 << 30)?;
/// # Ok(())
/// # }
/// ```
pub struct LocalProvider {
    name: String,
    root: PathBuf,
    capacity: u64,
    /// Held from the capacity check until the object is in place.
    write_lock: Arc<Mutex<()>>,
    counter: AtomicU64,
}
impl LocalProvider {
    /// Create a new local provider.
    ///
    /// # Errors
    ///
    /// Returns an error if `root` is not absolute, or exists but is not a
    /// directory.
    pub fn new(name: impl Into<String>, root: impl AsRef<Path>, capacity: u64) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        if !root.is_absolute() {
            exn::bail!(ErrorKind::Provider(format!("root `{}` is not absolute", root.display())));
        }
        if root.exists() {
            if !root.is_dir() {
                exn::bail!(ErrorKind::Provider(format!("root `{}` is not a directory", root.display())));
            }
        } else {
            // Only happens when an account is first connected; not worth
            // making the constructor async for.
            sync_create_dir(&root).map_err(ErrorKind::Io)?;
        }
        // Two spellings of the same directory must share a lock.
        let root = std::fs::canonicalize(&root).map_err(ErrorKind::Io)?;
        Ok(Self {
            name: name.into(),
            write_lock: write_lock(&root),
            root,
            capacity,
            counter: AtomicU64::new(0),
        })
    }

    /// Derive a fresh remote id for an object called `name`.
    ///
    /// The name is kept as a suffix so the directory stays browsable.
    fn generate_id(&self, name: &str) -> String {
        let mut hasher = blake3::Hasher::new();
        hasher.update(name.as_bytes());
        hasher.update(&OffsetDateTime::now_utc().unix_timestamp_nanos().to_le_bytes());
        hasher.update(&self.counter.fetch_add(1, Ordering::Relaxed).to_le_bytes());
        hasher.update(self.root.as_os_str().as_encoded_bytes());
        let hash = hasher.finalize().to_hex();
        format!("{}-{name}", &hash[..16])
    }

    fn object_path(&self, remote_id: &str) -> Result<PathBuf> {
        let remote_id = validate_object_name(remote_id)?;
        if remote_id.starts_with(PARTIAL_PREFIX) {
            exn::bail!(ErrorKind::NotFound(remote_id.to_string()));
        }
        Ok(self.root.join(remote_id))
    }

    fn map_io_error(e: std::io::Error, remote_id: &str) -> ErrorKind {
        match e.kind() {
            std::io::ErrorKind::NotFound => ErrorKind::NotFound(remote_id.to_string()),
            _ => ErrorKind::Io(e),
        }
    }

    async fn used(&self) -> Result<u64> {
        let mut used = 0;
        let mut entries = fs::read_dir(&self.root).await.map_err(ErrorKind::Io)?;
        while let Some(entry) = entries.next_entry().await.map_err(ErrorKind::Io)? {
            let metadata = entry.metadata().await.map_err(ErrorKind::Io)?;
            if metadata.is_file() {
                used += metadata.len();
            }
        }
        Ok(used)
    }
}

#[async_trait]
impl RemoteProvider for LocalProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn quota(&self) -> Result<Quota> {
        Ok(Quota::new(self.capacity, self.used().await?))
    }

    async fn create(&self, name: &str, _mime_type: &str, data: Bytes) -> Result<RemoteObject> {
        let name = validate_object_name(name)?;
        let requested = data.len() as u64;
        let _guard = self.write_lock.lock().await;
        let free = self.capacity.saturating_sub(self.used().await?);
        if requested > free {
            exn::bail!(ErrorKind::StorageFull { requested, free });
        }
        let id = self.generate_id(name);
        let partial = self.root.join(format!("{PARTIAL_PREFIX}{id}"));
        fs::write(&partial, &data).await.map_err(ErrorKind::Io)?;
        if let Err(e) = fs::rename(&partial, self.root.join(&id)).await {
            _ = fs::remove_file(&partial).await;
            exn::bail!(ErrorKind::Io(e));
        }
        tracing::debug!(provider = %self.name, remote_id = %id, bytes = requested, "Stored object");
        Ok(RemoteObject::new(id, requested))
    }

    async fn reader(&self, remote_id: &str) -> Result<ByteStream> {
        let path = self.object_path(remote_id)?;
        let file = fs::File::open(&path).await.map_err(|e| Self::map_io_error(e, remote_id))?;
        Ok(Box::pin(ReaderStream::new(file).map_err(|e| exn::Exn::from(ErrorKind::Io(e)))))
    }

    async fn delete(&self, remote_id: &str) -> Result<()> {
        let path = self.object_path(remote_id)?;
        Ok(fs::remove_file(&path).await.map_err(|e| Self::map_io_error(e, remote_id))?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider(capacity: u64) -> (tempfile::TempDir, LocalProvider) {
        let temp_dir = tempfile::tempdir().unwrap();
        let provider = LocalProvider::new("local", temp_dir.path(), capacity).unwrap();
        (temp_dir, provider)
    }

    #[test]
    fn test_new_requires_absolute_path() {
        let temp_dir = tempfile::tempdir().unwrap();
        assert!(LocalProvider::new("local", temp_dir.path(), 10).is_ok());
        assert!(LocalProvider::new("local", "relative/path", 10).is_err());
    }

    #[test]
    fn test_new_creates_missing_root() {
        let temp_dir = tempfile::tempdir().unwrap();
        let root = temp_dir.path().join("nested/account");
        LocalProvider::new("local", &root, 10).unwrap();
        assert!(root.is_dir());
    }

    #[test]
    fn test_generated_ids_are_unique() {
        let (_dir, provider) = provider(10);
        let first = provider.generate_id("same.txt");
        let second = provider.generate_id("same.txt");
        assert_ne!(first, second);
        assert!(first.ends_with("-same.txt"));
    }

    #[tokio::test]
    async fn test_create_and_read() {
        let (_dir, provider) = provider(1024);
        let object = provider.create("hello.txt", "text/plain", Bytes::from_static(b"Hello, world!")).await.unwrap();
        assert_eq!(object.size, 13);
        assert_eq!(provider.read(&object.id).await.unwrap(), Bytes::from_static(b"Hello, world!"));
    }

    #[tokio::test]
    async fn test_quota_tracks_usage() {
        let (_dir, provider) = provider(100);
        assert_eq!(provider.quota().await.unwrap(), Quota::new(100, 0));
        provider.create("a.bin", "application/octet-stream", Bytes::from(vec![0u8; 40])).await.unwrap();
        let quota = provider.quota().await.unwrap();
        assert_eq!(quota.used, 40);
        assert_eq!(quota.free(), 60);
    }

    #[tokio::test]
    async fn test_create_beyond_capacity() {
        let (_dir, provider) = provider(10);
        provider.create("a.bin", "application/octet-stream", Bytes::from(vec![1u8; 6])).await.unwrap();
        let err = provider.create("b.bin", "application/octet-stream", Bytes::from(vec![1u8; 5])).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::StorageFull { requested: 5, free: 4 }));
        // Exactly filling the account is fine.
        provider.create("c.bin", "application/octet-stream", Bytes::from(vec![1u8; 4])).await.unwrap();
        assert_eq!(provider.quota().await.unwrap().free(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_creates_share_capacity() {
        let temp_dir = tempfile::tempdir().unwrap();
        let first = LocalProvider::new("local", temp_dir.path(), 100).unwrap();
        let second = LocalProvider::new("local", temp_dir.path().join("."), 100).unwrap();
        let (a, b) = tokio::join!(
            first.create("a.bin", "application/octet-stream", Bytes::from(vec![0u8; 80])),
            second.create("b.bin", "application/octet-stream", Bytes::from(vec![0u8; 80])),
        );
        assert_eq!(a.is_ok() as u8 + b.is_ok() as u8, 1);
        let err = a.err().or(b.err()).unwrap();
        assert!(matches!(&*err, ErrorKind::StorageFull { requested: 80, free: 20 }));
        assert_eq!(first.quota().await.unwrap().used, 80);
    }

    #[tokio::test]
    async fn test_delete() {
        let (_dir, provider) = provider(100);
        let object = provider.create("a.bin", "application/octet-stream", Bytes::from_static(b"data")).await.unwrap();
        provider.delete(&object.id).await.unwrap();
        let err = provider.delete(&object.id).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::NotFound(_)));
    }

    #[tokio::test]
    async fn test_read_missing_object() {
        let (_dir, provider) = provider(100);
        let err = provider.reader("does-not-exist").await.err().unwrap();
        assert!(matches!(&*err, ErrorKind::NotFound(_)));
    }

    #[tokio::test]
    async fn test_rejects_escaping_ids() {
        let (_dir, provider) = provider(100);
        assert!(provider.reader("../etc/passwd").await.is_err());
        assert!(provider.delete("../../file").await.is_err());
        assert!(provider.create("../escape", "text/plain", Bytes::from_static(b"x")).await.is_err());
    }

    #[tokio::test]
    async fn test_partial_objects_are_not_addressable() {
        let (_dir, provider) = provider(100);
        let err = provider.reader(".partial-anything").await.err().unwrap();
        assert!(matches!(&*err, ErrorKind::NotFound(_)));
    }
}
