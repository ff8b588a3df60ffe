//! Deleting, trashing and restoring files.
//!
//! Trashing only flags the file: its objects stay where they are and it can
//! be restored. Deleting (directly, or by purging the trash) removes the
//! remote objects and then the metadata.

use crate::Pool;
use crate::error::{ErrorKind, Result};
use colossus_metadata::{AccountId, FileFilter, FileId, FileRecord, UserId};
use colossus_provider::{ProviderHandle, RemoteProvider};
use exn::ResultExt;
use std::collections::HashMap;
use tracing::instrument;

/// Outcome of a hard delete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeleteReport {
    pub file: FileId,
    /// Remote objects the file was stored in.
    pub objects: usize,
    /// Objects that could not be removed and are now orphaned.
    pub failed: usize,
}

impl Pool {
    /// Delete a file, trashed or not, for good.
    ///
    /// Remote objects are removed first, best effort: an object that is
    /// already gone counts as removed, any other failure is logged and counted
    /// in the report but does not stop the metadata from being removed.
    ///
    /// Deleting the same file twice reports [`NotFound`](ErrorKind::NotFound)
    /// the second time.
    #[instrument(skip(self))]
    pub async fn delete(&self, owner: UserId, id: FileId) -> Result<DeleteReport> {
        let record = self.record(owner, id).await?;
        self.delete_record(owner, record).await
    }

    /// Move a file to the trash. Its objects are left untouched.
    #[instrument(skip(self))]
    pub async fn trash(&self, owner: UserId, id: FileId) -> Result<()> {
        self.set_deleted(owner, id, true).await
    }

    /// Take a file back out of the trash.
    #[instrument(skip(self))]
    pub async fn restore(&self, owner: UserId, id: FileId) -> Result<()> {
        self.set_deleted(owner, id, false).await
    }

    /// Delete every trashed file of `owner` for good.
    #[instrument(skip(self))]
    pub async fn purge_trash(&self, owner: UserId) -> Result<Vec<DeleteReport>> {
        let filter = FileFilter { deleted: true, ..Default::default() };
        let trashed = self.files.find(owner, &filter).await.or_raise(|| ErrorKind::Metadata)?;
        let mut reports = Vec::with_capacity(trashed.len());
        for record in trashed {
            reports.push(self.delete_record(owner, record).await?);
        }
        tracing::info!(files = reports.len(), "Purged trash");
        Ok(reports)
    }

    async fn set_deleted(&self, owner: UserId, id: FileId, deleted: bool) -> Result<()> {
        // Ownership check; `set_deleted` itself is not scoped to an owner.
        self.record(owner, id).await?;
        self.files.set_deleted(id, deleted).await.or_raise(|| ErrorKind::Metadata)?;
        tracing::info!(file = %id, deleted, "Updated trash flag");
        Ok(())
    }

    async fn delete_record(&self, owner: UserId, record: FileRecord) -> Result<DeleteReport> {
        let objects = record.layout.objects();
        let mut report = DeleteReport { file: record.id, objects: objects.len(), failed: 0 };
        let mut clients: HashMap<AccountId, Option<ProviderHandle>> = HashMap::new();
        for (account, remote_id) in objects {
            if !clients.contains_key(&account) {
                let client = self.cleanup_client(owner, account).await;
                clients.insert(account, client);
            }
            let Some(Some(client)) = clients.get(&account) else {
                report.failed += 1;
                continue;
            };
            match client.delete(remote_id).await {
                Ok(()) => {},
                Err(e) if e.is_not_found() => {
                    tracing::debug!(account = %account, remote_id, "Object was already gone");
                },
                Err(e) => {
                    tracing::warn!(account = %account, remote_id, error = %e, "Could not delete object; it is orphaned");
                    report.failed += 1;
                },
            }
        }
        self.files.delete(record.id).await.or_raise(|| ErrorKind::Metadata)?;
        tracing::info!(file = %record.id, objects = report.objects, failed = report.failed, "Deleted file");
        Ok(report)
    }

    /// A client for deleting objects on `account`, or `None` (logged) if the
    /// account can't be reached.
    async fn cleanup_client(&self, owner: UserId, account: AccountId) -> Option<ProviderHandle> {
        let stored = match self.credentials.account(account, owner).await {
            Ok(stored) => stored,
            Err(e) => {
                tracing::warn!(account = %account, error = %e, "Could not load account; its objects are orphaned");
                return None;
            },
        };
        match self.tokens.client(&stored).await {
            Ok(client) => Some(client),
            Err(e) => {
                tracing::warn!(
                    account = %account,
                    reconnect_required = e.reconnect_required().is_some(),
                    error = %e,
                    "Could not reach account; its objects are orphaned"
                );
                None
            },
        }
    }
}
