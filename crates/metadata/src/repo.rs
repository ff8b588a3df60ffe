//! SQLite implementation of the credential and file stores.

use crate::Database;
use crate::error::{ErrorKind, Result};
use crate::models::{
    Account, AccountId, AccountRow, ChunkRow, FileFilter, FileId, FileRecord, FileRow, Layout, NewAccount, NewFile,
    UserId, to_db_int,
};
use crate::store::{CredentialStore, FileStore};
use async_trait::async_trait;
use exn::{OptionExt, ResultExt};
use sqlx::SqlitePool;
use time::UtcDateTime;

fn is_unique_violation(e: &sqlx::Error) -> bool {
    e.as_database_error().is_some_and(|e| e.is_unique_violation())
}

/// Repository over the metadata database.
///
/// Accounts and files are scoped by owner: lookups by id for another user's
/// account or file behave exactly as if it did not exist.
#[derive(Debug, Clone)]
pub struct Repository {
    pool: SqlitePool,
}

impl From<&Database> for Repository {
    fn from(db: &Database) -> Self {
        Self { pool: db.pool().clone() }
    }
}

impl Repository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    // =========================================================================
    // Accounts
    // =========================================================================

    /// Connect a new storage account.
    ///
    /// Returns [`AccountExists`](ErrorKind::AccountExists) if the owner already
    /// connected an account of the same kind with the same label.
    pub async fn connect_account(&self, account: NewAccount) -> Result<Account> {
        let inserted: sqlx::Result<AccountRow> = sqlx::query_as(include_str!("../queries/insert_account.sql"))
            .bind(account.owner.0)
            .bind(account.provider.to_string())
            .bind(&account.label)
            .bind(&account.access_token)
            .bind(&account.refresh_token)
            .bind(account.token_expiry.map(UtcDateTime::unix_timestamp))
            .bind(&account.root_ref)
            .bind(account.capacity_column()?)
            .bind(UtcDateTime::now().unix_timestamp())
            .fetch_one(&self.pool)
            .await;
        let row = match inserted {
            Err(e) if is_unique_violation(&e) => exn::bail!(ErrorKind::AccountExists(account.label)),
            result => result.or_raise(|| ErrorKind::Database)?,
        };
        let account = Account::try_from(row)?;
        tracing::info!(account = %account.id, provider = %account.provider, label = %account.label, "Connected account");
        Ok(account)
    }

    /// Disconnect an account.
    ///
    /// Refuses with [`AccountInUse`](ErrorKind::AccountInUse) while any file
    /// (trashed ones included) still has data on it.
    pub async fn disconnect_account(&self, id: AccountId, owner: UserId) -> Result<()> {
        let mut tx = self.pool.begin().await.or_raise(|| ErrorKind::Database)?;
        let (files,): (i64,) = sqlx::query_as(include_str!("../queries/count_account_files.sql"))
            .bind(id.0)
            .fetch_one(&mut *tx)
            .await
            .or_raise(|| ErrorKind::Database)?;
        if files > 0 {
            exn::bail!(ErrorKind::AccountInUse { account: id, files: files.unsigned_abs() });
        }
        let result = sqlx::query(include_str!("../queries/delete_account.sql"))
            .bind(id.0)
            .bind(owner.0)
            .execute(&mut *tx)
            .await
            .or_raise(|| ErrorKind::Database)?;
        if result.rows_affected() == 0 {
            exn::bail!(ErrorKind::AccountNotFound(id));
        }
        tx.commit().await.or_raise(|| ErrorKind::Database)?;
        tracing::info!(account = %id, "Disconnected account");
        Ok(())
    }

    // =========================================================================
    // Files
    // =========================================================================

    async fn chunks(&self, file_id: i64) -> Result<Vec<ChunkRow>> {
        sqlx::query_as(include_str!("../queries/get_chunks.sql"))
            .bind(file_id)
            .fetch_all(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)
    }

    async fn hydrate(&self, row: FileRow) -> Result<FileRecord> {
        let chunks = match row.chunked {
            true => self.chunks(row.id).await?,
            false => Vec::new(),
        };
        row.into_record(chunks)
    }
}

#[async_trait]
impl CredentialStore for Repository {
    async fn list_accounts(&self, owner: UserId) -> Result<Vec<Account>> {
        let rows: Vec<AccountRow> = sqlx::query_as(include_str!("../queries/list_accounts.sql"))
            .bind(owner.0)
            .fetch_all(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        rows.into_iter().map(Account::try_from).collect()
    }

    async fn account(&self, id: AccountId, owner: UserId) -> Result<Account> {
        let row: Option<AccountRow> = sqlx::query_as(include_str!("../queries/get_account.sql"))
            .bind(id.0)
            .bind(owner.0)
            .fetch_optional(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Account::try_from(row.ok_or_raise(|| ErrorKind::AccountNotFound(id))?)
    }

    async fn update_token(&self, id: AccountId, access_token: &str, expiry: Option<UtcDateTime>) -> Result<()> {
        let result = sqlx::query(include_str!("../queries/update_token.sql"))
            .bind(id.0)
            .bind(access_token)
            .bind(expiry.map(UtcDateTime::unix_timestamp))
            .execute(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        if result.rows_affected() == 0 {
            exn::bail!(ErrorKind::AccountNotFound(id));
        }
        Ok(())
    }
}

#[async_trait]
impl FileStore for Repository {
    async fn create(&self, file: NewFile) -> Result<FileRecord> {
        file.layout.validate(file.size)?;
        let (account_id, remote_id) = match &file.layout {
            Layout::Single { account, remote_id } => (Some(account.0), Some(remote_id.as_str())),
            Layout::Chunked(_) => (None, None),
        };
        let mut tx = self.pool.begin().await.or_raise(|| ErrorKind::Database)?;
        let row: FileRow = sqlx::query_as(include_str!("../queries/insert_file.sql"))
            .bind(file.owner.0)
            .bind(&file.name)
            .bind(&file.mime_type)
            .bind(to_db_int(file.size, "file size")?)
            .bind(&file.path)
            .bind(file.layout.is_chunked())
            .bind(&file.content_hash)
            .bind(account_id)
            .bind(remote_id)
            .bind(UtcDateTime::now().unix_timestamp())
            .fetch_one(&mut *tx)
            .await
            .or_raise(|| ErrorKind::Database)?;
        if let Layout::Chunked(chunks) = &file.layout {
            for chunk in chunks {
                let (index, account, remote_id, size, start, end) = chunk.columns()?;
                sqlx::query(include_str!("../queries/insert_chunk.sql"))
                    .bind(row.id)
                    .bind(index)
                    .bind(account)
                    .bind(remote_id)
                    .bind(size)
                    .bind(start)
                    .bind(end)
                    .execute(&mut *tx)
                    .await
                    .or_raise(|| ErrorKind::Database)?;
            }
        }
        // Read back inside the transaction so the returned record is exactly
        // what was committed.
        let chunks: Vec<ChunkRow> = sqlx::query_as(include_str!("../queries/get_chunks.sql"))
            .bind(row.id)
            .fetch_all(&mut *tx)
            .await
            .or_raise(|| ErrorKind::Database)?;
        tx.commit().await.or_raise(|| ErrorKind::Database)?;
        row.into_record(chunks)
    }

    async fn find(&self, owner: UserId, filter: &FileFilter) -> Result<Vec<FileRecord>> {
        let rows: Vec<FileRow> = sqlx::query_as(include_str!("../queries/find_files.sql"))
            .bind(owner.0)
            .bind(filter.like_term())
            .bind(filter.path.as_deref())
            .bind(filter.deleted)
            .fetch_all(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            records.push(self.hydrate(row).await?);
        }
        Ok(records)
    }

    async fn find_one(&self, id: FileId, owner: UserId) -> Result<FileRecord> {
        let row: Option<FileRow> = sqlx::query_as(include_str!("../queries/get_file.sql"))
            .bind(id.0)
            .bind(owner.0)
            .fetch_optional(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        self.hydrate(row.ok_or_raise(|| ErrorKind::FileNotFound(id))?).await
    }

    async fn delete(&self, id: FileId) -> Result<()> {
        let result = sqlx::query(include_str!("../queries/delete_file.sql"))
            .bind(id.0)
            .execute(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        if result.rows_affected() == 0 {
            exn::bail!(ErrorKind::FileNotFound(id));
        }
        Ok(())
    }

    async fn set_deleted(&self, id: FileId, deleted: bool) -> Result<()> {
        let result = sqlx::query(include_str!("../queries/set_deleted.sql"))
            .bind(id.0)
            .bind(deleted)
            .execute(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        if result.rows_affected() == 0 {
            exn::bail!(ErrorKind::FileNotFound(id));
        }
        Ok(())
    }
}
