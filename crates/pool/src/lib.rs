//! One storage volume out of many quota-limited accounts.
//!
//! [`Pool`] is the entry point. An upload asks every connected account for
//! its free space ([`quota`]), decides whether the file fits on one account or
//! has to be split into byte-range chunks ([`plan`]), uploads accordingly and
//! records the layout in the file store. A download reads the layout back and
//! streams the chunks in order. Provider clients always come from the
//! [`TokenManager`], which keeps access tokens fresh.

mod authorized;
pub mod connect;
mod delete;
mod download;
pub mod error;
mod path;
pub mod plan;
pub mod quota;
#[cfg(test)]
mod testing;
mod token;
mod upload;

pub use crate::connect::{DefaultConnector, DefaultRefresher, OAuthClient};
pub use crate::delete::DeleteReport;
pub use crate::download::{Download, DownloadStream};
pub use crate::path::normalize as normalize_path;
pub use crate::quota::{AccountQuota, PoolSummary, QuotaReport};
pub use crate::token::{Connector, RefreshedToken, TokenManager, TokenRefresher};
pub use crate::upload::UploadRequest;
use crate::error::{ErrorKind, Result};
use colossus_metadata::error::ErrorKind as MetadataErrorKind;
use colossus_metadata::{CredentialStore, FileFilter, FileId, FileRecord, FileStore, UserId};
use exn::ResultExt;
use std::sync::Arc;
use time::Duration;

/// Tunables for a [`Pool`].
#[derive(Debug, Clone, Copy)]
pub struct PoolOptions {
    /// Access tokens expiring within this margin are refreshed before use.
    pub refresh_margin: Duration,
    /// Uploads larger than this are rejected outright.
    pub max_file_size: u64,
}

impl Default for PoolOptions {
    fn default() -> Self {
        Self {
            refresh_margin: Duration::seconds(60),
            max_file_size: 5 * 1024 * 1024 * 1024,
        }
    }
}

/// The pooled storage volume of every user.
///
/// Cheap to clone; clones share the stores and the token manager. Operations
/// for different files (and different users) may run concurrently.
#[derive(Clone)]
pub struct Pool {
    credentials: Arc<dyn CredentialStore>,
    files: Arc<dyn FileStore>,
    tokens: TokenManager,
    options: PoolOptions,
}

impl Pool {
    pub fn new(
        credentials: Arc<dyn CredentialStore>,
        files: Arc<dyn FileStore>,
        refresher: Arc<dyn TokenRefresher>,
        connector: Arc<dyn Connector>,
        options: PoolOptions,
    ) -> Self {
        let tokens = TokenManager::new(credentials.clone(), refresher, connector, options.refresh_margin);
        Self { credentials, files, tokens, options }
    }

    pub fn tokens(&self) -> &TokenManager {
        &self.tokens
    }

    /// Files owned by `owner` matching `filter`, newest first.
    ///
    /// The path filter is normalised the same way upload paths are.
    pub async fn list(&self, owner: UserId, filter: &FileFilter) -> Result<Vec<FileRecord>> {
        let filter = match &filter.path {
            Some(path) => FileFilter { path: Some(normalize_path(path)?), ..filter.clone() },
            None => filter.clone(),
        };
        self.files.find(owner, &filter).await.or_raise(|| ErrorKind::Metadata)
    }

    /// A file owned by `owner`, trashed or not.
    async fn record(&self, owner: UserId, id: FileId) -> Result<FileRecord> {
        match self.files.find_one(id, owner).await {
            Ok(record) => Ok(record),
            Err(e) if matches!(&*e, MetadataErrorKind::FileNotFound(_)) => Err(e).or_raise(|| ErrorKind::NotFound(id)),
            Err(e) => Err(e).or_raise(|| ErrorKind::Metadata),
        }
    }

    /// Quota of every account `owner` has connected, plus the pooled totals.
    ///
    /// Accounts that can't be reached are included with their error flag set
    /// rather than failing the summary.
    pub async fn summary(&self, owner: UserId) -> Result<PoolSummary> {
        let accounts = self.credentials.list_accounts(owner).await.or_raise(|| ErrorKind::Metadata)?;
        let reports = quota::aggregate(&self.tokens, &accounts).await;
        Ok(PoolSummary::new(accounts, reports))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Harness, OWNER};
    use bytes::Bytes;
    use colossus_provider::provider::MockProvider;

    fn request(name: &str, path: &str) -> UploadRequest {
        UploadRequest {
            owner: OWNER,
            name: name.to_string(),
            mime_type: Some("text/plain".to_string()),
            path: Some(path.to_string()),
            data: Bytes::from_static(b"hello"),
        }
    }

    #[tokio::test]
    async fn test_list_filters() {
        let harness = Harness::new(vec![MockProvider::new("a", 1000)]).await;
        let pool = &harness.pool;
        pool.upload(request("Report.pdf", "/work")).await.unwrap();
        pool.upload(request("notes.txt", "work/")).await.unwrap();
        let holiday = pool.upload(request("holiday.jpg", "/photos")).await.unwrap();
        pool.trash(OWNER, holiday.id).await.unwrap();

        let names = |files: Vec<FileRecord>| files.into_iter().map(|f| f.name).collect::<Vec<_>>();
        let all = pool.list(OWNER, &FileFilter::default()).await.unwrap();
        assert_eq!(names(all), vec!["notes.txt", "Report.pdf"]);

        let filter = FileFilter { path: Some("work//".to_string()), ..Default::default() };
        assert_eq!(pool.list(OWNER, &filter).await.unwrap().len(), 2);

        let filter = FileFilter { search: Some("report".to_string()), ..Default::default() };
        assert_eq!(names(pool.list(OWNER, &filter).await.unwrap()), vec!["Report.pdf"]);

        let filter = FileFilter { deleted: true, ..Default::default() };
        assert_eq!(names(pool.list(OWNER, &filter).await.unwrap()), vec!["holiday.jpg"]);
    }

    #[tokio::test]
    async fn test_list_rejects_bad_path() {
        let harness = Harness::new(vec![MockProvider::new("a", 1000)]).await;
        let filter = FileFilter { path: Some("/..".to_string()), ..Default::default() };
        let err = harness.pool.list(OWNER, &filter).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_other_users_see_nothing() {
        let harness = Harness::new(vec![MockProvider::new("a", 1000)]).await;
        harness.pool.upload(request("a.txt", "/")).await.unwrap();
        let files = harness.pool.list(UserId(2), &FileFilter::default()).await.unwrap();
        assert!(files.is_empty());
        let summary = harness.pool.summary(UserId(2)).await.unwrap();
        assert!(summary.accounts.is_empty());
        assert_eq!(summary.total, 0);
    }
}
