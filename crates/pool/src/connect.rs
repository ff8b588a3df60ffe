//! Provider clients and token refresh for the account kinds colossus knows.
//!
//! Drive support needs the `drive` feature; without it, Drive accounts fail
//! with [`Unsupported`](ErrorKind::Unsupported).

use crate::token::{Connector, RefreshedToken, TokenRefresher};
use async_trait::async_trait;
use colossus_metadata::{Account, ProviderKind};
use colossus_provider::ProviderHandle;
use colossus_provider::error::{ErrorKind, Result};
use colossus_provider::provider::LocalProvider;
use exn::OptionExt;
use std::sync::Arc;

/// OAuth client credentials used to refresh Drive access tokens.
#[derive(Debug, Clone)]
pub struct OAuthClient {
    pub client_id: String,
    pub client_secret: String,
    pub token_url: String,
}

/// Builds clients for local and Drive accounts.
#[derive(Debug, Clone, Default)]
pub struct DefaultConnector {
    #[cfg(feature = "drive")]
    http: reqwest::Client,
}

impl DefaultConnector {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Connector for DefaultConnector {
    fn connect(&self, account: &Account, access_token: &str) -> Result<ProviderHandle> {
        match account.provider {
            ProviderKind::Local => {
                let root = account.root_ref.as_deref().ok_or_raise(|| {
                    ErrorKind::Provider(format!("local account `{}` has no root directory", account.label))
                })?;
                let capacity = account
                    .capacity
                    .ok_or_raise(|| ErrorKind::Provider(format!("local account `{}` has no capacity", account.label)))?;
                Ok(Arc::new(LocalProvider::new(&account.label, root, capacity)?))
            },
            #[cfg(feature = "drive")]
            ProviderKind::Drive => {
                use colossus_provider::provider::DriveProvider;
                let provider = DriveProvider::new(self.http.clone(), &account.label, access_token, account.root_ref.clone());
                Ok(Arc::new(provider))
            },
            #[cfg(not(feature = "drive"))]
            ProviderKind::Drive => {
                let _ = access_token;
                exn::bail!(ErrorKind::Unsupported("drive (built without the `drive` feature)".to_string()))
            },
        }
    }
}

/// Refreshes access tokens for local and Drive accounts.
///
/// Local accounts have nothing to refresh: their stored token is returned
/// as-is without an expiry.
#[derive(Debug, Clone, Default)]
pub struct DefaultRefresher {
    #[cfg(feature = "drive")]
    http: reqwest::Client,
    oauth: Option<OAuthClient>,
}

impl DefaultRefresher {
    /// Without an OAuth client, Drive tokens can't be refreshed and expired
    /// Drive accounts become unavailable until reconnected.
    pub fn new(oauth: Option<OAuthClient>) -> Self {
        Self { oauth, ..Self::default() }
    }
}

#[async_trait]
impl TokenRefresher for DefaultRefresher {
    async fn refresh(&self, account: &Account) -> Result<RefreshedToken> {
        match account.provider {
            ProviderKind::Local => Ok(RefreshedToken { access_token: account.access_token.clone(), expires_at: None }),
            ProviderKind::Drive => self.refresh_drive(account).await,
        }
    }
}

impl DefaultRefresher {
    #[cfg(feature = "drive")]
    async fn refresh_drive(&self, account: &Account) -> Result<RefreshedToken> {
        use colossus_provider::provider::drive::refresh_access_token;
        use time::{Duration, UtcDateTime};

        let Some(refresh_token) = account.refresh_token.as_deref() else {
            // Nothing to refresh with; the user has to connect the account again.
            exn::bail!(ErrorKind::Unauthorized);
        };
        let Some(oauth) = &self.oauth else {
            exn::bail!(ErrorKind::Unsupported("no Google OAuth client configured".to_string()));
        };
        let grant =
            refresh_access_token(&self.http, &oauth.token_url, &oauth.client_id, &oauth.client_secret, refresh_token)
                .await?;
        let expires_at = grant
            .expires_in
            .and_then(|secs| i64::try_from(secs).ok())
            .map(|secs| UtcDateTime::now() + Duration::seconds(secs));
        Ok(RefreshedToken { access_token: grant.access_token, expires_at })
    }

    #[cfg(not(feature = "drive"))]
    async fn refresh_drive(&self, _account: &Account) -> Result<RefreshedToken> {
        exn::bail!(ErrorKind::Unsupported("drive (built without the `drive` feature)".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use colossus_metadata::{AccountId, UserId};
    use colossus_provider::RemoteProvider;
    use time::UtcDateTime;

    fn account(provider: ProviderKind, root_ref: Option<String>, capacity: Option<u64>) -> Account {
        Account {
            id: AccountId(1),
            owner: UserId(1),
            provider,
            label: "disk".to_string(),
            access_token: "token".to_string(),
            refresh_token: None,
            token_expiry: None,
            root_ref,
            capacity,
            connected_at: UtcDateTime::now(),
        }
    }

    #[tokio::test]
    async fn test_local_account() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("pool");
        let account = account(ProviderKind::Local, Some(root.to_string_lossy().into_owned()), Some(1000));
        let provider = DefaultConnector::new().connect(&account, "token").unwrap();
        assert_eq!(provider.name(), "disk");
        assert_eq!(provider.quota().await.unwrap().total, 1000);
    }

    #[test]
    fn test_local_account_needs_root_and_capacity() {
        let connector = DefaultConnector::new();
        assert!(connector.connect(&account(ProviderKind::Local, None, Some(1000)), "token").is_err());
        assert!(connector.connect(&account(ProviderKind::Local, Some("/tmp/x".to_string()), None), "token").is_err());
    }

    #[tokio::test]
    async fn test_local_refresh_keeps_token() {
        let refreshed = DefaultRefresher::new(None).refresh(&account(ProviderKind::Local, None, None)).await.unwrap();
        assert_eq!(refreshed, RefreshedToken { access_token: "token".to_string(), expires_at: None });
    }

    #[cfg(feature = "drive")]
    #[tokio::test]
    async fn test_drive_refresh_without_refresh_token() {
        let oauth = OAuthClient {
            client_id: "id".to_string(),
            client_secret: "secret".to_string(),
            token_url: "http://127.0.0.1:9/token".to_string(),
        };
        let err = DefaultRefresher::new(Some(oauth)).refresh(&account(ProviderKind::Drive, None, None)).await.unwrap_err();
        assert!(err.is_unauthorized());
    }

    #[cfg(not(feature = "drive"))]
    #[test]
    fn test_drive_unsupported() {
        let err = DefaultConnector::new().connect(&account(ProviderKind::Drive, None, None), "token").err().unwrap();
        assert!(matches!(&*err, ErrorKind::Unsupported(_)));
    }
}
