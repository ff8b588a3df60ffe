//! Provider wrapper that refreshes rejected tokens.

use crate::token::TokenManager;
use async_trait::async_trait;
use bytes::Bytes;
use colossus_metadata::Account;
use colossus_provider::error::{ErrorKind, Result};
use colossus_provider::{ByteStream, ProviderHandle, Quota, RemoteObject, RemoteProvider};
use std::future::Future;
use tokio::sync::RwLock;

/// Provider wrapper handed out by [`TokenManager::client()`].
///
/// Forwards every call to the wrapped provider. A call rejected with
/// [`Unauthorized`](ErrorKind::Unauthorized) refreshes the token, rebuilds
/// the provider and is retried exactly once. The rebuilt provider replaces
/// the wrapped one for later calls.
pub(crate) struct AuthorizedProvider {
    tokens: TokenManager,
    account: Account,
    inner: RwLock<ProviderHandle>,
}

impl AuthorizedProvider {
    pub(crate) fn new(tokens: TokenManager, account: Account, inner: ProviderHandle) -> Self {
        Self { tokens, account, inner: RwLock::new(inner) }
    }

    async fn reauthorize(&self) -> Result<ProviderHandle> {
        let token = self.tokens.refresh(&self.account).await.map_err(|e| match e.reconnect_required() {
            Some(_) => e.raise(ErrorKind::Unauthorized),
            None => e.raise(ErrorKind::Network("token refresh failed".to_string())),
        })?;
        let provider = self
            .tokens
            .connect(&self.account, &token)
            .map_err(|e| e.raise(ErrorKind::Provider("could not reconnect after token refresh".to_string())))?;
        *self.inner.write().await = provider.clone();
        Ok(provider)
    }

    async fn call<T, F, Fut>(&self, op: F) -> Result<T>
    where
        F: Fn(ProviderHandle) -> Fut + Send + Sync,
        Fut: Future<Output = Result<T>> + Send,
        T: Send,
    {
        let provider = self.inner.read().await.clone();
        match op(provider).await {
            Err(e) if e.is_unauthorized() => {
                tracing::info!(account = %self.account.id, label = %self.account.label, "Access token rejected; refreshing");
                let provider = self.reauthorize().await?;
                op(provider).await
            },
            result => result,
        }
    }
}

#[async_trait]
impl RemoteProvider for AuthorizedProvider {
    fn name(&self) -> &str {
        &self.account.label
    }

    async fn quota(&self) -> Result<Quota> {
        self.call(|provider| async move { provider.quota().await }).await
    }

    async fn create(&self, name: &str, mime_type: &str, data: Bytes) -> Result<RemoteObject> {
        self.call(|provider| {
            let data = data.clone();
            async move { provider.create(name, mime_type, data).await }
        })
        .await
    }

    async fn reader(&self, remote_id: &str) -> Result<ByteStream> {
        self.call(|provider| async move { provider.reader(remote_id).await }).await
    }

    async fn delete(&self, remote_id: &str) -> Result<()> {
        self.call(|provider| async move { provider.delete(remote_id).await }).await
    }
}
