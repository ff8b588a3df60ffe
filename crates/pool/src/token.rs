//! Token lifecycle.
//!
//! [`TokenManager::client()`] is the only way the pool obtains a provider for
//! an account. Expired tokens are refreshed before the client is built, and
//! the returned client refreshes and retries once more if the provider
//! rejects the token anyway.

use crate::authorized::AuthorizedProvider;
use crate::error::{ErrorKind, Result};
use async_trait::async_trait;
use colossus_metadata::{Account, CredentialStore};
use colossus_provider::ProviderHandle;
use colossus_provider::error::Result as ProviderResult;
use exn::ResultExt;
use std::sync::Arc;
use time::{Duration, UtcDateTime};
use tracing::instrument;

/// A newly issued access token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshedToken {
    pub access_token: String,
    /// `None` if the provider did not say.
    pub expires_at: Option<UtcDateTime>,
}

/// Exchanges an account's refresh token for a new access token.
///
/// A revoked or otherwise invalid refresh token must be reported as
/// [`Unauthorized`](colossus_provider::error::ErrorKind::Unauthorized).
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    async fn refresh(&self, account: &Account) -> ProviderResult<RefreshedToken>;
}

/// Builds a provider client for an account using the given access token.
///
/// Called for every operation; implementations should be cheap and hold no
/// per-account state.
pub trait Connector: Send + Sync {
    fn connect(&self, account: &Account, access_token: &str) -> ProviderResult<ProviderHandle>;
}

struct Inner {
    store: Arc<dyn CredentialStore>,
    refresher: Arc<dyn TokenRefresher>,
    connector: Arc<dyn Connector>,
    margin: Duration,
}

/// Hands out authenticated provider clients.
///
/// Refreshes are not serialised per account: two operations racing on the
/// same expired token may both refresh it, and the last one to persist wins.
#[derive(Clone)]
pub struct TokenManager {
    inner: Arc<Inner>,
}

impl TokenManager {
    /// Tokens expiring within `margin` are treated as already expired.
    pub fn new(
        store: Arc<dyn CredentialStore>,
        refresher: Arc<dyn TokenRefresher>,
        connector: Arc<dyn Connector>,
        margin: Duration,
    ) -> Self {
        Self { inner: Arc::new(Inner { store, refresher, connector, margin }) }
    }

    /// An authenticated client for `account`.
    ///
    /// # Errors
    ///
    /// [`AuthExpired`](ErrorKind::AuthExpired) if the token had to be
    /// refreshed and the refresh token was rejected;
    /// [`AccountUnavailable`](ErrorKind::AccountUnavailable) if refreshing or
    /// connecting failed for any other reason.
    #[instrument(skip_all, fields(account = %account.id))]
    pub async fn client(&self, account: &Account) -> Result<ProviderHandle> {
        let token = match account.token_expires_within(self.inner.margin, UtcDateTime::now()) {
            true => {
                tracing::debug!(label = %account.label, "Access token expired; refreshing before use");
                self.refresh(account).await?
            },
            false => account.access_token.clone(),
        };
        let provider = self.connect(account, &token)?;
        Ok(Arc::new(AuthorizedProvider::new(self.clone(), account.clone(), provider)))
    }

    /// Obtain a new access token and persist it.
    ///
    /// A failure to persist is logged and otherwise ignored: the new token is
    /// still good for this operation, the next one will simply refresh again.
    pub(crate) async fn refresh(&self, account: &Account) -> Result<String> {
        let refreshed = match self.inner.refresher.refresh(account).await {
            Ok(refreshed) => refreshed,
            Err(e) if e.is_unauthorized() => {
                tracing::warn!(
                    account = %account.id,
                    label = %account.label,
                    reconnect_required = true,
                    "Refresh token rejected; account must be reconnected"
                );
                return Err(e).or_raise(|| ErrorKind::AuthExpired(account.id));
            },
            Err(e) => {
                tracing::warn!(account = %account.id, label = %account.label, error = %e, "Could not refresh access token");
                return Err(e).or_raise(|| ErrorKind::AccountUnavailable(account.id));
            },
        };
        match self.inner.store.update_token(account.id, &refreshed.access_token, refreshed.expires_at).await {
            Ok(()) => tracing::info!(account = %account.id, label = %account.label, "Refreshed access token"),
            Err(e) => tracing::warn!(
                account = %account.id,
                label = %account.label,
                error = %e,
                "Refreshed access token but could not persist it"
            ),
        }
        Ok(refreshed.access_token)
    }

    pub(crate) fn connect(&self, account: &Account, access_token: &str) -> Result<ProviderHandle> {
        self.inner.connector.connect(account, access_token).or_raise(|| ErrorKind::AccountUnavailable(account.id))
    }
}
