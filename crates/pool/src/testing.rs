//! Test harness: a pool over mock accounts and an in-memory database.

use crate::token::{Connector, RefreshedToken, TokenRefresher};
use crate::{Pool, PoolOptions};
use async_trait::async_trait;
use bytes::Bytes;
use colossus_metadata::{Account, CredentialStore, Database, NewAccount, ProviderKind, Repository, UserId};
use colossus_provider::error::{ErrorKind, Result};
use colossus_provider::provider::MockProvider;
use colossus_provider::{ByteStream, ProviderHandle, Quota, RemoteObject, RemoteProvider};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use time::{Duration, UtcDateTime};

pub(crate) const OWNER: UserId = UserId(1);

/// Which access token each mock account currently accepts.
#[derive(Default)]
pub(crate) struct AuthState {
    valid: Mutex<HashMap<String, String>>,
}

impl AuthState {
    fn grant(&self, label: &str, token: &str) {
        self.valid.lock().unwrap().insert(label.to_string(), token.to_string());
    }

    /// Invalidate whatever token the account currently accepts.
    pub(crate) fn revoke_access(&self, label: &str) {
        self.grant(label, "revoked");
    }

    fn check(&self, label: &str, token: &str) -> Result<()> {
        match self.valid.lock().unwrap().get(label) {
            Some(valid) if valid == token => Ok(()),
            _ => exn::bail!(ErrorKind::Unauthorized),
        }
    }
}

#[derive(Default)]
pub(crate) struct MockRefresher {
    pub(crate) calls: AtomicUsize,
    /// Reject the refresh token.
    pub(crate) revoked: AtomicBool,
    /// Fail as if the token endpoint were unreachable.
    pub(crate) offline: AtomicBool,
    auth: Arc<AuthState>,
}

#[async_trait]
impl TokenRefresher for MockRefresher {
    async fn refresh(&self, account: &Account) -> Result<RefreshedToken> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.offline.load(Ordering::SeqCst) {
            exn::bail!(ErrorKind::Network("token endpoint unreachable".to_string()));
        }
        if self.revoked.load(Ordering::SeqCst) {
            exn::bail!(ErrorKind::Unauthorized);
        }
        let access_token = format!("fresh-{n}");
        self.auth.grant(&account.label, &access_token);
        Ok(RefreshedToken { access_token, expires_at: Some(UtcDateTime::now() + Duration::hours(1)) })
    }
}

/// Mock account that checks the access token on every call.
struct Checked {
    inner: Arc<MockProvider>,
    token: String,
    auth: Arc<AuthState>,
}

#[async_trait]
impl RemoteProvider for Checked {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn quota(&self) -> Result<Quota> {
        self.auth.check(self.name(), &self.token)?;
        self.inner.quota().await
    }

    async fn create(&self, name: &str, mime_type: &str, data: Bytes) -> Result<RemoteObject> {
        self.auth.check(self.name(), &self.token)?;
        self.inner.create(name, mime_type, data).await
    }

    async fn reader(&self, remote_id: &str) -> Result<ByteStream> {
        self.auth.check(self.name(), &self.token)?;
        self.inner.reader(remote_id).await
    }

    async fn delete(&self, remote_id: &str) -> Result<()> {
        self.auth.check(self.name(), &self.token)?;
        self.inner.delete(remote_id).await
    }
}

pub(crate) struct MockConnector {
    providers: HashMap<String, Arc<MockProvider>>,
    auth: Arc<AuthState>,
}

impl Connector for MockConnector {
    fn connect(&self, account: &Account, access_token: &str) -> Result<ProviderHandle> {
        let inner = self
            .providers
            .get(&account.label)
            .cloned()
            .ok_or_else(|| exn::Exn::from(ErrorKind::NotFound(account.label.clone())))?;
        Ok(Arc::new(Checked { inner, token: access_token.to_string(), auth: self.auth.clone() }))
    }
}

pub(crate) struct Harness {
    pub(crate) pool: Pool,
    pub(crate) repo: Repository,
    pub(crate) providers: Vec<Arc<MockProvider>>,
    /// Index-aligned with `providers`.
    pub(crate) accounts: Vec<Account>,
    pub(crate) refresher: Arc<MockRefresher>,
    pub(crate) connector: Arc<MockConnector>,
    pub(crate) auth: Arc<AuthState>,
}

impl Harness {
    /// One local account per mock, labelled with the mock's name, connected
    /// in the given order.
    pub(crate) async fn new(mocks: Vec<MockProvider>) -> Self {
        let db = Database::connect_in_memory().await.unwrap();
        let repo = Repository::from(&db);
        let auth = Arc::new(AuthState::default());
        let mut providers = Vec::new();
        let mut accounts = Vec::new();
        for mock in mocks {
            let label = mock.name().to_string();
            let token = format!("token-{label}");
            let account = repo
                .connect_account(NewAccount {
                    owner: OWNER,
                    provider: ProviderKind::Local,
                    label: label.clone(),
                    access_token: token.clone(),
                    refresh_token: Some(format!("refresh-{label}")),
                    token_expiry: None,
                    root_ref: None,
                    capacity: None,
                })
                .await
                .unwrap();
            auth.grant(&label, &token);
            providers.push(Arc::new(mock));
            accounts.push(account);
        }
        let refresher = Arc::new(MockRefresher { auth: auth.clone(), ..Default::default() });
        let connector = Arc::new(MockConnector {
            providers: providers.iter().map(|p| (p.name().to_string(), p.clone())).collect(),
            auth: auth.clone(),
        });
        let pool = Pool::new(
            Arc::new(repo.clone()),
            Arc::new(repo.clone()),
            refresher.clone(),
            connector.clone(),
            PoolOptions::default(),
        );
        Self { pool, repo, providers, accounts, refresher, connector, auth }
    }

    /// Mark account `i`'s stored token as expired and return the updated account.
    pub(crate) async fn expire_token(&self, i: usize) -> Account {
        let account = &self.accounts[i];
        let expiry = UtcDateTime::now() - Duration::hours(1);
        self.repo.update_token(account.id, &account.access_token, Some(expiry)).await.unwrap();
        self.stored_account(i).await
    }

    pub(crate) async fn stored_account(&self, i: usize) -> Account {
        self.repo.account(self.accounts[i].id, OWNER).await.unwrap()
    }

    /// Total objects stored across every mock account.
    pub(crate) async fn object_count(&self) -> usize {
        let mut count = 0;
        for provider in &self.providers {
            count += provider.object_count().await;
        }
        count
    }
}
