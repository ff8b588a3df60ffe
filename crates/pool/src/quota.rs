//! Quota aggregation.

use crate::error::{ErrorKind, Result};
use crate::token::TokenManager;
use colossus_metadata::Account;
use colossus_provider::{ProviderHandle, Quota, RemoteProvider};
use futures::future::join_all;

/// Quota of one account at one moment, or the fact that it couldn't be
/// fetched. Never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaReport {
    pub total: u64,
    pub used: u64,
    pub free: u64,
    /// The quota could not be fetched; the numbers are all zero.
    pub error: bool,
}

impl QuotaReport {
    pub fn new(total: u64, used: u64) -> Self {
        Quota::new(total, used).into()
    }

    pub fn unavailable() -> Self {
        Self { total: 0, used: 0, free: 0, error: true }
    }
}

impl From<Quota> for QuotaReport {
    fn from(quota: Quota) -> Self {
        Self {
            total: quota.total,
            used: quota.used,
            free: quota.free(),
            error: false,
        }
    }
}

/// One account's quota along with the client used to fetch it.
pub(crate) struct Probe {
    pub(crate) client: Option<ProviderHandle>,
    pub(crate) report: QuotaReport,
}

async fn query(tokens: &TokenManager, account: &Account) -> Result<(ProviderHandle, Quota)> {
    let client = tokens.client(account).await?;
    let quota = client.quota().await.map_err(|e| ErrorKind::account(e, account.id))?;
    Ok((client, quota))
}

async fn probe_one(tokens: &TokenManager, account: &Account) -> Probe {
    match query(tokens, account).await {
        Ok((client, quota)) => {
            tracing::debug!(account = %account.id, total = quota.total, used = quota.used, "Fetched quota");
            Probe { client: Some(client), report: quota.into() }
        },
        Err(e) => {
            tracing::warn!(
                account = %account.id,
                label = %account.label,
                reconnect_required = e.reconnect_required().is_some(),
                error = %e,
                "Could not fetch quota; account skipped"
            );
            Probe { client: None, report: QuotaReport::unavailable() }
        },
    }
}

/// Fetch every account's quota concurrently, keeping the clients around.
///
/// The result is index-aligned with `accounts`.
pub(crate) async fn probe(tokens: &TokenManager, accounts: &[Account]) -> Vec<Probe> {
    join_all(accounts.iter().map(|account| probe_one(tokens, account))).await
}

/// Fetch every account's quota concurrently.
///
/// One account failing does not affect the others: its report has
/// [`error`](QuotaReport::error) set instead. The result is index-aligned
/// with `accounts`.
pub async fn aggregate(tokens: &TokenManager, accounts: &[Account]) -> Vec<QuotaReport> {
    probe(tokens, accounts).await.into_iter().map(|probe| probe.report).collect()
}

/// Quota of one account within a [`PoolSummary`].
#[derive(Debug, Clone)]
pub struct AccountQuota {
    pub account: Account,
    pub quota: QuotaReport,
}

/// Every account's quota plus the pooled totals.
///
/// Accounts whose quota could not be fetched don't count towards the totals.
#[derive(Debug, Clone)]
pub struct PoolSummary {
    pub accounts: Vec<AccountQuota>,
    pub total: u64,
    pub used: u64,
    pub free: u64,
}

impl PoolSummary {
    pub(crate) fn new(accounts: Vec<Account>, reports: Vec<QuotaReport>) -> Self {
        let mut summary = Self { accounts: Vec::with_capacity(accounts.len()), total: 0, used: 0, free: 0 };
        for (account, quota) in accounts.into_iter().zip(reports) {
            if !quota.error {
                summary.total = summary.total.saturating_add(quota.total);
                summary.used = summary.used.saturating_add(quota.used);
                summary.free = summary.free.saturating_add(quota.free);
            }
            summary.accounts.push(AccountQuota { account, quota });
        }
        summary
    }

    /// Accounts whose quota could not be fetched.
    pub fn unavailable(&self) -> impl Iterator<Item = &Account> {
        self.accounts.iter().filter(|entry| entry.quota.error).map(|entry| &entry.account)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Harness;
    use colossus_provider::provider::MockProvider;
    use std::sync::atomic::Ordering;

    #[test]
    fn test_report_from_quota() {
        assert_eq!(QuotaReport::new(100, 30), QuotaReport { total: 100, used: 30, free: 70, error: false });
        // Over quota is zero free, not an underflow.
        assert_eq!(QuotaReport::new(100, 130).free, 0);
    }

    #[tokio::test]
    async fn test_failures_are_isolated_and_aligned() {
        let harness = Harness::new(vec![
            MockProvider::new("a", 100).with_usage(10),
            MockProvider::new("b", 50),
            MockProvider::new("c", 80).with_usage(80),
        ])
        .await;
        harness.providers[1].fail_quota(true);
        let reports = aggregate(harness.pool.tokens(), &harness.accounts).await;
        assert_eq!(
            reports,
            vec![QuotaReport::new(100, 10), QuotaReport::unavailable(), QuotaReport::new(80, 80)]
        );
    }

    #[tokio::test]
    async fn test_revoked_account_reported_as_error() {
        let harness = Harness::new(vec![MockProvider::new("a", 100), MockProvider::new("b", 100)]).await;
        harness.auth.revoke_access("b");
        harness.refresher.revoked.store(true, Ordering::SeqCst);
        let reports = aggregate(harness.pool.tokens(), &harness.accounts).await;
        assert!(!reports[0].error);
        assert!(reports[1].error);
    }

    #[tokio::test]
    async fn test_summary_totals() {
        let harness = Harness::new(vec![
            MockProvider::new("a", 100).with_usage(25),
            MockProvider::new("b", 50),
            MockProvider::new("c", 1000),
        ])
        .await;
        harness.providers[2].fail_quota(true);
        let summary = harness.pool.summary(crate::testing::OWNER).await.unwrap();
        assert_eq!((summary.total, summary.used, summary.free), (150, 25, 125));
        assert_eq!(summary.accounts.len(), 3);
        let unavailable: Vec<&str> = summary.unavailable().map(|a| a.label.as_str()).collect();
        assert_eq!(unavailable, vec!["c"]);
    }

    #[test]
    fn test_summary_saturates() {
        let summary = PoolSummary::new(Vec::new(), Vec::new());
        assert_eq!(summary.total, 0);
        let mut total = 0u64;
        for quota in [QuotaReport::new(u64::MAX, 0), QuotaReport::new(10, 0)] {
            total = total.saturating_add(quota.total);
        }
        assert_eq!(total, u64::MAX);
    }
}
