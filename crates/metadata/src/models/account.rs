use crate::error::{Error, ErrorKind, Result};
use crate::models::{AccountId, UserId, from_db_int, from_timestamp, to_db_int};
use derive_more::Display;
use std::str::FromStr;
use time::{Duration, UtcDateTime};

/// Which kind of remote storage an account lives on.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    #[display("local")]
    Local,
    #[display("drive")]
    Drive,
}
impl FromStr for ProviderKind {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self> {
        Ok(match s.trim().to_ascii_lowercase().as_str() {
            "local" => Self::Local,
            "drive" | "gdrive" | "google" => Self::Drive,
            _ => exn::bail!(ErrorKind::InvalidData("provider kind")),
        })
    }
}

/// One connected storage account and its credentials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub id: AccountId,
    pub owner: UserId,
    pub provider: ProviderKind,
    /// Email address or other display label.
    pub label: String,
    pub access_token: String,
    pub refresh_token: Option<String>,
    /// `None` when the provider did not say when the token expires.
    pub token_expiry: Option<UtcDateTime>,
    /// Provider-assigned folder (Drive) or directory (local) objects live in.
    pub root_ref: Option<String>,
    /// Advertised capacity, for providers that can't report their own.
    pub capacity: Option<u64>,
    pub connected_at: UtcDateTime,
}

impl Account {
    /// Whether the access token is expired, or will be within `margin`.
    pub fn token_expires_within(&self, margin: Duration, now: UtcDateTime) -> bool {
        self.token_expiry.is_some_and(|expiry| expiry <= now + margin)
    }
}

/// An account about to be connected.
#[derive(Debug, Clone)]
pub struct NewAccount {
    pub owner: UserId,
    pub provider: ProviderKind,
    pub label: String,
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub token_expiry: Option<UtcDateTime>,
    pub root_ref: Option<String>,
    pub capacity: Option<u64>,
}

#[derive(sqlx::FromRow)]
pub(crate) struct AccountRow {
    id: i64,
    owner: i64,
    provider: String,
    label: String,
    access_token: String,
    refresh_token: Option<String>,
    token_expiry: Option<i64>,
    root_ref: Option<String>,
    capacity: Option<i64>,
    connected_at: i64,
}

impl TryFrom<AccountRow> for Account {
    type Error = Error;
    fn try_from(row: AccountRow) -> Result<Self> {
        Ok(Self {
            id: AccountId(row.id),
            owner: UserId(row.owner),
            provider: row.provider.parse()?,
            label: row.label,
            access_token: row.access_token,
            refresh_token: row.refresh_token,
            token_expiry: row.token_expiry.map(|ts| from_timestamp(ts, "token expiry")).transpose()?,
            root_ref: row.root_ref,
            capacity: row.capacity.map(|c| from_db_int(c, "capacity")).transpose()?,
            connected_at: from_timestamp(row.connected_at, "connection date")?,
        })
    }
}

impl NewAccount {
    pub(crate) fn capacity_column(&self) -> Result<Option<i64>> {
        self.capacity.map(|c| to_db_int(c, "capacity")).transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn row(provider: &str, expiry: Option<i64>) -> AccountRow {
        AccountRow {
            id: 3,
            owner: 1,
            provider: provider.to_string(),
            label: "alice@example.com".to_string(),
            access_token: "access".to_string(),
            refresh_token: Some("refresh".to_string()),
            token_expiry: expiry,
            root_ref: None,
            capacity: Some(1024),
            connected_at: 1_700_000_000,
        }
    }

    #[test]
    fn test_row_to_model() {
        let account = Account::try_from(row("drive", Some(1_700_003_600))).unwrap();
        assert_eq!(account.provider, ProviderKind::Drive);
        assert_eq!(account.capacity, Some(1024));
        assert_eq!(account.token_expiry.unwrap().unix_timestamp(), 1_700_003_600);
    }

    #[test]
    fn test_unknown_provider_kind() {
        assert!(Account::try_from(row("dropbox", None)).is_err());
    }

    #[rstest]
    #[case(None, false)]
    #[case(Some(-3600), true)]
    #[case(Some(30), true)]
    #[case(Some(60), true)]
    #[case(Some(61), false)]
    #[case(Some(3600), false)]
    fn test_token_expires_within(#[case] expires_in: Option<i64>, #[case] expected: bool) {
        let now = UtcDateTime::from_unix_timestamp(1_700_000_000).unwrap();
        let mut account = Account::try_from(row("drive", None)).unwrap();
        account.token_expiry = expires_in.map(|secs| now + Duration::seconds(secs));
        assert_eq!(account.token_expires_within(Duration::seconds(60), now), expected);
    }

    #[test]
    fn test_provider_kind_round_trip() {
        assert_eq!(ProviderKind::Local.to_string(), "local");
        assert_eq!("drive".parse::<ProviderKind>().unwrap(), ProviderKind::Drive);
        assert_eq!(" Google ".parse::<ProviderKind>().unwrap(), ProviderKind::Drive);
    }
}
