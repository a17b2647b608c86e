//! Account Discovery
//!
//! Lists the member accounts of the organization and identifies the
//! management account. The Organizations API is region-pinned, so the
//! production client is always built for the configured home region.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tracing::{debug, info};

use crate::error::{AuditError, BoxError};
use crate::pagination::{drain, Page};

/// Lifecycle status of a member account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccountStatus {
    Active,
    Suspended,
    PendingClosure,
    Other(String),
}

impl AccountStatus {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "ACTIVE" => AccountStatus::Active,
            "SUSPENDED" => AccountStatus::Suspended,
            "PENDING_CLOSURE" => AccountStatus::PendingClosure,
            other => AccountStatus::Other(other.to_string()),
        }
    }
}

impl fmt::Display for AccountStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccountStatus::Active => write!(f, "ACTIVE"),
            AccountStatus::Suspended => write!(f, "SUSPENDED"),
            AccountStatus::PendingClosure => write!(f, "PENDING_CLOSURE"),
            AccountStatus::Other(s) => write!(f, "{}", s),
        }
    }
}

/// An organization member account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: String,
    pub name: String,
    pub status: AccountStatus,
}

impl Account {
    pub fn new(id: &str, name: &str, status: AccountStatus) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            status,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == AccountStatus::Active
    }
}

/// Immutable id → account lookup, iterated in account id order
#[derive(Debug, Clone, Default)]
pub struct AccountDirectory {
    accounts: BTreeMap<String, Account>,
}

impl AccountDirectory {
    pub fn get(&self, id: &str) -> Option<&Account> {
        self.accounts.get(id)
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Account> {
        self.accounts.values()
    }

    /// Accounts to audit: everything except `excluded_id`
    pub fn without(&self, excluded_id: &str) -> Vec<Account> {
        self.accounts
            .values()
            .filter(|a| a.id != excluded_id)
            .cloned()
            .collect()
    }
}

impl FromIterator<Account> for AccountDirectory {
    fn from_iter<I: IntoIterator<Item = Account>>(iter: I) -> Self {
        Self {
            accounts: iter.into_iter().map(|a| (a.id.clone(), a)).collect(),
        }
    }
}

/// Seam over the Organizations API
#[async_trait]
pub trait OrganizationsApi: Send + Sync {
    /// One page of ListAccounts
    async fn list_accounts(&self, next_token: Option<String>) -> Result<Page<Account>, BoxError>;

    /// Management (master) account id from DescribeOrganization
    async fn management_account_id(&self) -> Result<Option<String>, BoxError>;
}

/// All ACTIVE accounts in the organization
pub async fn list_active_accounts(api: &dyn OrganizationsApi) -> Result<AccountDirectory, AuditError> {
    let accounts = drain(|token| api.list_accounts(token))
        .await
        .map_err(|e| AuditError::discovery("ListAccounts", e.source))?;

    let total = accounts.len();
    let directory: AccountDirectory = accounts
        .into_iter()
        .filter(|account| {
            if !account.is_active() {
                debug!(account_id = %account.id, status = %account.status, "Skipping inactive account");
            }
            account.is_active()
        })
        .collect();

    info!(total = total, active = directory.len(), "Listed organization accounts");
    Ok(directory)
}

/// The designated management account of the organization
pub async fn management_account_id(api: &dyn OrganizationsApi) -> Result<String, AuditError> {
    let id = api
        .management_account_id()
        .await
        .map_err(|e| AuditError::discovery("DescribeOrganization", e))?
        .filter(|id| !id.is_empty())
        .ok_or_else(|| {
            AuditError::discovery("DescribeOrganization", "response has no management account id")
        })?;

    info!(management_account_id = %id, "Identified management account");
    Ok(id)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Serves accounts in fixed-size pages
    pub(crate) struct FakeOrganizations {
        pub accounts: Vec<Account>,
        pub page_size: usize,
        pub management_id: Option<String>,
        pub fail_listing: bool,
        pub calls: AtomicUsize,
    }

    impl FakeOrganizations {
        pub fn new(accounts: Vec<Account>, management_id: &str) -> Self {
            Self {
                accounts,
                page_size: 2,
                management_id: Some(management_id.to_string()),
                fail_listing: false,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl OrganizationsApi for FakeOrganizations {
        async fn list_accounts(&self, next_token: Option<String>) -> Result<Page<Account>, BoxError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_listing {
                return Err("AWSOrganizationsNotInUseException".into());
            }

            let start: usize = next_token.map(|t| t.parse().unwrap()).unwrap_or(0);
            let end = (start + self.page_size).min(self.accounts.len());
            let next = (end < self.accounts.len()).then(|| end.to_string());
            Ok(Page::new(self.accounts[start..end].to_vec(), next))
        }

        async fn management_account_id(&self) -> Result<Option<String>, BoxError> {
            Ok(self.management_id.clone())
        }
    }

    fn sample_accounts() -> Vec<Account> {
        vec![
            Account::new("665735848255", "Management", AccountStatus::Active),
            Account::new("984217156667", "Audit", AccountStatus::Active),
            Account::new("543705552769", "Log archive", AccountStatus::Active),
            Account::new("797979728091", "Network", AccountStatus::Suspended),
            Account::new("625925655987", "Shared_Services", AccountStatus::PendingClosure),
        ]
    }

    #[tokio::test]
    async fn test_list_active_accounts_drops_inactive() {
        let api = FakeOrganizations::new(sample_accounts(), "665735848255");

        let directory = list_active_accounts(&api).await.unwrap();

        assert_eq!(directory.len(), 3);
        assert!(directory.iter().all(Account::is_active));
        assert!(directory.get("797979728091").is_none());
        assert!(directory.get("625925655987").is_none());
        assert_eq!(directory.get("984217156667").unwrap().name, "Audit");
        // 5 accounts in pages of 2
        assert_eq!(api.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_directory_excludes_management() {
        let api = FakeOrganizations::new(sample_accounts(), "665735848255");
        let directory = list_active_accounts(&api).await.unwrap();
        let management = management_account_id(&api).await.unwrap();

        let targets = directory.without(&management);

        assert_eq!(targets.len(), 2);
        assert!(targets.iter().all(|a| a.id != management));
        // Ordered by account id
        assert_eq!(targets[0].id, "543705552769");
        assert_eq!(targets[1].id, "984217156667");
    }

    #[tokio::test]
    async fn test_listing_failure_is_discovery_error() {
        let mut api = FakeOrganizations::new(sample_accounts(), "665735848255");
        api.fail_listing = true;

        let err = list_active_accounts(&api).await.unwrap_err();
        assert!(matches!(err, AuditError::Discovery { operation: "ListAccounts", .. }));
    }

    #[tokio::test]
    async fn test_missing_management_id_is_error() {
        let mut api = FakeOrganizations::new(sample_accounts(), "");
        api.management_id = None;

        let err = management_account_id(&api).await.unwrap_err();
        assert!(matches!(err, AuditError::Discovery { operation: "DescribeOrganization", .. }));
    }

    #[test]
    fn test_account_status_parse() {
        assert_eq!(AccountStatus::parse("ACTIVE"), AccountStatus::Active);
        assert_eq!(AccountStatus::parse("SUSPENDED"), AccountStatus::Suspended);
        assert_eq!(AccountStatus::parse("PENDING_CLOSURE"), AccountStatus::PendingClosure);
        assert_eq!(
            AccountStatus::parse("CLOSED"),
            AccountStatus::Other("CLOSED".to_string())
        );
        assert_eq!(AccountStatus::Other("CLOSED".to_string()).to_string(), "CLOSED");
    }
}
