//! Persistence boundary of the registry.
//!
//! The registry never sees the on-disk format. It receives loaded accounts
//! from [`DomainStorage::start`] and hands an [`AccountsSnapshot`] back on
//! every write.

pub mod file;
pub mod memory;

use std::path::PathBuf;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::account::{Account, AccountIndex, AccountWithIndex};
use crate::network::NetworkConfig;
use crate::session::UserId;

pub use file::FileStorage;
pub use memory::MemoryStorage;

/// Why the stored accounts could not be opened.
#[derive(Debug, thiserror::Error)]
pub enum StartError {
    #[error("Incorrect passcode")]
    IncorrectPasscode,

    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Accounts data at {location} is corrupt: {reason}")]
    Corrupt { location: String, reason: String },
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize accounts: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Accounts produced by a successful start, in stored order.
#[derive(Debug, Default)]
pub struct LoadedAccounts {
    pub accounts: Vec<AccountWithIndex>,
    pub active: Option<AccountIndex>,
}

/// Persisted form of one account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredAccount {
    pub index: AccountIndex,
    pub config: NetworkConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<UserId>,
}

impl StoredAccount {
    pub fn from_account(account: &Account) -> Self {
        Self {
            index: account.index(),
            config: account.config(),
            user_id: account.maybe_session().map(|session| session.user_id()),
        }
    }

    /// Build a started account; stored authorizations come back as live sessions.
    pub fn into_account(self) -> AccountWithIndex {
        let account = Rc::new(Account::new(self.index));
        account.start(self.config);
        if let Some(user_id) = self.user_id {
            account.log_in(user_id);
        }
        AccountWithIndex {
            index: self.index,
            account,
        }
    }
}

/// Everything the registry persists: membership, order and the active index.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountsSnapshot {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active: Option<AccountIndex>,
    pub accounts: Vec<StoredAccount>,
}

impl AccountsSnapshot {
    pub fn into_loaded(self) -> LoadedAccounts {
        LoadedAccounts {
            accounts: self
                .accounts
                .into_iter()
                .map(StoredAccount::into_account)
                .collect(),
            active: self.active,
        }
    }

    /// Fresh installation: a single production account at index 0, no session.
    pub fn scratch() -> Self {
        Self {
            active: Some(AccountIndex(0)),
            accounts: vec![StoredAccount {
                index: AccountIndex(0),
                config: NetworkConfig::new(crate::network::Environment::Production),
                user_id: None,
            }],
        }
    }
}

pub trait DomainStorage {
    /// Unlock and load the stored accounts.
    fn start(&mut self, passcode: &[u8]) -> Result<LoadedAccounts, StartError>;

    /// Forget everything (including the passcode) and start with a default account.
    fn start_from_scratch(&mut self) -> LoadedAccounts;

    /// Prepare storage for an account the registry just created.
    fn start_added(&mut self, account: &Account, config: NetworkConfig);

    fn write_accounts(&mut self, snapshot: &AccountsSnapshot) -> Result<(), StorageError>;

    /// Re-protect `snapshot` with `passcode`; an empty passcode removes the lock.
    fn set_passcode(
        &mut self,
        passcode: &[u8],
        snapshot: &AccountsSnapshot,
    ) -> Result<(), StorageError>;

    fn has_local_passcode(&self) -> bool;
}
