//! JSON accounts file, optionally locked with a local passcode.
//!
//! Layout of `<data_dir>/<data_name>/accounts.json`:
//!
//! ```json
//! {
//!   "schema_version": 1,
//!   "saved_at": 1760000000,
//!   "passcode": { "salt": "<hex>", "hash": "<hex>" },
//!   "active": 0,
//!   "accounts": [{ "index": 0, "config": { ... }, "user_id": 42 }]
//! }
//! ```
//!
//! The passcode is never stored; `hash` is SHA-256 over `salt || passcode`.
//! Writes go to a temp file first and are renamed into place so an
//! interrupted write never leaves a truncated accounts file behind.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use uuid::Uuid;

use super::{AccountsSnapshot, DomainStorage, LoadedAccounts, StartError, StorageError};
use crate::account::Account;
use crate::config::CoreConfig;
use crate::constants::ACCOUNTS_SCHEMA_VERSION;
use crate::network::NetworkConfig;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct PasscodeDigest {
    salt: String,
    hash: String,
}

impl PasscodeDigest {
    fn new(passcode: &[u8]) -> Self {
        let salt = Uuid::new_v4();
        Self {
            salt: hex::encode(salt.as_bytes()),
            hash: hex::encode(digest(salt.as_bytes(), passcode)),
        }
    }

    /// Constant-time comparison of the decoded digests.
    fn matches(&self, passcode: &[u8]) -> bool {
        let (Ok(salt), Ok(expected)) = (hex::decode(&self.salt), hex::decode(&self.hash)) else {
            return false;
        };
        digest(&salt, passcode).as_slice().ct_eq(&expected).into()
    }
}

fn digest(salt: &[u8], passcode: &[u8]) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(salt);
    hasher.update(passcode);
    hasher.finalize().to_vec()
}

#[derive(Debug, Serialize, Deserialize)]
struct AccountsFile {
    schema_version: u32,
    #[serde(default)]
    saved_at: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    passcode: Option<PasscodeDigest>,
    #[serde(flatten)]
    snapshot: AccountsSnapshot,
}

pub struct FileStorage {
    path: PathBuf,
    passcode: Option<PasscodeDigest>,
    snapshot: AccountsSnapshot,
}

impl FileStorage {
    pub fn new(config: &CoreConfig) -> Self {
        Self::at_path(config.accounts_path())
    }

    pub fn at_path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            passcode: None,
            snapshot: AccountsSnapshot::default(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn corrupt(&self, reason: impl Into<String>) -> StartError {
        StartError::Corrupt {
            location: self.path.display().to_string(),
            reason: reason.into(),
        }
    }

    fn read_file(&self) -> Result<Option<AccountsFile>, StartError> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(StartError::Io {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        let file: AccountsFile =
            serde_json::from_slice(&bytes).map_err(|e| self.corrupt(e.to_string()))?;

        if file.schema_version != ACCOUNTS_SCHEMA_VERSION {
            return Err(self.corrupt(format!(
                "unsupported schema version {} (expected {})",
                file.schema_version, ACCOUNTS_SCHEMA_VERSION
            )));
        }

        let mut seen = HashSet::new();
        for account in &file.snapshot.accounts {
            if !seen.insert(account.index) {
                return Err(self.corrupt(format!("repeated account index {}", account.index)));
            }
        }

        Ok(Some(file))
    }

    fn save(&self) -> Result<(), StorageError> {
        let saved_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        let file = AccountsFile {
            schema_version: ACCOUNTS_SCHEMA_VERSION,
            saved_at,
            passcode: self.passcode.clone(),
            snapshot: self.snapshot.clone(),
        };
        let data = serde_json::to_vec_pretty(&file)?;

        let io_error = |source| StorageError::Io {
            path: self.path.clone(),
            source,
        };
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(io_error)?;
        }
        let temp_path = self.path.with_extension("json.tmp");
        fs::write(&temp_path, data).map_err(io_error)?;
        fs::rename(&temp_path, &self.path).map_err(|source| {
            let _ = fs::remove_file(&temp_path);
            io_error(source)
        })?;

        tracing::debug!(
            "Wrote {} accounts to {}",
            self.snapshot.accounts.len(),
            self.path.display()
        );
        Ok(())
    }
}

impl DomainStorage for FileStorage {
    fn start(&mut self, passcode: &[u8]) -> Result<LoadedAccounts, StartError> {
        let Some(file) = self.read_file()? else {
            tracing::info!(
                "No accounts file at {}, starting from scratch",
                self.path.display()
            );
            return Ok(self.start_from_scratch());
        };

        if let Some(digest) = &file.passcode {
            if !digest.matches(passcode) {
                return Err(StartError::IncorrectPasscode);
            }
        }

        if file.snapshot.accounts.is_empty() {
            tracing::warn!(
                "Accounts file {} lists no accounts, starting from scratch",
                self.path.display()
            );
            return Ok(self.start_from_scratch());
        }

        tracing::info!(
            "Loaded {} accounts from {}",
            file.snapshot.accounts.len(),
            self.path.display()
        );
        self.passcode = file.passcode;
        self.snapshot = file.snapshot.clone();
        Ok(file.snapshot.into_loaded())
    }

    fn start_from_scratch(&mut self) -> LoadedAccounts {
        self.passcode = None;
        self.snapshot = AccountsSnapshot::scratch();
        if let Err(e) = self.save() {
            tracing::error!("Failed to write fresh accounts file: {}", e);
        }
        self.snapshot.clone().into_loaded()
    }

    fn start_added(&mut self, account: &Account, config: NetworkConfig) {
        account.start(config);
    }

    fn write_accounts(&mut self, snapshot: &AccountsSnapshot) -> Result<(), StorageError> {
        self.snapshot = snapshot.clone();
        self.save()
    }

    fn set_passcode(
        &mut self,
        passcode: &[u8],
        snapshot: &AccountsSnapshot,
    ) -> Result<(), StorageError> {
        self.passcode = if passcode.is_empty() {
            None
        } else {
            Some(PasscodeDigest::new(passcode))
        };
        self.snapshot = snapshot.clone();
        self.save()
    }

    fn has_local_passcode(&self) -> bool {
        self.passcode.is_some()
    }
}
