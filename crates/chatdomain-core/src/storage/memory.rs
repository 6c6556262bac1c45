use std::cell::RefCell;
use std::rc::Rc;

use super::{AccountsSnapshot, DomainStorage, LoadedAccounts, StartError, StorageError};
use crate::account::{Account, AccountIndex};
use crate::network::NetworkConfig;

#[derive(Default)]
struct MemoryState {
    snapshot: AccountsSnapshot,
    passcode: Option<Vec<u8>>,
    corrupt: Option<String>,
    writes: Vec<AccountsSnapshot>,
    added: Vec<AccountIndex>,
}

/// Storage kept in process memory. Clones share state, so a host (or a test)
/// can keep a handle after boxing one into the registry.
#[derive(Clone, Default)]
pub struct MemoryStorage {
    state: Rc<RefCell<MemoryState>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_accounts(snapshot: AccountsSnapshot) -> Self {
        let storage = Self::new();
        storage.state.borrow_mut().snapshot = snapshot;
        storage
    }

    pub fn with_passcode(self, passcode: &[u8]) -> Self {
        self.state.borrow_mut().passcode = Some(passcode.to_vec());
        self
    }

    /// Make every following `start` fail as if the stored data were unreadable.
    pub fn corrupted(self, reason: impl Into<String>) -> Self {
        self.state.borrow_mut().corrupt = Some(reason.into());
        self
    }

    pub fn snapshot(&self) -> AccountsSnapshot {
        self.state.borrow().snapshot.clone()
    }

    pub fn passcode(&self) -> Option<Vec<u8>> {
        self.state.borrow().passcode.clone()
    }

    /// Every snapshot handed to `write_accounts`, oldest first.
    pub fn writes(&self) -> Vec<AccountsSnapshot> {
        self.state.borrow().writes.clone()
    }

    pub fn added(&self) -> Vec<AccountIndex> {
        self.state.borrow().added.clone()
    }
}

impl DomainStorage for MemoryStorage {
    fn start(&mut self, passcode: &[u8]) -> Result<LoadedAccounts, StartError> {
        let snapshot = {
            let state = self.state.borrow();
            if let Some(reason) = &state.corrupt {
                return Err(StartError::Corrupt {
                    location: "memory".to_string(),
                    reason: reason.clone(),
                });
            }
            if let Some(expected) = &state.passcode {
                if expected.as_slice() != passcode {
                    return Err(StartError::IncorrectPasscode);
                }
            }
            state.snapshot.clone()
        };

        if snapshot.accounts.is_empty() {
            return Ok(self.start_from_scratch());
        }
        Ok(snapshot.into_loaded())
    }

    fn start_from_scratch(&mut self) -> LoadedAccounts {
        let snapshot = AccountsSnapshot::scratch();
        {
            let mut state = self.state.borrow_mut();
            state.snapshot = snapshot.clone();
            state.passcode = None;
            state.corrupt = None;
        }
        snapshot.into_loaded()
    }

    fn start_added(&mut self, account: &Account, config: NetworkConfig) {
        self.state.borrow_mut().added.push(account.index());
        account.start(config);
    }

    fn write_accounts(&mut self, snapshot: &AccountsSnapshot) -> Result<(), StorageError> {
        let mut state = self.state.borrow_mut();
        state.snapshot = snapshot.clone();
        state.writes.push(snapshot.clone());
        Ok(())
    }

    fn set_passcode(
        &mut self,
        passcode: &[u8],
        snapshot: &AccountsSnapshot,
    ) -> Result<(), StorageError> {
        let mut state = self.state.borrow_mut();
        state.passcode = (!passcode.is_empty()).then(|| passcode.to_vec());
        state.snapshot = snapshot.clone();
        Ok(())
    }

    fn has_local_passcode(&self) -> bool {
        self.state.borrow().passcode.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_memory_storage_starts_from_scratch() {
        let mut storage = MemoryStorage::new();
        let loaded = storage.start(b"").unwrap();
        assert_eq!(loaded.accounts.len(), 1);
        assert_eq!(storage.snapshot(), AccountsSnapshot::scratch());
    }

    #[test]
    fn test_corrupted_start_reports_memory_location() {
        let mut storage = MemoryStorage::new().corrupted("unreadable");
        match storage.start(b"") {
            Err(StartError::Corrupt { location, reason }) => {
                assert_eq!(location, "memory");
                assert_eq!(reason, "unreadable");
            }
            other => panic!("expected Corrupt, got {:?}", other.map(|l| l.accounts.len())),
        }
    }

    #[test]
    fn test_clones_share_state() {
        let storage = MemoryStorage::new().with_passcode(b"pin");
        let mut boxed: Box<dyn DomainStorage> = Box::new(storage.clone());

        assert!(matches!(boxed.start(b"nope"), Err(StartError::IncorrectPasscode)));
        boxed.set_passcode(b"", &AccountsSnapshot::default()).unwrap();

        assert!(storage.passcode().is_none());
        assert!(!storage.has_local_passcode());
    }
}
