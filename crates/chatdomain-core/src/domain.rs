//! Multi-account registry.
//!
//! [`Domain`] owns every account of one client installation. Once started it
//! keeps exactly one of them active, persists membership and order through a
//! [`DomainStorage`], and folds the unread counters of all live sessions into
//! a single badge.
//!
//! All methods run on the main loop. Deferred work (badge recomputation,
//! account writes, cleanup after a logout) goes through the injected
//! [`Scheduler`] and is coalesced with a pending flag, so any number of
//! triggers within one loop turn produce a single run.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use tracing::{debug, error, info, warn};

use crate::account::{Account, AccountIndex, AccountWithIndex};
use crate::network::{Environment, FallbackConfigs, NetworkConfig};
use crate::reactive::{EventStream, Events, Lifetime, Subscription};
use crate::scheduler::Scheduler;
use crate::session::Session;
use crate::storage::{
    AccountsSnapshot, DomainStorage, LoadedAccounts, StartError, StorageError, StoredAccount,
};

/// Services the registry needs from the application hosting it.
#[derive(Clone)]
pub struct Host {
    pub scheduler: Rc<dyn Scheduler>,
    pub fallback_configs: Rc<dyn FallbackConfigs>,
}

impl Host {
    pub fn new(scheduler: Rc<dyn Scheduler>, fallback_configs: Rc<dyn FallbackConfigs>) -> Self {
        Self {
            scheduler,
            fallback_configs,
        }
    }
}

struct AccountSlot {
    index: AccountIndex,
    account: Rc<Account>,
    /// Session watchers of this slot; dropped together with the slot.
    watch: Lifetime,
}

pub struct Domain {
    host: Host,
    storage: RefCell<Box<dyn DomainStorage>>,

    accounts: RefCell<Vec<AccountSlot>>,
    active: RefCell<Weak<Account>>,
    account_to_activate: Cell<Option<AccountIndex>>,
    active_lifetime: RefCell<Lifetime>,
    active_changes: EventStream<Rc<Account>>,
    active_sessions: EventStream<Option<Rc<Session>>>,

    unread_badge: Cell<u32>,
    unread_badge_muted: Cell<bool>,
    unread_badge_update_scheduled: Cell<bool>,
    unread_badge_changes: EventStream<()>,

    write_accounts_scheduled: Cell<bool>,
    passcode_removed: EventStream<()>,

    weak: Weak<Domain>,
}

impl Domain {
    pub fn new(storage: Box<dyn DomainStorage>, host: Host) -> Rc<Self> {
        Rc::new_cyclic(|weak| Self {
            host,
            storage: RefCell::new(storage),
            accounts: RefCell::new(Vec::new()),
            active: RefCell::new(Weak::new()),
            account_to_activate: Cell::new(None),
            active_lifetime: RefCell::new(Lifetime::new()),
            active_changes: EventStream::new(),
            active_sessions: EventStream::new(),
            unread_badge: Cell::new(0),
            unread_badge_muted: Cell::new(true),
            unread_badge_update_scheduled: Cell::new(false),
            unread_badge_changes: EventStream::new(),
            write_accounts_scheduled: Cell::new(false),
            passcode_removed: EventStream::new(),
            weak: weak.clone(),
        })
    }

    pub fn started(&self) -> bool {
        !self.accounts.borrow().is_empty()
    }

    /// Unlock storage and activate the stored (or first) account.
    ///
    /// On failure nothing is added and the registry stays not started, so the
    /// caller may retry with another passcode or reset.
    pub fn start(&self, passcode: &[u8]) -> Result<(), StartError> {
        assert!(!self.started(), "Domain::start called on a started domain");

        let loaded = self.storage.borrow_mut().start(passcode);
        match loaded {
            Ok(loaded) => {
                info!("Accounts domain started with {} accounts", loaded.accounts.len());
                self.install(loaded);
                self.activate_after_starting();
                Ok(())
            }
            Err(e) => {
                assert!(!self.started());
                warn!("Failed to start accounts domain: {}", e);
                Err(e)
            }
        }
    }

    /// Drop every account and return to the not-started state.
    pub fn finish(&self) {
        self.account_to_activate.set(None);
        *self.active.borrow_mut() = Weak::new();
        let active_lifetime = std::mem::take(&mut *self.active_lifetime.borrow_mut());
        let accounts = std::mem::take(&mut *self.accounts.borrow_mut());
        drop(active_lifetime);
        info!("Accounts domain finished, dropped {} accounts", accounts.len());
        drop(accounts);
    }

    /// Register a loaded account. A repeated index is a programming error.
    pub fn add_slot(&self, index: AccountIndex, account: Rc<Account>) {
        let mut accounts = self.accounts.borrow_mut();
        if accounts.iter().any(|slot| slot.index == index) {
            panic!("Repeated account index {}.", index);
        }
        accounts.push(AccountSlot {
            index,
            account,
            watch: Lifetime::new(),
        });
    }

    /// Remember which account to activate once started.
    pub fn record_pending_activation(&self, index: AccountIndex) {
        assert!(
            !self.started(),
            "Pending activation can only be recorded before start"
        );
        self.account_to_activate.set(Some(index));
    }

    /// Index storage should persist as the active one.
    pub fn active_for_storage(&self) -> Option<AccountIndex> {
        self.account_to_activate.get()
    }

    pub fn reset_with_forgotten_passcode(&self) {
        if !self.started() {
            info!("Resetting accounts domain from scratch");
            let loaded = self.storage.borrow_mut().start_from_scratch();
            self.install(loaded);
            self.activate_after_starting();
        } else {
            info!("Forgotten passcode, logging out every account");
            for account in self.account_handles() {
                account.log_out();
            }
        }
    }

    pub fn accounts(&self) -> Vec<AccountWithIndex> {
        self.accounts
            .borrow()
            .iter()
            .map(|slot| AccountWithIndex {
                index: slot.index,
                account: slot.account.clone(),
            })
            .collect()
    }

    /// The active account. Only valid once started.
    pub fn active(&self) -> Rc<Account> {
        assert!(self.started(), "Domain::active called before start");
        self.maybe_active()
            .unwrap_or_else(|| panic!("Started domain has no active account"))
    }

    pub fn maybe_active(&self) -> Option<Rc<Account>> {
        self.active.borrow().upgrade()
    }

    fn is_active(&self, account: &Account) -> bool {
        std::ptr::eq(self.active.borrow().as_ptr(), account)
    }

    pub fn active_changes(&self) -> Events<Rc<Account>> {
        self.active_changes.events()
    }

    /// Current active account (or `None` before start) right away, then every change.
    #[must_use = "dropping the subscription unsubscribes immediately"]
    pub fn active_value(&self, handler: impl Fn(&Option<Rc<Account>>) + 'static) -> Subscription {
        let handler: Rc<dyn Fn(&Option<Rc<Account>>)> = Rc::new(handler);
        handler(&self.maybe_active());
        self.active_changes
            .events()
            .subscribe(move |account| handler(&Some(account.clone())))
    }

    /// Session changes of whichever account is active at the time.
    pub fn active_session_changes(&self) -> Events<Option<Rc<Session>>> {
        self.active_sessions.events()
    }

    #[must_use = "dropping the subscription unsubscribes immediately"]
    pub fn active_session_value(
        &self,
        handler: impl Fn(&Option<Rc<Session>>) + 'static,
    ) -> Subscription {
        let current = self
            .maybe_active()
            .filter(|_| self.started())
            .and_then(|account| account.maybe_session());
        handler(&current);
        self.active_sessions.events().subscribe(handler)
    }

    pub fn unread_badge(&self) -> u32 {
        self.unread_badge.get()
    }

    pub fn unread_badge_muted(&self) -> bool {
        self.unread_badge_muted.get()
    }

    pub fn unread_badge_changes(&self) -> Events<()> {
        self.unread_badge_changes.events()
    }

    /// Fires after the last account logged out and the local passcode was cleared.
    pub fn passcode_removed(&self) -> Events<()> {
        self.passcode_removed.events()
    }

    /// Ask every live session to re-announce its badge.
    pub fn notify_unread_badge_changed(&self) {
        for account in self.account_handles() {
            if let Some(session) = account.maybe_session() {
                session.notify_unread_badge_changed();
            }
        }
    }

    pub fn schedule_update_unread_badge(&self) {
        if self.unread_badge_update_scheduled.replace(true) {
            return;
        }
        let weak = self.weak.clone();
        self.host.scheduler.postpone_call(Box::new(move || {
            if let Some(domain) = weak.upgrade() {
                domain.unread_badge_update_scheduled.set(false);
                domain.update_unread_badge();
            }
        }));
    }

    fn update_unread_badge(&self) {
        let mut total = 0u32;
        let mut muted = true;
        for account in self.account_handles() {
            if let Some(session) = account.maybe_session() {
                total = total.saturating_add(session.unread_badge());
                if !session.unread_badge_muted() {
                    muted = false;
                }
            }
        }
        self.unread_badge.set(total);
        self.unread_badge_muted.set(muted);
        debug!("Unread badge updated: {} (muted: {})", total, muted);
        self.unread_badge_changes.fire(&());
    }

    /// Create a new account for `environment`, cloning the closest matching config.
    pub fn add_account(&self, environment: Environment) -> Rc<Account> {
        assert!(self.started(), "Domain::add_account called before start");

        let config = self.config_for_new_account(environment);
        let index = self.free_index();
        let account = Rc::new(Account::new(index));
        self.accounts.borrow_mut().push(AccountSlot {
            index,
            account: account.clone(),
            watch: Lifetime::new(),
        });
        self.storage.borrow_mut().start_added(&account, config);
        self.watch_session(index, &account);

        info!("Added account {} ({})", index, environment);
        account
    }

    fn config_for_new_account(&self, environment: Environment) -> NetworkConfig {
        let active = self.active();
        if active.environment() == environment {
            return active.config();
        }
        let matching = self
            .accounts
            .borrow()
            .iter()
            .find(|slot| slot.account.environment() == environment)
            .map(|slot| slot.account.config());
        matching.unwrap_or_else(|| self.host.fallback_configs.fallback_config(environment))
    }

    fn free_index(&self) -> AccountIndex {
        let accounts = self.accounts.borrow();
        let mut index = 0;
        while accounts.iter().any(|slot| slot.index.0 == index) {
            index += 1;
        }
        AccountIndex(index)
    }

    pub fn activate(&self, account: &Rc<Account>) {
        if self.is_active(account) {
            return;
        }
        let index = self
            .accounts
            .borrow()
            .iter()
            .find(|slot| Rc::ptr_eq(&slot.account, account))
            .map(|slot| slot.index);
        let Some(index) = index else {
            panic!("Activating account {} that is not in the domain", account.index());
        };
        let changed = self.account_to_activate.get() != Some(index);

        let previous = std::mem::take(&mut *self.active_lifetime.borrow_mut());
        drop(previous);

        self.account_to_activate.set(Some(index));
        *self.active.borrow_mut() = Rc::downgrade(account);
        info!("Account {} is now active", index);
        self.active_changes.fire(account);

        let weak = self.weak.clone();
        let forward = account.session_value(move |session| {
            if let Some(domain) = weak.upgrade() {
                domain.active_sessions.fire(session);
            }
        });
        self.active_lifetime.borrow_mut().add(forward);

        if changed {
            self.schedule_write_accounts();
        }
    }

    /// Drop every account that is neither active nor logged in.
    pub fn remove_redundant_accounts(&self) {
        assert!(
            self.started(),
            "Domain::remove_redundant_accounts called before start"
        );

        let was = self.accounts.borrow().len();
        self.activate_authed_account();

        let active = self.active.borrow().as_ptr();
        let removed = {
            let mut accounts = self.accounts.borrow_mut();
            let mut removed = Vec::new();
            let mut i = 0;
            while i < accounts.len() {
                let slot = &accounts[i];
                if std::ptr::eq(Rc::as_ptr(&slot.account), active)
                    || slot.account.session_exists()
                {
                    i += 1;
                    continue;
                }
                self.check_for_last_config(&accounts, i);
                removed.push(accounts.remove(i));
            }
            removed
        };
        for slot in &removed {
            info!("Removed account {}", slot.index);
        }
        drop(removed);

        let now = self.accounts.borrow().len();
        if !self.remove_passcode_if_empty() && now != was {
            self.schedule_write_accounts();
        }
    }

    /// Clear the local passcode once the only remaining account has logged out.
    pub fn remove_passcode_if_empty(&self) -> bool {
        let single_logged_out = {
            let accounts = self.accounts.borrow();
            accounts.len() == 1 && !accounts[0].account.session_exists()
        };
        if !single_logged_out || !self.storage.borrow().has_local_passcode() {
            return false;
        }

        info!("Last account logged out, removing local passcode");
        let snapshot = self.snapshot();
        let result = self.storage.borrow_mut().set_passcode(&[], &snapshot);
        if let Err(e) = result {
            error!("Failed to clear local passcode: {}", e);
        }
        self.passcode_removed.fire(&());
        true
    }

    /// Protect the stored accounts with `passcode`; empty removes the lock.
    pub fn set_passcode(&self, passcode: &[u8]) -> Result<(), StorageError> {
        let snapshot = self.snapshot();
        self.storage.borrow_mut().set_passcode(passcode, &snapshot)
    }

    pub fn has_local_passcode(&self) -> bool {
        self.storage.borrow().has_local_passcode()
    }

    pub fn schedule_write_accounts(&self) {
        if self.write_accounts_scheduled.replace(true) {
            return;
        }
        let weak = self.weak.clone();
        self.host.scheduler.on_main(Box::new(move || {
            if let Some(domain) = weak.upgrade() {
                domain.write_accounts_scheduled.set(false);
                domain.write_accounts();
            }
        }));
    }

    fn write_accounts(&self) {
        if !self.started() {
            debug!("Skipping accounts write, domain is not started");
            return;
        }
        let snapshot = self.snapshot();
        debug!(
            "Writing {} accounts (active: {:?})",
            snapshot.accounts.len(),
            snapshot.active
        );
        let result = self.storage.borrow_mut().write_accounts(&snapshot);
        if let Err(e) = result {
            error!("Failed to write accounts: {}", e);
        }
    }

    fn snapshot(&self) -> AccountsSnapshot {
        AccountsSnapshot {
            active: self.active_for_storage(),
            accounts: self
                .accounts
                .borrow()
                .iter()
                .map(|slot| StoredAccount::from_account(&slot.account))
                .collect(),
        }
    }

    fn install(&self, loaded: LoadedAccounts) {
        if let Some(index) = loaded.active {
            self.record_pending_activation(index);
        }
        for AccountWithIndex { index, account } in loaded.accounts {
            self.add_slot(index, account);
        }
    }

    fn activate_after_starting(&self) {
        assert!(self.started(), "Activating before any account was added");

        let accounts = self.accounts();
        let pending = self.account_to_activate.get();
        let to_activate = accounts
            .iter()
            .find(|slot| Some(slot.index) == pending)
            .or_else(|| accounts.first())
            .map(|slot| slot.account.clone());

        for slot in &accounts {
            self.watch_session(slot.index, &slot.account);
        }
        if let Some(account) = to_activate {
            self.activate(&account);
        }
        self.remove_passcode_if_empty();
    }

    fn activate_authed_account(&self) {
        assert!(self.started());

        if self.maybe_active().is_some_and(|active| active.session_exists()) {
            return;
        }
        let authed = self
            .accounts
            .borrow()
            .iter()
            .find(|slot| slot.account.session_exists())
            .map(|slot| slot.account.clone());
        if let Some(account) = authed {
            self.activate(&account);
        }
    }

    fn watch_session(&self, index: AccountIndex, account: &Rc<Account>) {
        let mut watch = Lifetime::new();

        let weak = self.weak.clone();
        watch.add(account.session_value(move |session| {
            let Some(session) = session else {
                return;
            };
            let weak = weak.clone();
            session.attach(session.unread_badge_changes().subscribe(move |_| {
                if let Some(domain) = weak.upgrade() {
                    domain.schedule_update_unread_badge();
                }
            }));
        }));

        let weak = self.weak.clone();
        let watched = Rc::downgrade(account);
        watch.add(account.session_changes().subscribe(move |session| {
            let Some(domain) = weak.upgrade() else {
                return;
            };
            if session.is_some() {
                domain.schedule_write_accounts();
                return;
            }
            domain.schedule_update_unread_badge();
            if let Some(account) = watched.upgrade() {
                if domain.is_active(&account) {
                    domain.activate_authed_account();
                }
            }
            let weak = weak.clone();
            domain.host.scheduler.on_main(Box::new(move || {
                if let Some(domain) = weak.upgrade() {
                    if domain.started() {
                        domain.remove_redundant_accounts();
                    }
                }
            }));
            // Queued after the cleanup so the written snapshot is post-removal.
            domain.schedule_write_accounts();
        }));

        let replaced = {
            let mut accounts = self.accounts.borrow_mut();
            accounts
                .iter_mut()
                .find(|slot| slot.index == index)
                .map(|slot| std::mem::replace(&mut slot.watch, watch))
        };
        drop(replaced);
    }

    fn check_for_last_config(&self, accounts: &[AccountSlot], position: usize) {
        let account = &accounts[position].account;
        let environment = account.environment();
        let shared = accounts
            .iter()
            .enumerate()
            .any(|(i, slot)| i != position && slot.account.environment() == environment);
        if !shared {
            self.host
                .fallback_configs
                .refresh_fallback_config(&account.config());
        }
    }

    fn account_handles(&self) -> Vec<Rc<Account>> {
        self.accounts
            .borrow()
            .iter()
            .map(|slot| slot.account.clone())
            .collect()
    }
}
