use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::network::{Environment, NetworkConfig};
use crate::reactive::{Events, Subscription, Variable};
use crate::session::{Session, UserId};

/// Stable per-installation account number. Indices are never reused while the
/// account exists; freed indices are handed out again to new accounts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountIndex(pub u32);

impl fmt::Display for AccountIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One logged-in (or logged-out) account of the client.
pub struct Account {
    index: AccountIndex,
    config: RefCell<NetworkConfig>,
    session: Variable<Option<Rc<Session>>>,
}

impl Account {
    pub fn new(index: AccountIndex) -> Self {
        Self {
            index,
            config: RefCell::new(NetworkConfig::new(Environment::Production)),
            session: Variable::new(None),
        }
    }

    pub fn index(&self) -> AccountIndex {
        self.index
    }

    pub fn start(&self, config: NetworkConfig) {
        tracing::debug!(
            "Starting account {} in {} environment",
            self.index,
            config.environment
        );
        *self.config.borrow_mut() = config;
    }

    pub fn config(&self) -> NetworkConfig {
        self.config.borrow().clone()
    }

    pub fn environment(&self) -> Environment {
        self.config.borrow().environment
    }

    /// Establish a session for `user_id`. Logging in again as the same user
    /// keeps the existing session; a different user replaces it.
    pub fn log_in(&self, user_id: UserId) -> Rc<Session> {
        if let Some(existing) = self.maybe_session() {
            if existing.user_id() == user_id {
                return existing;
            }
            self.log_out();
        }
        let session = Rc::new(Session::new(user_id));
        tracing::info!(
            "Account {} logged in as {} (session {})",
            self.index,
            user_id,
            session.id()
        );
        self.session.set(Some(session.clone()));
        session
    }

    pub fn log_out(&self) {
        let Some(session) = self.session.current() else {
            return;
        };
        tracing::info!("Account {} logged out (session {})", self.index, session.id());
        self.session.set(None);
        session.destroy();
    }

    pub fn session_exists(&self) -> bool {
        self.session.current().is_some()
    }

    /// The live session. Callers must check [`Account::session_exists`] first.
    pub fn session(&self) -> Rc<Session> {
        self.maybe_session()
            .unwrap_or_else(|| panic!("Account {} has no session", self.index))
    }

    pub fn maybe_session(&self) -> Option<Rc<Session>> {
        self.session.current()
    }

    /// Current session (or `None`) right away, then every change.
    #[must_use = "dropping the subscription unsubscribes immediately"]
    pub fn session_value(
        &self,
        handler: impl Fn(&Option<Rc<Session>>) + 'static,
    ) -> Subscription {
        self.session.value(handler)
    }

    pub fn session_changes(&self) -> Events<Option<Rc<Session>>> {
        self.session.changes()
    }
}

impl fmt::Debug for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Account")
            .field("index", &self.index)
            .field("environment", &self.environment())
            .field("session", &self.maybe_session())
            .finish()
    }
}

/// An account together with the index the registry tracks it under.
#[derive(Debug, Clone)]
pub struct AccountWithIndex {
    pub index: AccountIndex,
    pub account: Rc<Account>,
}
