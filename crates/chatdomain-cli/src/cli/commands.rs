use std::rc::Rc;

use anyhow::{anyhow, Context, Result};
use chatdomain_core::{
    Account, AccountIndex, CoreConfig, Domain, Environment, FallbackConfigStore, FileStorage,
    Host, MainLoop, UserId,
};
use serde::Serialize;
use tracing::info;

/// One invocation of the CLI against the accounts file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Print the registry without changing it
    List,
    /// Add an account for an environment
    Add { environment: Environment },
    /// Make the account at an index the active one
    Activate { index: u32 },
    /// Establish a session for a user on an account
    Login { index: u32, user_id: UserId },
    /// End the session of an account
    Logout { index: u32 },
    /// Lock the accounts file; an empty passcode removes the lock
    SetPasscode { passcode: String },
    /// Forgotten passcode: start over with a single fresh account
    Reset,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountReport {
    pub index: u32,
    pub environment: Environment,
    pub active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<UserId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

/// What the registry looks like after a command ran.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainReport {
    pub accounts_path: String,
    pub active: Option<u32>,
    pub unread_badge: u32,
    pub unread_badge_muted: bool,
    pub has_passcode: bool,
    pub accounts: Vec<AccountReport>,
}

impl DomainReport {
    fn from_domain(domain: &Domain, accounts_path: String) -> Self {
        let active = domain.maybe_active();
        let accounts = domain
            .accounts()
            .into_iter()
            .map(|slot| {
                let session = slot.account.maybe_session();
                AccountReport {
                    index: slot.index.0,
                    environment: slot.account.environment(),
                    active: active
                        .as_ref()
                        .is_some_and(|active| Rc::ptr_eq(active, &slot.account)),
                    user_id: session.as_ref().map(|s| s.user_id()),
                    session_id: session.as_ref().map(|s| s.id().to_string()),
                }
            })
            .collect();

        Self {
            accounts_path,
            active: active.map(|account| account.index().0),
            unread_badge: domain.unread_badge(),
            unread_badge_muted: domain.unread_badge_muted(),
            has_passcode: domain.has_local_passcode(),
            accounts,
        }
    }
}

/// Open the accounts at `config`, apply `command`, persist and report.
pub fn run(command: &Command, config: &CoreConfig, passcode: &str) -> Result<DomainReport> {
    let main_loop = MainLoop::new();
    let host = Host::new(main_loop.handle(), Rc::new(FallbackConfigStore::new()));
    let storage = FileStorage::new(config);
    let accounts_path = storage.path().display().to_string();
    let domain = Domain::new(Box::new(storage), host);

    if *command == Command::Reset {
        domain.reset_with_forgotten_passcode();
    } else {
        domain
            .start(passcode.as_bytes())
            .with_context(|| format!("Failed to open accounts at {}", accounts_path))?;
        apply(&domain, command)?;
    }

    domain.notify_unread_badge_changed();
    domain.schedule_write_accounts();
    let ran = main_loop.run_until_idle();
    info!("Ran {} deferred tasks", ran);

    Ok(DomainReport::from_domain(&domain, accounts_path))
}

fn apply(domain: &Domain, command: &Command) -> Result<()> {
    match command {
        Command::List | Command::Reset => {}
        Command::Add { environment } => {
            let account = domain.add_account(*environment);
            info!("Added account {}", account.index());
        }
        Command::Activate { index } => {
            let account = account_at(domain, *index)?;
            domain.activate(&account);
        }
        Command::Login { index, user_id } => {
            account_at(domain, *index)?.log_in(*user_id);
        }
        Command::Logout { index } => {
            account_at(domain, *index)?.log_out();
        }
        Command::SetPasscode { passcode } => {
            domain
                .set_passcode(passcode.as_bytes())
                .context("Failed to update passcode")?;
        }
    }
    Ok(())
}

fn account_at(domain: &Domain, index: u32) -> Result<Rc<Account>> {
    domain
        .accounts()
        .into_iter()
        .find(|slot| slot.index == AccountIndex(index))
        .map(|slot| slot.account)
        .ok_or_else(|| anyhow!("No account with index {}", index))
}
