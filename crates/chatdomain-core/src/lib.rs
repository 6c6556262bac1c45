pub mod account;
pub mod config;
pub mod constants;
pub mod domain;
pub mod network;
pub mod reactive;
pub mod scheduler;
pub mod session;
pub mod storage;

// Re-export the registry surface at crate root for convenience
pub use account::{Account, AccountIndex, AccountWithIndex};
pub use config::CoreConfig;
pub use domain::{Domain, Host};
pub use network::{DcOption, Environment, FallbackConfigStore, FallbackConfigs, NetworkConfig};
pub use reactive::{EventStream, Events, Lifetime, Subscription, Variable};
pub use scheduler::{MainLoop, Scheduler, Task};
pub use session::{Session, UserId};
pub use storage::{
    AccountsSnapshot, DomainStorage, FileStorage, LoadedAccounts, MemoryStorage, StartError,
    StorageError, StoredAccount,
};
