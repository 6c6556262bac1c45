//! Application-wide constants
//!
//! File names, format versions and built-in network defaults shared by the
//! storage adapters and the network configuration.

/// Directory created under the platform data dir when no data dir is configured
pub const APP_DIR_NAME: &str = "chatdomain";

/// Default data name: one client installation keeps its accounts under `<data_dir>/<data_name>`
pub const DEFAULT_DATA_NAME: &str = "data";

/// Accounts file written by `FileStorage`
pub const ACCOUNTS_FILE_NAME: &str = "accounts.json";

/// Increment whenever the on-disk accounts layout changes incompatibly.
/// Files with a different version are rejected as corrupt.
pub const ACCOUNTS_SCHEMA_VERSION: u32 = 1;

/// Version stamped on built-in network configs; servers push newer ones
pub const BUILTIN_CONFIG_VERSION: u32 = 0;

// Built-in datacenter addresses: (dc id, host, port)
pub const PRODUCTION_DC_OPTIONS: &[(u32, &str, u16)] = &[
    (1, "149.154.175.53", 443),
    (2, "149.154.167.51", 443),
    (3, "149.154.175.100", 443),
    (4, "149.154.167.91", 443),
    (5, "91.108.56.130", 443),
];

pub const TEST_DC_OPTIONS: &[(u32, &str, u16)] = &[
    (1, "149.154.175.10", 443),
    (2, "149.154.167.40", 443),
    (3, "149.154.175.117", 443),
];

// Environment variables read by `CoreConfig::from_env`
pub mod env {
    pub const DATA_DIR: &str = "CHATDOMAIN_DATA_DIR";
    pub const DATA_NAME: &str = "CHATDOMAIN_DATA_NAME";
}
