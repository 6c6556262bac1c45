//! Per-account network configuration and the host-wide fallback configs.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::constants::{BUILTIN_CONFIG_VERSION, PRODUCTION_DC_OPTIONS, TEST_DC_OPTIONS};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Production,
    Test,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Production => "production",
            Environment::Test => "test",
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "production" | "prod" => Ok(Environment::Production),
            "test" => Ok(Environment::Test),
            other => Err(format!("unknown environment: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DcOption {
    pub id: u32,
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub environment: Environment,
    pub dc_options: Vec<DcOption>,
    pub version: u32,
}

impl NetworkConfig {
    /// Built-in defaults for `environment`.
    pub fn new(environment: Environment) -> Self {
        let builtin = match environment {
            Environment::Production => PRODUCTION_DC_OPTIONS,
            Environment::Test => TEST_DC_OPTIONS,
        };
        Self {
            environment,
            dc_options: builtin
                .iter()
                .map(|&(id, host, port)| DcOption {
                    id,
                    host: host.to_string(),
                    port,
                })
                .collect(),
            version: BUILTIN_CONFIG_VERSION,
        }
    }

    pub fn environment(&self) -> Environment {
        self.environment
    }
}

/// Host-provided configs used when a new account has nobody to clone a config from.
pub trait FallbackConfigs {
    fn fallback_config(&self, environment: Environment) -> NetworkConfig;

    /// Remember `config` as the fallback for its environment.
    fn refresh_fallback_config(&self, config: &NetworkConfig);
}

/// In-memory [`FallbackConfigs`]; yields built-in defaults for environments it
/// has not seen a config for.
#[derive(Debug, Default)]
pub struct FallbackConfigStore {
    configs: RefCell<HashMap<Environment, NetworkConfig>>,
}

impl FallbackConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stored(&self, environment: Environment) -> Option<NetworkConfig> {
        self.configs.borrow().get(&environment).cloned()
    }
}

impl FallbackConfigs for FallbackConfigStore {
    fn fallback_config(&self, environment: Environment) -> NetworkConfig {
        self.stored(environment)
            .unwrap_or_else(|| NetworkConfig::new(environment))
    }

    fn refresh_fallback_config(&self, config: &NetworkConfig) {
        tracing::debug!(
            "Refreshing fallback {} config (version {})",
            config.environment,
            config.version
        );
        self.configs
            .borrow_mut()
            .insert(config.environment, config.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_configs_match_environment() {
        let production = NetworkConfig::new(Environment::Production);
        let test = NetworkConfig::new(Environment::Test);

        assert_eq!(production.environment(), Environment::Production);
        assert_eq!(test.environment(), Environment::Test);
        assert_eq!(production.dc_options.len(), PRODUCTION_DC_OPTIONS.len());
        assert_ne!(production.dc_options, test.dc_options);
    }

    #[test]
    fn test_fallback_store_defaults_then_refreshes() {
        let store = FallbackConfigStore::new();
        assert_eq!(
            store.fallback_config(Environment::Production),
            NetworkConfig::new(Environment::Production)
        );

        let mut pushed = NetworkConfig::new(Environment::Production);
        pushed.version = 12;
        store.refresh_fallback_config(&pushed);

        assert_eq!(store.fallback_config(Environment::Production).version, 12);
        assert!(store.stored(Environment::Test).is_none());
    }

    #[test]
    fn test_environment_parse() {
        assert_eq!("Production".parse::<Environment>(), Ok(Environment::Production));
        assert_eq!("test".parse::<Environment>(), Ok(Environment::Test));
        assert!("staging".parse::<Environment>().is_err());
    }
}
