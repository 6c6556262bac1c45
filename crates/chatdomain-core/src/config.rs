use std::path::{Path, PathBuf};

use crate::constants::{self, ACCOUNTS_FILE_NAME, APP_DIR_NAME, DEFAULT_DATA_NAME};

/// Where one client installation keeps its accounts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoreConfig {
    pub data_dir: PathBuf,
    pub data_name: String,
}

impl CoreConfig {
    pub fn new<P: AsRef<Path>>(data_dir: P) -> Self {
        Self {
            data_dir: data_dir.as_ref().to_path_buf(),
            data_name: DEFAULT_DATA_NAME.to_string(),
        }
    }

    pub fn with_data_name(mut self, data_name: impl Into<String>) -> Self {
        self.data_name = data_name.into();
        self
    }

    /// Defaults overridden by `CHATDOMAIN_DATA_DIR` / `CHATDOMAIN_DATA_NAME` when set.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(dir) = std::env::var_os(constants::env::DATA_DIR).filter(|v| !v.is_empty()) {
            config.data_dir = PathBuf::from(dir);
        }
        if let Ok(name) = std::env::var(constants::env::DATA_NAME) {
            if !name.trim().is_empty() {
                config.data_name = name.trim().to_string();
            }
        }
        config
    }

    pub fn accounts_path(&self) -> PathBuf {
        self.data_dir.join(&self.data_name).join(ACCOUNTS_FILE_NAME)
    }
}

impl Default for CoreConfig {
    fn default() -> Self {
        let base = dirs::data_dir().unwrap_or_else(|| PathBuf::from("."));
        Self::new(base.join(APP_DIR_NAME))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accounts_path_uses_data_name() {
        let config = CoreConfig::new("/tmp/chatdomain-test").with_data_name("work");
        assert_eq!(
            config.accounts_path(),
            PathBuf::from("/tmp/chatdomain-test/work/accounts.json")
        );
    }

    #[test]
    fn test_default_data_name() {
        let config = CoreConfig::new("/tmp/x");
        assert_eq!(config.data_name, "data");
    }
}
