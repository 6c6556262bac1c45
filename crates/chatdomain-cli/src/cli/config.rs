use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chatdomain_core::CoreConfig;
use serde::{Deserialize, Serialize};

/// CLI configuration that can be loaded from a JSON file
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct CliConfig {
    /// Directory holding per-installation data folders
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,

    /// Name of the data folder inside `dataDir`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_name: Option<String>,
}

impl CliConfig {
    /// Load config from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: CliConfig = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        Ok(config)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("Failed to deserialize config")
    }

    /// Overlay the values set in this file on top of `base`.
    pub fn apply(&self, base: CoreConfig) -> CoreConfig {
        let mut config = base;
        if let Some(dir) = &self.data_dir {
            config.data_dir = dir.clone();
        }
        if let Some(name) = &self.data_name {
            config.data_name = name.clone();
        }
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_config_with_data_dir() {
        let json = r#"{"dataDir": "/tmp/chatdomain-test", "dataName": "work"}"#;
        let config = CliConfig::from_json(json).unwrap();
        assert_eq!(config.data_dir, Some(PathBuf::from("/tmp/chatdomain-test")));
        assert_eq!(config.data_name.as_deref(), Some("work"));
    }

    #[test]
    fn test_parse_config_minimal() {
        let config = CliConfig::from_json("{}").unwrap();
        assert!(config.data_dir.is_none());
        assert!(config.data_name.is_none());
    }

    #[test]
    fn test_apply_overrides_only_set_fields() {
        let base = CoreConfig::new("/var/lib/chatdomain");
        let config = CliConfig {
            data_dir: None,
            data_name: Some("alt".to_string()),
        };

        let applied = config.apply(base);
        assert_eq!(applied.data_dir, PathBuf::from("/var/lib/chatdomain"));
        assert_eq!(applied.data_name, "alt");
    }

    #[test]
    fn test_load_reports_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = CliConfig::load(&dir.path().join("missing.json")).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
