//! Configuration management for the abuse filter engine
//!
//! Per-wiki consequence policy is loaded from a TOML file, overridden from the
//! environment and validated before the engine is built from it.

use crate::error::{AbuseFilterError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

mod validator;

pub use validator::ConfigValidator;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(rename = "_meta")]
    pub meta: MetaConfig,
    pub storage: StorageConfig,
    pub wiki: WikiConfig,
    pub consequences: ConsequencesConfig,
    pub block: BlockConfig,
    pub range_block: RangeBlockConfig,
    pub autopromote: AutopromoteConfig,
    pub throttle: ThrottleConfig,
    pub groups: GroupsConfig,
    pub filter_user: FilterUserConfig,
}

/// Metadata about the configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetaConfig {
    pub schema_version: String,
    #[serde(default = "current_timestamp")]
    pub created_at: String,
    #[serde(default = "current_timestamp")]
    pub last_modified: String,
}

fn current_timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
    /// Variable dumps at least this large are zstd-compressed
    pub compression_threshold: usize,
}

/// Identity of this wiki and of the central wiki hosting global filters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WikiConfig {
    pub wiki_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub central_wiki: Option<String>,
}

/// Which consequences exist on this wiki and how global filters may use them
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsequencesConfig {
    /// Consequence name -> enabled on this wiki
    pub enabled: BTreeMap<String, bool>,
    /// Consequences that can alter account state or access
    pub dangerous: Vec<String>,
    /// Consequences stripped from global filters on this wiki
    #[serde(default)]
    pub locally_disabled_global_actions: Vec<String>,
    /// Consequences an administratively throttled filter may still take
    pub throttled_safe_actions: Vec<String>,
}

/// Default block durations used when a filter declares `block` without parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockConfig {
    pub anon_duration: String,
    pub user_duration: String,
}

/// CIDR sizing for range blocks
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RangeBlockConfig {
    pub ipv4_prefix: u8,
    pub ipv6_prefix: u8,
    /// Widest ranges the block store accepts
    pub core_ipv4_limit: u8,
    pub core_ipv6_limit: u8,
    pub duration: String,
}

/// Autopromotion block settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutopromoteConfig {
    pub block_days: u32,
}

/// Throttle grouping settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThrottleConfig {
    /// Prefix used for the `range` throttle group
    pub range_ipv4_prefix: u8,
    pub range_ipv6_prefix: u8,
}

/// Group membership settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupsConfig {
    /// Groups every user holds implicitly and that degroup never touches
    pub implicit: Vec<String>,
}

/// System account that performs every side effect
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterUserConfig {
    pub name: String,
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(AbuseFilterError::ConfigNotFound {
                path: path.to_path_buf(),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| AbuseFilterError::Io {
            source: e,
            context: format!("Failed to read config file: {:?}", path),
        })?;
        let mut config: Config = toml::from_str(&content)?;

        config.apply_env_overrides();

        ConfigValidator::validate(&config)?;

        Ok(config)
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| AbuseFilterError::Io {
                source: e,
                context: format!("Failed to create config directory: {:?}", parent),
            })?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|e| AbuseFilterError::Io {
            source: e,
            context: format!("Failed to write config file: {:?}", path),
        })?;
        Ok(())
    }

    /// Apply environment variable overrides
    /// Environment variables in format: ABUSEFILTER_SECTION__KEY=value
    pub fn apply_env_overrides(&mut self) {
        for (key, value) in std::env::vars() {
            if let Some(config_key) = key.strip_prefix("ABUSEFILTER_") {
                if let Err(e) = self.set_value_from_env(config_key, &value) {
                    tracing::warn!("Failed to apply env override {}: {}", key, e);
                }
            }
        }
    }

    fn set_value_from_env(&mut self, path: &str, value: &str) -> Result<()> {
        match path {
            "WIKI__WIKI_ID" => {
                self.wiki.wiki_id = value.to_string();
            }
            "BLOCK__ANON_DURATION" => {
                self.block.anon_duration = value.to_string();
            }
            "BLOCK__USER_DURATION" => {
                self.block.user_duration = value.to_string();
            }
            "FILTER_USER__NAME" => {
                self.filter_user.name = value.to_string();
            }
            "AUTOPROMOTE__BLOCK_DAYS" => {
                self.autopromote.block_days =
                    value
                        .parse()
                        .map_err(|_| AbuseFilterError::InvalidConfigValue {
                            path: path.to_string(),
                            message: format!("Cannot parse '{}' as a number of days", value),
                        })?;
            }
            "CONSEQUENCES__LOCALLY_DISABLED_GLOBAL_ACTIONS" => {
                self.consequences.locally_disabled_global_actions = split_list(value);
            }
            _ => {
                tracing::debug!("Unknown env config key: {}", path);
            }
        }
        Ok(())
    }

    /// Get the default configuration file path
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir().ok_or_else(|| {
            AbuseFilterError::Config("Cannot determine config directory".to_string())
        })?;

        Ok(config_dir.join("abusefilter").join("config.toml"))
    }

    /// Data directory with a leading `~` expanded
    pub fn resolved_data_dir(&self) -> Result<PathBuf> {
        match self.storage.data_dir.strip_prefix("~") {
            Ok(rest) => {
                let home_dir = dirs::home_dir().ok_or_else(|| {
                    AbuseFilterError::Config("Cannot determine home directory".to_string())
                })?;
                Ok(home_dir.join(rest))
            }
            Err(_) => Ok(self.storage.data_dir.clone()),
        }
    }

    /// Wiki that hosts a filter, given whether the filter is global
    pub fn hosting_wiki(&self, global: bool) -> Option<&str> {
        if global {
            self.wiki.central_wiki.as_deref()
        } else {
            None
        }
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

impl Default for Config {
    fn default() -> Self {
        let enabled = [
            ("warn", true),
            ("disallow", true),
            ("block", true),
            ("rangeblock", false),
            ("degroup", false),
            ("tag", true),
            ("throttle", true),
            ("blockautopromote", true),
        ]
        .into_iter()
        .map(|(name, on)| (name.to_string(), on))
        .collect();

        Self {
            meta: MetaConfig {
                schema_version: "1.0.0".to_string(),
                created_at: current_timestamp(),
                last_modified: current_timestamp(),
            },
            storage: StorageConfig {
                data_dir: PathBuf::from("~/.abusefilter"),
                compression_threshold: 1024,
            },
            wiki: WikiConfig {
                wiki_id: "localwiki".to_string(),
                central_wiki: None,
            },
            consequences: ConsequencesConfig {
                enabled,
                dangerous: vec![
                    "block".to_string(),
                    "rangeblock".to_string(),
                    "degroup".to_string(),
                    "blockautopromote".to_string(),
                ],
                locally_disabled_global_actions: Vec::new(),
                throttled_safe_actions: vec!["tag".to_string()],
            },
            block: BlockConfig {
                anon_duration: "24 hours".to_string(),
                user_duration: "indefinite".to_string(),
            },
            range_block: RangeBlockConfig {
                ipv4_prefix: 16,
                ipv6_prefix: 19,
                core_ipv4_limit: 16,
                core_ipv6_limit: 19,
                duration: "1 week".to_string(),
            },
            autopromote: AutopromoteConfig { block_days: 5 },
            throttle: ThrottleConfig {
                range_ipv4_prefix: 16,
                range_ipv6_prefix: 64,
            },
            groups: GroupsConfig {
                implicit: vec![
                    "*".to_string(),
                    "user".to_string(),
                    "autoconfirmed".to_string(),
                ],
            },
            filter_user: FilterUserConfig {
                name: "Abuse filter".to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_save_and_load_roundtrip() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("conf").join("config.toml");

        let mut config = Config::default();
        config.wiki.central_wiki = Some("metawiki".to_string());
        config.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.wiki.central_wiki.as_deref(), Some("metawiki"));
        assert_eq!(loaded.consequences.throttled_safe_actions, vec!["tag"]);
    }

    #[test]
    fn test_missing_file() {
        let temp_dir = TempDir::new().unwrap();
        let result = Config::load(&temp_dir.path().join("nope.toml"));
        assert!(matches!(
            result,
            Err(AbuseFilterError::ConfigNotFound { .. })
        ));
    }

    #[test]
    fn test_env_override_list() {
        let mut config = Config::default();
        config
            .set_value_from_env(
                "CONSEQUENCES__LOCALLY_DISABLED_GLOBAL_ACTIONS",
                "block, degroup,,",
            )
            .unwrap();
        assert_eq!(
            config.consequences.locally_disabled_global_actions,
            vec!["block", "degroup"]
        );
    }

    #[test]
    fn test_env_override_rejects_bad_number() {
        let mut config = Config::default();
        assert!(config
            .set_value_from_env("AUTOPROMOTE__BLOCK_DAYS", "soon")
            .is_err());
    }

    #[test]
    fn test_apply_env_overrides() {
        let _guard = crate::test_support::lock_env();
        std::env::set_var("ABUSEFILTER_FILTER_USER__NAME", "Edit filter");
        std::env::set_var("ABUSEFILTER_WIKI__WIKI_ID", "testwiki");

        let mut config = Config::default();
        config.apply_env_overrides();

        std::env::remove_var("ABUSEFILTER_FILTER_USER__NAME");
        std::env::remove_var("ABUSEFILTER_WIKI__WIKI_ID");
        assert_eq!(config.filter_user.name, "Edit filter");
        assert_eq!(config.wiki.wiki_id, "testwiki");
    }

    #[test]
    fn test_hosting_wiki() {
        let mut config = Config::default();
        config.wiki.central_wiki = Some("metawiki".to_string());
        assert_eq!(config.hosting_wiki(true), Some("metawiki"));
        assert_eq!(config.hosting_wiki(false), None);
    }

    #[test]
    fn test_resolved_data_dir() {
        let mut config = Config::default();
        if let Some(home) = dirs::home_dir() {
            assert_eq!(config.resolved_data_dir().unwrap(), home.join(".abusefilter"));
        }

        config.storage.data_dir = PathBuf::from("/var/lib/abusefilter");
        assert_eq!(
            config.resolved_data_dir().unwrap(),
            PathBuf::from("/var/lib/abusefilter")
        );
    }
}
