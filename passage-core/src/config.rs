//! Configuration for the session and referral core.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::tasks::TaskDefinition;

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PassageConfig {
    /// Referral capture and scoring
    #[serde(default)]
    pub referral: ReferralConfig,
    /// Claimable task catalog
    #[serde(default = "default_tasks")]
    pub tasks: Vec<TaskDefinition>,
    /// Ledger persistence
    #[serde(default)]
    pub storage: StorageConfig,
    /// General settings
    #[serde(default)]
    pub general: GeneralConfig,
}

impl Default for PassageConfig {
    fn default() -> Self {
        Self {
            referral: ReferralConfig::default(),
            tasks: default_tasks(),
            storage: StorageConfig::default(),
            general: GeneralConfig::default(),
        }
    }
}

impl PassageConfig {
    /// Load config from a TOML document.
    pub fn from_toml(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Serialize to TOML.
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}

/// Referral configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReferralConfig {
    /// Path prefix that carries a referral code
    #[serde(default = "default_path_prefix")]
    pub path_prefix: String,
    /// Origin prepended to shareable links
    #[serde(default)]
    pub base_url: Option<String>,
    /// Points credited per referred identity
    #[serde(default = "default_points_per_referral")]
    pub points_per_referral: u64,
    /// Match codes against addresses ignoring ASCII case
    #[serde(default)]
    pub case_insensitive_codes: bool,
}

impl Default for ReferralConfig {
    fn default() -> Self {
        Self {
            path_prefix: default_path_prefix(),
            base_url: None,
            points_per_referral: default_points_per_referral(),
            case_insensitive_codes: false,
        }
    }
}

/// Which ledger store to open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Memory,
    Sqlite,
}

/// Storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,
    /// Directory holding the SQLite database
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Memory,
            data_dir: default_data_dir(),
        }
    }
}

/// General configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Default tracing directive when RUST_LOG is unset
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Emit JSON log lines
    #[serde(default)]
    pub json_logs: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logs: false,
        }
    }
}

// Defaults
fn default_path_prefix() -> String { "/ref/".to_string() }
fn default_points_per_referral() -> u64 { 100 }
fn default_data_dir() -> PathBuf { PathBuf::from("./passage-data") }
fn default_log_level() -> String { "info".to_string() }
fn default_tasks() -> Vec<TaskDefinition> {
    vec![TaskDefinition {
        id: "welcome".to_string(),
        label: "Welcome badge".to_string(),
        payload_template: "Claim {label} ({task}) for {identity}".to_string(),
        points: 50,
    }]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PassageConfig::default();
        assert_eq!(config.referral.path_prefix, "/ref/");
        assert_eq!(config.referral.points_per_referral, 100);
        assert_eq!(config.storage.backend, StorageBackend::Memory);
        assert_eq!(config.tasks.len(), 1);
        assert_eq!(config.tasks[0].id, "welcome");
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = PassageConfig::from_toml(
            r#"
[referral]
points_per_referral = 25

[storage]
backend = "sqlite"
data_dir = "/var/lib/passage"
"#,
        )
        .unwrap();

        assert_eq!(config.referral.points_per_referral, 25);
        assert_eq!(config.referral.path_prefix, "/ref/");
        assert!(!config.referral.case_insensitive_codes);
        assert_eq!(config.storage.backend, StorageBackend::Sqlite);
        assert_eq!(config.storage.data_dir, PathBuf::from("/var/lib/passage"));
        assert_eq!(config.tasks[0].id, "welcome");
        assert_eq!(config.general.log_level, "info");
    }

    #[test]
    fn test_custom_tasks() {
        let config = PassageConfig::from_toml(
            r#"
[[tasks]]
id = "first-mint"
label = "First mint"
payload_template = "mint:{identity}"
points = 200
"#,
        )
        .unwrap();

        assert_eq!(config.tasks.len(), 1);
        assert_eq!(config.tasks[0].points, 200);
    }

    #[test]
    fn test_toml_roundtrip() {
        let config = PassageConfig::default();
        let toml = config.to_toml().unwrap();
        let parsed = PassageConfig::from_toml(&toml).unwrap();
        assert_eq!(parsed.tasks[0].label, "Welcome badge");
        assert_eq!(parsed.storage.data_dir, config.storage.data_dir);
    }
}
