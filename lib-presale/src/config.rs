//! Presale Configuration
//!
//! TOML-backed settings for the presale core. Every section is optional in
//! the file; missing sections and keys fall back to `Default`.
//!
//! ```toml
//! log_level = "info"
//!
//! [reconciliation]
//! enabled = true
//! interval_ms = 30000
//!
//! [referral]
//! reward = 200
//!
//! [admin]
//! authority = "ledger"
//!
//! [storage]
//! path = "./data/records"
//! cache_capacity_mb = 64
//! ```

use anyhow::{bail, Context, Result};
use lib_records::{KvRecordStore, MemoryBackend, RecordStore, SledBackend};
use lib_types::REFERRAL_REWARD;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::admin::AdminAuthority;

/// Top-level presale configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PresaleConfig {
    /// Fallback tracing level when `RUST_LOG` is unset
    pub log_level: String,
    pub reconciliation: ReconciliationConfig,
    pub referral: ReferralConfig,
    pub admin: AdminConfig,
    pub storage: StorageConfig,
}

impl Default for PresaleConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            reconciliation: ReconciliationConfig::default(),
            referral: ReferralConfig::default(),
            admin: AdminConfig::default(),
            storage: StorageConfig::default(),
        }
    }
}

impl PresaleConfig {
    /// Short intervals and in-memory storage
    pub fn for_testing() -> Self {
        Self {
            log_level: "debug".to_string(),
            reconciliation: ReconciliationConfig {
                enabled: true,
                interval_ms: 50,
            },
            referral: ReferralConfig::default(),
            admin: AdminConfig::default(),
            storage: StorageConfig {
                path: None,
                cache_capacity_mb: 8,
            },
        }
    }

    /// Load and validate a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {:?}", path))?;
        let config = Self::from_toml_str(&content)
            .with_context(|| format!("Invalid config file {:?}", path))?;
        info!("Loaded presale config from {:?}", path);
        Ok(config)
    }

    /// Parse and validate TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.reconciliation.validate()?;
        if self.storage.cache_capacity_mb == 0 {
            bail!("storage.cache_capacity_mb must be greater than zero");
        }
        Ok(())
    }
}

/// Background reconciliation settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconciliationConfig {
    pub enabled: bool,
    /// Poll period in milliseconds
    pub interval_ms: u64,
}

impl Default for ReconciliationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_ms: 30_000,
        }
    }
}

impl ReconciliationConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.interval_ms == 0 {
            bail!("reconciliation.interval_ms must be greater than zero");
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReferralConfig {
    /// Reward units credited per referral
    pub reward: u64,
}

impl Default for ReferralConfig {
    fn default() -> Self {
        Self {
            reward: REFERRAL_REWARD,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdminConfig {
    pub authority: AdminAuthority,
}

/// Record store location
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Sled database directory; in-memory when unset
    pub path: Option<PathBuf>,
    pub cache_capacity_mb: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: None,
            cache_capacity_mb: 64,
        }
    }
}

/// Open the record store described by `config`
pub fn open_record_store(config: &StorageConfig) -> Result<Arc<dyn RecordStore>> {
    match &config.path {
        Some(path) => {
            let backend = SledBackend::open_with_cache(path, config.cache_capacity_mb << 20)
                .with_context(|| format!("Failed to open record store at {:?}", path))?;
            Ok(Arc::new(KvRecordStore::new(backend)))
        }
        None => {
            info!("No storage path configured, using in-memory record store");
            Ok(Arc::new(KvRecordStore::new(MemoryBackend::new())))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = PresaleConfig::default();
        assert_eq!(config.reconciliation.interval(), Duration::from_secs(30));
        assert!(config.reconciliation.enabled);
        assert_eq!(config.referral.reward, 200);
        assert_eq!(config.admin.authority, AdminAuthority::Ledger);
        assert!(config.storage.path.is_none());
        config.validate().unwrap();
    }

    #[test]
    fn test_partial_file_takes_defaults() {
        let config = PresaleConfig::from_toml_str(
            r#"
[admin]
authority = "advisory"

[reconciliation]
interval_ms = 5000
"#,
        )
        .unwrap();

        assert_eq!(config.admin.authority, AdminAuthority::Advisory);
        assert_eq!(config.reconciliation.interval_ms, 5000);
        assert!(config.reconciliation.enabled);
        assert_eq!(config.referral, ReferralConfig::default());
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn test_empty_file_is_default() {
        assert_eq!(PresaleConfig::from_toml_str("").unwrap(), PresaleConfig::default());
    }

    #[test]
    fn test_zero_interval_rejected() {
        let err = PresaleConfig::from_toml_str("[reconciliation]\ninterval_ms = 0\n").unwrap_err();
        assert!(err.to_string().contains("interval_ms"));
    }

    #[test]
    fn test_unknown_authority_rejected() {
        assert!(PresaleConfig::from_toml_str("[admin]\nauthority = \"root\"\n").is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("presale.toml");
        std::fs::write(&path, "log_level = \"warn\"\n[referral]\nreward = 50\n").unwrap();

        let config = PresaleConfig::load(&path).unwrap();
        assert_eq!(config.log_level, "warn");
        assert_eq!(config.referral.reward, 50);

        assert!(PresaleConfig::load(dir.path().join("missing.toml")).is_err());
    }

    #[tokio::test]
    async fn test_open_record_store() {
        let dir = TempDir::new().unwrap();
        let config = StorageConfig {
            path: Some(dir.path().join("records")),
            cache_capacity_mb: 8,
        };
        let store = open_record_store(&config).unwrap();
        assert!(!store.global_config().await.unwrap().claim_active);

        let memory = open_record_store(&PresaleConfig::for_testing().storage).unwrap();
        assert!(memory.list_records(lib_records::SortField::CreatedAt, lib_records::SortDirection::Desc)
            .await
            .unwrap()
            .is_empty());
    }
}
