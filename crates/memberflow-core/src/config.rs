//! MemberFlow configuration system.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{MemberFlowError, Result};

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemberFlowConfig {
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub resolver: ResolverConfig,
    #[serde(default)]
    pub jobs: JobsConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

impl MemberFlowConfig {
    /// Load config from the default path (~/.memberflow/config.toml).
    pub fn load() -> Result<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| MemberFlowError::Config(format!("Failed to read config: {e}")))?;
        Self::parse(&content)
    }

    /// Parse config from TOML text.
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| MemberFlowError::Config(format!("Failed to parse config: {e}")))
    }

    /// Save config to the given path.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| MemberFlowError::Config(format!("Failed to serialize config: {e}")))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get the default config path.
    pub fn default_path() -> PathBuf {
        Self::home_dir().join("config.toml")
    }

    /// Get the MemberFlow home directory.
    pub fn home_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".memberflow")
    }
}

/// Connection to the provider bridge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub api_id: String,
    #[serde(default)]
    pub api_hash: String,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_base_url() -> String { "http://127.0.0.1:8081".into() }
fn default_request_timeout() -> u64 { 30 }

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_id: String::new(),
            api_hash: String::new(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

/// Ceilings and margins for the job processor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Longest flood wait tolerated for a single item before the job aborts.
    #[serde(default = "default_max_flood_wait")]
    pub max_flood_wait_secs: u64,
    /// Longest flood wait tolerated while listing contacts.
    #[serde(default = "default_contact_flood_wait")]
    pub contact_flood_wait_secs: u64,
    /// Added on top of every provider-mandated wait.
    #[serde(default = "default_flood_margin")]
    pub flood_margin_secs: u64,
    /// Wall-clock ceiling for one run of a job. The clock starts when a
    /// worker picks the job up, so a resumed or reattached job gets a fresh
    /// budget rather than the time left over from earlier runs.
    #[serde(default = "default_job_timeout")]
    pub job_timeout_secs: u64,
}

fn default_max_flood_wait() -> u64 { 300 }
fn default_contact_flood_wait() -> u64 { 600 }
fn default_flood_margin() -> u64 { 5 }
fn default_job_timeout() -> u64 { 2 * 60 * 60 }

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_flood_wait_secs: default_max_flood_wait(),
            contact_flood_wait_secs: default_contact_flood_wait(),
            flood_margin_secs: default_flood_margin(),
            job_timeout_secs: default_job_timeout(),
        }
    }
}

/// Bounds for the entity resolution fallback chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolverConfig {
    #[serde(default = "default_strategy_delay")]
    pub strategy_delay_ms: u64,
    #[serde(default = "default_dialog_limit")]
    pub dialog_limit: usize,
    #[serde(default = "default_group_scan_limit")]
    pub group_scan_limit: usize,
    #[serde(default = "default_participants_per_group")]
    pub participants_per_group: usize,
}

fn default_strategy_delay() -> u64 { 50 }
fn default_dialog_limit() -> usize { 200 }
fn default_group_scan_limit() -> usize { 15 }
fn default_participants_per_group() -> usize { 200 }

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            strategy_delay_ms: default_strategy_delay(),
            dialog_limit: default_dialog_limit(),
            group_scan_limit: default_group_scan_limit(),
            participants_per_group: default_participants_per_group(),
        }
    }
}

/// Defaults and limits applied when jobs are created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobsConfig {
    #[serde(default = "default_rate_limit")]
    pub default_rate_limit: u32,
    #[serde(default = "default_batch_delay")]
    pub default_batch_delay: u64,
    #[serde(default = "default_max_members")]
    pub max_members: usize,
}

fn default_rate_limit() -> u32 { 4 }
fn default_batch_delay() -> u64 { 120 }
fn default_max_members() -> usize { 100_000 }

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            default_rate_limit: default_rate_limit(),
            default_batch_delay: default_batch_delay(),
            max_members: default_max_members(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_db_path")]
    pub db_path: String,
}

fn default_db_path() -> String { "~/.memberflow/memberflow.db".into() }

impl StorageConfig {
    /// Database path with `~` expanded.
    pub fn resolved_db_path(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.db_path).to_string())
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self { db_path: default_db_path() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = MemberFlowConfig::parse("").unwrap();
        assert_eq!(config.engine.max_flood_wait_secs, 300);
        assert_eq!(config.engine.contact_flood_wait_secs, 600);
        assert_eq!(config.engine.job_timeout_secs, 7200);
        assert_eq!(config.jobs.default_rate_limit, 4);
        assert_eq!(config.jobs.default_batch_delay, 120);
        assert_eq!(config.jobs.max_members, 100_000);
        assert_eq!(config.resolver.dialog_limit, 200);
    }

    #[test]
    fn test_partial_section_override() {
        let config = MemberFlowConfig::parse(
            r#"
            [engine]
            max_flood_wait_secs = 60

            [jobs]
            default_rate_limit = 10
            "#,
        )
        .unwrap();
        assert_eq!(config.engine.max_flood_wait_secs, 60);
        assert_eq!(config.engine.flood_margin_secs, 5);
        assert_eq!(config.jobs.default_rate_limit, 10);
        assert_eq!(config.jobs.default_batch_delay, 120);
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let err = MemberFlowConfig::parse("engine = [").unwrap_err();
        assert!(matches!(err, MemberFlowError::Config(_)));
    }

    #[test]
    fn test_save_and_reload() {
        let dir = std::env::temp_dir().join("memberflow-test-config");
        let path = dir.join("config.toml");
        let mut config = MemberFlowConfig::default();
        config.gateway.base_url = "http://bridge:9000".into();
        config.save_to(&path).unwrap();

        let loaded = MemberFlowConfig::load_from(&path).unwrap();
        assert_eq!(loaded.gateway.base_url, "http://bridge:9000");
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_db_path_tilde_expanded() {
        let storage = StorageConfig::default();
        assert!(!storage.resolved_db_path().to_string_lossy().starts_with('~'));
    }
}
