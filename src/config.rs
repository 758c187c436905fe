use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokenator_sdk::transport::nostr::DEFAULT_RELAYS;
use tokenator_sdk::{NostrTransportConfig, ProtocolConfig};

use crate::AppError;

pub const CONFIG_FILE: &str = "tokenator_config.json";
const DATABASE_FILE: &str = "tokenator.db";

/// Application settings, persisted as pretty JSON in the data directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppConfig {
    pub protocol: ProtocolConfig,
    #[serde(default = "default_relays")]
    pub relays: Vec<String>,
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,
    #[serde(default = "default_database_file")]
    pub database_file: String,
    /// Raw hex signing key. When unset the encrypted key store is used.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signing_key: Option<String>,
}

fn default_relays() -> Vec<String> {
    DEFAULT_RELAYS.iter().map(|s| s.to_string()).collect()
}

fn default_fetch_timeout_secs() -> u64 {
    10
}

fn default_database_file() -> String {
    DATABASE_FILE.to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            protocol: ProtocolConfig::new("todo list", "1", b"1ToDoDtKreEzbHYKFjmoBuduFmSXXUGZG".to_vec()),
            relays: default_relays(),
            fetch_timeout_secs: default_fetch_timeout_secs(),
            database_file: default_database_file(),
            signing_key: None,
        }
    }
}

impl AppConfig {
    fn path(data_dir: &Path) -> PathBuf {
        data_dir.join(CONFIG_FILE)
    }

    /// Read the config from `data_dir`, writing the defaults on first launch.
    pub fn load_or_init(data_dir: &Path) -> Result<Self, AppError> {
        let path = Self::path(data_dir);
        if !path.exists() {
            let config = Self::default();
            config.save(data_dir)?;
            log::info!("wrote default config to {}", path.display());
            return Ok(config);
        }
        let contents = fs::read_to_string(&path)?;
        let config: Self = serde_json::from_str(&contents)?;
        config.protocol.validate()?;
        Ok(config)
    }

    pub fn save(&self, data_dir: &Path) -> Result<(), AppError> {
        fs::create_dir_all(data_dir)?;
        fs::write(Self::path(data_dir), serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn database_path(&self, data_dir: &Path) -> PathBuf {
        data_dir.join(&self.database_file)
    }

    pub fn transport_config(&self) -> NostrTransportConfig {
        NostrTransportConfig {
            relays: self.relays.clone(),
            fetch_timeout: Duration::from_secs(self.fetch_timeout_secs),
            ..NostrTransportConfig::default()
        }
    }
}
