use std::path::{Path, PathBuf};

use tokenator_sdk::{LocalSigner, NostrTransport, Tokenator};
use tokenator_store::SqliteLedger;

use crate::config::AppConfig;
use crate::key_store::KeyStore;
use crate::AppError;

pub type AppTokenator = Tokenator<LocalSigner, SqliteLedger, NostrTransport>;

/// Everything a command needs, opened from one data directory.
pub struct AppState {
    pub data_dir: PathBuf,
    pub config: AppConfig,
    pub tokenator: AppTokenator,
}

impl AppState {
    /// Open the data directory. The signer is chosen once: the configured
    /// raw key if present, otherwise the encrypted key store, which is
    /// created with a fresh identity on first use.
    pub fn open(data_dir: &Path, password: Option<&str>) -> Result<Self, AppError> {
        let config = AppConfig::load_or_init(data_dir)?;
        let signer = open_signer(data_dir, &config, password)?;

        let db_path = config.database_path(data_dir);
        let db_path = db_path
            .to_str()
            .ok_or_else(|| AppError::Config(format!("non UTF-8 database path {db_path:?}")))?;
        let ledger = SqliteLedger::open(db_path)?;
        let transport = NostrTransport::new(&signer, config.transport_config())?;
        let tokenator = Tokenator::new(config.protocol.clone(), signer, ledger, transport)?;

        Ok(Self {
            data_dir: data_dir.to_path_buf(),
            config,
            tokenator,
        })
    }
}

fn open_signer(
    data_dir: &Path,
    config: &AppConfig,
    password: Option<&str>,
) -> Result<LocalSigner, AppError> {
    if let Some(raw) = &config.signing_key {
        return Ok(LocalSigner::from_hex(raw)?);
    }

    let key_store = KeyStore::new(data_dir);
    let password = password.ok_or_else(|| {
        AppError::Config(format!(
            "a password is required to open {}",
            key_store.path().display()
        ))
    })?;
    if key_store.exists() {
        return Ok(key_store.load(password)?);
    }

    let signer = LocalSigner::generate();
    key_store.save(&signer, password)?;
    log::info!(
        "created identity {}",
        hex::encode(signer.identity().serialize())
    );
    Ok(signer)
}
