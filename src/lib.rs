pub mod commands;
pub mod config;
pub mod key_store;
mod state;

use thiserror::Error;
use tracing_subscriber::EnvFilter;

pub use config::AppConfig;
pub use key_store::{KeyStore, KeyStoreError};
pub use state::{AppState, AppTokenator};

#[derive(Debug, Error)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(String),

    #[error("key store error: {0}")]
    KeyStore(#[from] KeyStoreError),

    #[error("{0}")]
    Sdk(#[from] tokenator_sdk::Error),

    #[error("store error: {0}")]
    Store(#[from] tokenator_store::StoreError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Crates whose chatter is capped at `warn`.
const QUIET_TARGETS: &[&str] = &[
    "nostr_relay_pool",
    "nostr_sdk",
    "rustls",
    "tungstenite",
    "tokio_tungstenite",
];

/// Install the fmt subscriber, bridging `log` records. `RUST_LOG` overrides
/// the defaults.
pub fn init_logging(verbose: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let base = if verbose { "debug" } else { "info" };
        let directives: Vec<String> = std::iter::once(base.to_string())
            .chain(QUIET_TARGETS.iter().map(|t| format!("{t}=warn")))
            .collect();
        EnvFilter::new(directives.join(","))
    });
    if let Err(e) = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
    {
        eprintln!("logger already installed: {e}");
    }
}
