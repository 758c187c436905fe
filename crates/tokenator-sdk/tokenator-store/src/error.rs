use thiserror::Error;
use tokenator_sdk::Txid;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] diesel::result::Error),

    #[error("connection error: {0}")]
    Connection(#[from] diesel::ConnectionError),

    #[error("migration error: {0}")]
    Migration(String),

    #[error("invalid data: {0}")]
    InvalidData(String),

    #[error("SDK error: {0}")]
    Sdk(String),

    #[error("output {txid}:{vout} is already spent")]
    AlreadySpent { txid: Txid, vout: u32 },

    #[error("output {txid}:{vout} not found")]
    UnknownOutput { txid: Txid, vout: u32 },

    #[error("rejected submission: {0}")]
    InvalidSubmission(String),

    #[error("store task failed: {0}")]
    Task(String),

    #[error("store mutex poisoned")]
    MutexPoisoned,
}

impl From<tokenator_sdk::Error> for StoreError {
    fn from(e: tokenator_sdk::Error) -> Self {
        StoreError::Sdk(e.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::InvalidData(e.to_string())
    }
}

impl From<StoreError> for tokenator_sdk::Error {
    fn from(e: StoreError) -> Self {
        use tokenator_sdk::Error;
        match e {
            StoreError::AlreadySpent { txid, vout } => Error::AlreadySpent { txid, vout },
            StoreError::UnknownOutput { txid, vout } => Error::UnknownOutput { txid, vout },
            StoreError::Sdk(msg) => Error::Transaction(msg),
            StoreError::InvalidSubmission(msg) => Error::Submission(msg),
            other => Error::Query(other.to_string()),
        }
    }
}
