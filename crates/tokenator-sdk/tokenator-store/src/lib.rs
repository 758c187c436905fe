mod conversions;
mod error;
mod ledger;
mod models;
mod schema;
mod store;

pub use error::StoreError;
pub use ledger::SqliteLedger;
pub use store::{StoredTransaction, TokenStore};

pub type Result<T> = std::result::Result<T, StoreError>;
