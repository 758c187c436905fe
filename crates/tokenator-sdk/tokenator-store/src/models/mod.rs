pub mod output;
pub mod transaction;

pub use output::{NewOutputRow, NewOutputTagRow, OutputRow};
pub use transaction::{NewTransactionRow, TransactionRow};
