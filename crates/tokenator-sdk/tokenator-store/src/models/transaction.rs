use diesel::prelude::*;

use crate::schema::transactions;

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = transactions)]
pub struct TransactionRow {
    pub txid: Vec<u8>,
    pub raw_tx: Vec<u8>,
    pub envelope: Option<String>,
    pub description: String,
    pub sender_identity: Option<Vec<u8>>,
    pub note: Option<String>,
    pub amount: Option<i64>,
    pub created_at: String,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = transactions)]
pub struct NewTransactionRow {
    pub txid: Vec<u8>,
    pub raw_tx: Vec<u8>,
    pub envelope: Option<String>,
    pub description: String,
    pub sender_identity: Option<Vec<u8>>,
    pub note: Option<String>,
    pub amount: Option<i64>,
}
