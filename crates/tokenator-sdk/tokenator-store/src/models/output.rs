use diesel::prelude::*;

use crate::schema::{output_tags, outputs};

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = outputs)]
pub struct OutputRow {
    pub id: i32,
    pub txid: Vec<u8>,
    pub vout: i32,
    pub satoshis: i64,
    pub locking_script: Vec<u8>,
    pub basket: Option<String>,
    pub custom_instructions: Option<String>,
    pub spent: i32,
    pub spending_txid: Option<Vec<u8>>,
    pub created_at: String,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = outputs)]
pub struct NewOutputRow {
    pub txid: Vec<u8>,
    pub vout: i32,
    pub satoshis: i64,
    pub locking_script: Vec<u8>,
    pub basket: Option<String>,
    pub custom_instructions: Option<String>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = output_tags)]
pub struct NewOutputTagRow {
    pub output_id: i32,
    pub tag: String,
    pub position: i32,
}
