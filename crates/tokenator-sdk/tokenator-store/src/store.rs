use std::collections::HashMap;

use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;
use diesel_migrations::{EmbeddedMigrations, MigrationHarness, embed_migrations};

use tokenator_sdk::bitcoin::consensus::encode::serialize;
use tokenator_sdk::bitcoin::hashes::Hash;
use tokenator_sdk::{
    CreateActionArgs, CreateActionResult, Envelope, ListOutputsArgs, OutPoint, OutputRecord,
    PublicKey, ScriptBuf, SubmitDirectArgs, SubmitDirectResult, TagMode, Transaction, Txid,
    pushdrop,
};

use crate::conversions::{
    envelope_from_text, envelope_to_text, satoshis_from_row, satoshis_to_row,
};
use crate::error::StoreError;
use crate::models::{NewOutputRow, NewOutputTagRow, NewTransactionRow, OutputRow, TransactionRow};
use crate::schema::{output_tags, outputs, transactions};

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

/// A transaction as recorded by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredTransaction {
    pub txid: Txid,
    pub transaction: Transaction,
    pub envelope: Option<Envelope>,
    pub description: String,
    /// Counterparty that handed the transaction over, for direct submissions.
    pub sender: Option<PublicKey>,
    pub note: Option<String>,
    pub amount: Option<u64>,
    pub created_at: i64,
}

// --- TokenStore ---

/// SQLite persistence for token transactions and the outputs filed in
/// baskets.
///
/// All methods take `&mut self` because Diesel's `SqliteConnection` requires
/// `&mut` for all operations, including reads.
pub struct TokenStore {
    conn: SqliteConnection,
}

impl TokenStore {
    /// Open (or create) a store at the given file path. Runs migrations automatically.
    pub fn open(path: &str) -> crate::Result<Self> {
        Self::establish(path)
    }

    /// Open an in-memory store for tests.
    pub fn open_in_memory() -> crate::Result<Self> {
        Self::establish(":memory:")
    }

    fn establish(url: &str) -> crate::Result<Self> {
        let mut conn = SqliteConnection::establish(url)?;
        diesel::sql_query("PRAGMA foreign_keys = ON").execute(&mut conn)?;
        conn.run_pending_migrations(MIGRATIONS)
            .map_err(|e| StoreError::Migration(e.to_string()))?;
        Ok(TokenStore { conn })
    }

    // ==================== Actions ====================

    /// Record a locally built transaction. Every input must be an unspent
    /// output of this store whose locking script accepts the supplied unlock.
    /// Outputs without a basket are not kept.
    pub fn create_action(&mut self, args: &CreateActionArgs) -> crate::Result<CreateActionResult> {
        let transaction = args.to_transaction();
        let txid = transaction.compute_txid();

        self.conn.transaction(|conn| {
            for input in &args.inputs {
                let outpoint = input.outpoint;
                let row = find_output(conn, &outpoint)?.ok_or(StoreError::UnknownOutput {
                    txid: outpoint.txid,
                    vout: outpoint.vout,
                })?;
                if row.is_spent() {
                    return Err(StoreError::AlreadySpent {
                        txid: outpoint.txid,
                        vout: outpoint.vout,
                    });
                }
                pushdrop::verify_unlock(
                    &input.unlocking_script,
                    &ScriptBuf::from_bytes(row.locking_script),
                    &outpoint,
                    satoshis_from_row(row.satoshis)?,
                )
                .map_err(|e| StoreError::Sdk(format!("input {outpoint}: {e}")))?;
            }

            let mut envelope = Envelope::for_transaction(&transaction);
            for input in &transaction.input {
                let parent = input.previous_output.txid;
                if let Some(parent_envelope) = load_envelope(conn, &parent)? {
                    envelope.inputs.insert(parent.to_string(), parent_envelope);
                }
            }

            diesel::insert_into(transactions::table)
                .values(&NewTransactionRow {
                    txid: txid.to_byte_array().to_vec(),
                    raw_tx: serialize(&transaction),
                    envelope: Some(envelope_to_text(&envelope)?),
                    description: args.description.clone(),
                    sender_identity: None,
                    note: None,
                    amount: None,
                })
                .execute(conn)?;

            for input in &args.inputs {
                mark_spent(conn, &input.outpoint, &txid)?;
            }

            for (vout, output) in args.outputs.iter().enumerate() {
                if output.basket.is_none() {
                    continue;
                }
                let output_id = insert_output(
                    conn,
                    &NewOutputRow {
                        txid: txid.to_byte_array().to_vec(),
                        vout: vout as i32,
                        satoshis: satoshis_to_row(output.satoshis)?,
                        locking_script: output.locking_script.as_bytes().to_vec(),
                        basket: output.basket.clone(),
                        custom_instructions: output.custom_instructions.clone(),
                    },
                )?;
                add_tags(conn, output_id, &output.tags)?;
            }

            Ok(CreateActionResult {
                txid,
                transaction: transaction.clone(),
                envelope: Some(envelope),
            })
        })
    }

    /// File the described outputs of a counterparty's transaction.
    ///
    /// Outputs already on file keep their row: the basket and custody
    /// metadata are replaced when the submission carries them and new tags
    /// are appended. Repeating a submission adds nothing.
    pub fn submit_direct(&mut self, args: &SubmitDirectArgs) -> crate::Result<SubmitDirectResult> {
        let tx = &args.transaction;
        let txid = tx.raw_tx.compute_txid();
        if txid != tx.txid {
            return Err(StoreError::InvalidSubmission(format!(
                "txid {} does not match transaction {txid}",
                tx.txid
            )));
        }
        let envelope = tx
            .envelope
            .clone()
            .unwrap_or_else(|| Envelope::for_transaction(&tx.raw_tx));

        self.conn.transaction(|conn| {
            diesel::insert_or_ignore_into(transactions::table)
                .values(&NewTransactionRow {
                    txid: txid.to_byte_array().to_vec(),
                    raw_tx: serialize(&tx.raw_tx),
                    envelope: Some(envelope_to_text(&envelope)?),
                    description: args.note.clone(),
                    sender_identity: Some(args.sender_identity_key.serialize().to_vec()),
                    note: Some(args.note.clone()),
                    amount: Some(satoshis_to_row(args.amount)?),
                })
                .execute(conn)?;

            let mut outputs_added = 0;
            for output in &tx.outputs {
                let tx_out = tx.raw_tx.output.get(output.vout as usize).ok_or_else(|| {
                    StoreError::InvalidSubmission(format!(
                        "vout {} not in transaction {txid}",
                        output.vout
                    ))
                })?;
                let custom_instructions = output
                    .custom_instructions
                    .as_ref()
                    .map(serde_json::to_string)
                    .transpose()?;

                let output_id = match find_output(conn, &OutPoint::new(txid, output.vout))? {
                    Some(row) => {
                        diesel::update(outputs::table.find(row.id))
                            .set((
                                outputs::basket.eq(output.basket.clone().or(row.basket)),
                                outputs::custom_instructions
                                    .eq(custom_instructions.or(row.custom_instructions)),
                            ))
                            .execute(conn)?;
                        row.id
                    }
                    None => {
                        outputs_added += 1;
                        insert_output(
                            conn,
                            &NewOutputRow {
                                txid: txid.to_byte_array().to_vec(),
                                vout: output.vout as i32,
                                satoshis: satoshis_to_row(tx_out.value.to_sat())?,
                                locking_script: tx_out.script_pubkey.as_bytes().to_vec(),
                                basket: output.basket.clone(),
                                custom_instructions,
                            },
                        )?
                    }
                };
                add_tags(conn, output_id, &output.tags)?;
            }

            Ok(SubmitDirectResult {
                txid,
                outputs_added,
            })
        })
    }

    // ==================== Queries ====================

    /// Unspent outputs in one basket, newest first.
    pub fn list_outputs(&mut self, args: &ListOutputsArgs) -> crate::Result<Vec<OutputRecord>> {
        let mut query = outputs::table
            .filter(outputs::basket.eq(args.basket.clone()))
            .filter(outputs::spent.eq(0))
            .select(OutputRow::as_select())
            .into_boxed();

        if let Some(filter) = args.tags.as_ref().filter(|f| !f.tags.is_empty()) {
            match filter.mode {
                TagMode::Any => {
                    query = query.filter(
                        outputs::id.eq_any(
                            output_tags::table
                                .filter(output_tags::tag.eq_any(filter.tags.clone()))
                                .select(output_tags::output_id),
                        ),
                    );
                }
                TagMode::All => {
                    for tag in &filter.tags {
                        query = query.filter(
                            outputs::id.eq_any(
                                output_tags::table
                                    .filter(output_tags::tag.eq(tag.clone()))
                                    .select(output_tags::output_id),
                            ),
                        );
                    }
                }
            }
        }

        let rows: Vec<OutputRow> = query.order(outputs::id.desc()).load(&mut self.conn)?;

        let ids: Vec<i32> = rows.iter().map(|r| r.id).collect();
        let mut tags = load_tags(&mut self.conn, ids)?;

        let mut envelopes: HashMap<Vec<u8>, Option<Envelope>> = HashMap::new();
        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            let envelope = if args.include_envelope {
                match envelopes.get(&row.txid) {
                    Some(cached) => cached.clone(),
                    None => {
                        let loaded = load_envelope(&mut self.conn, &row.outpoint()?.txid)?;
                        envelopes.insert(row.txid.clone(), loaded.clone());
                        loaded
                    }
                }
            } else {
                None
            };
            let row_tags = tags.remove(&row.id).unwrap_or_default();
            records.push(row.into_record(row_tags, envelope)?);
        }
        Ok(records)
    }

    pub fn get_transaction(&mut self, txid: &Txid) -> crate::Result<Option<StoredTransaction>> {
        let row: Option<TransactionRow> = transactions::table
            .find(txid.to_byte_array().to_vec())
            .select(TransactionRow::as_select())
            .first(&mut self.conn)
            .optional()?;
        row.map(StoredTransaction::try_from).transpose()
    }

    pub fn is_spent(&mut self, outpoint: &OutPoint) -> crate::Result<bool> {
        Ok(find_output(&mut self.conn, outpoint)?.is_some_and(|row| row.is_spent()))
    }

    /// Number of outputs on file, spent ones included.
    pub fn output_count(&mut self) -> crate::Result<i64> {
        Ok(outputs::table.count().get_result(&mut self.conn)?)
    }
}

// --- Connection-level helpers, usable inside a transaction ---

fn find_output(conn: &mut SqliteConnection, outpoint: &OutPoint) -> crate::Result<Option<OutputRow>> {
    Ok(outputs::table
        .filter(outputs::txid.eq(outpoint.txid.to_byte_array().to_vec()))
        .filter(outputs::vout.eq(outpoint.vout as i32))
        .select(OutputRow::as_select())
        .first(conn)
        .optional()?)
}

fn insert_output(conn: &mut SqliteConnection, row: &NewOutputRow) -> crate::Result<i32> {
    diesel::insert_into(outputs::table).values(row).execute(conn)?;
    Ok(outputs::table
        .filter(outputs::txid.eq(row.txid.clone()))
        .filter(outputs::vout.eq(row.vout))
        .select(outputs::id)
        .first(conn)?)
}

/// Append the tags an output does not carry yet, keeping their order.
fn add_tags(conn: &mut SqliteConnection, output_id: i32, tags: &[String]) -> crate::Result<()> {
    let mut existing: Vec<String> = output_tags::table
        .filter(output_tags::output_id.eq(output_id))
        .select(output_tags::tag)
        .load(conn)?;
    for tag in tags {
        if existing.contains(tag) {
            continue;
        }
        diesel::insert_into(output_tags::table)
            .values(&NewOutputTagRow {
                output_id,
                tag: tag.clone(),
                position: existing.len() as i32,
            })
            .execute(conn)?;
        existing.push(tag.clone());
    }
    Ok(())
}

fn load_tags(
    conn: &mut SqliteConnection,
    output_ids: Vec<i32>,
) -> crate::Result<HashMap<i32, Vec<String>>> {
    let rows: Vec<(i32, String)> = output_tags::table
        .filter(output_tags::output_id.eq_any(output_ids))
        .order((output_tags::output_id, output_tags::position))
        .select((output_tags::output_id, output_tags::tag))
        .load(conn)?;
    let mut tags: HashMap<i32, Vec<String>> = HashMap::new();
    for (output_id, tag) in rows {
        tags.entry(output_id).or_default().push(tag);
    }
    Ok(tags)
}

fn load_envelope(conn: &mut SqliteConnection, txid: &Txid) -> crate::Result<Option<Envelope>> {
    let text: Option<Option<String>> = transactions::table
        .find(txid.to_byte_array().to_vec())
        .select(transactions::envelope)
        .first(conn)
        .optional()?;
    envelope_from_text(text.flatten().as_deref())
}

fn mark_spent(
    conn: &mut SqliteConnection,
    outpoint: &OutPoint,
    spending_txid: &Txid,
) -> crate::Result<()> {
    diesel::update(
        outputs::table.filter(
            outputs::txid
                .eq(outpoint.txid.to_byte_array().to_vec())
                .and(outputs::vout.eq(outpoint.vout as i32)),
        ),
    )
    .set((
        outputs::spent.eq(1),
        outputs::spending_txid.eq(spending_txid.to_byte_array().to_vec()),
    ))
    .execute(conn)?;
    Ok(())
}
