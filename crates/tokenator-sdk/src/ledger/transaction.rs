//! Transaction helpers over the `bitcoin` consensus types.
//!
//! Token transactions are created without funding inputs, and `bitcoin`
//! writes an input-less transaction in the extended (BIP144) form: a `00 01`
//! marker follows the version. The txid is computed over the legacy form, so
//! it is unaffected, and `deserialize` reads either form back.

use bitcoin::absolute::LockTime;
use bitcoin::consensus::encode::{deserialize, serialize};
use bitcoin::transaction::Version;
use bitcoin::{Amount, OutPoint, ScriptBuf, Sequence, Transaction, TxIn, TxOut, Witness};

use crate::error::{Error, Result};

/// Version-1, lock-time-zero transaction with the given inputs and outputs.
pub fn new_transaction(input: Vec<TxIn>, output: Vec<TxOut>) -> Transaction {
    Transaction {
        version: Version::ONE,
        lock_time: LockTime::ZERO,
        input,
        output,
    }
}

/// Final-sequence input carrying `script_sig`.
pub fn spend_input(previous_output: OutPoint, script_sig: ScriptBuf) -> TxIn {
    TxIn {
        previous_output,
        script_sig,
        sequence: Sequence::MAX,
        witness: Witness::new(),
    }
}

pub fn token_txout(satoshis: u64, script_pubkey: ScriptBuf) -> TxOut {
    TxOut {
        value: Amount::from_sat(satoshis),
        script_pubkey,
    }
}

pub fn transaction_bytes(tx: &Transaction) -> Vec<u8> {
    serialize(tx)
}

pub fn transaction_from_bytes(bytes: &[u8]) -> Result<Transaction> {
    deserialize(bytes).map_err(|e| Error::Transaction(format!("bad transaction: {e}")))
}

pub fn transaction_to_hex(tx: &Transaction) -> String {
    hex::encode(transaction_bytes(tx))
}

pub fn transaction_from_hex(s: &str) -> Result<Transaction> {
    let bytes =
        hex::decode(s.trim()).map_err(|e| Error::Transaction(format!("bad tx hex: {e}")))?;
    transaction_from_bytes(&bytes)
}

pub fn script_from_hex(s: &str) -> Result<ScriptBuf> {
    hex::decode(s.trim())
        .map(ScriptBuf::from_bytes)
        .map_err(|e| Error::Script(format!("bad script hex: {e}")))
}
