//! The `Ledger` capability: transaction construction, direct submission of
//! received transactions and basket queries.
//!
//! Implementations own output persistence. The SDK ships an in-memory one
//! under the `testing` feature; `tokenator-store` provides the SQLite one.

mod transaction;

use async_trait::async_trait;
use nostr_sdk::secp256k1::PublicKey;
use serde::{Deserialize, Serialize};

use crate::basket::TagFilter;
use crate::error::Result;
use crate::token::{Envelope, TokenTransaction};

pub use bitcoin::hashes::Hash;
pub use bitcoin::{Amount, OutPoint, ScriptBuf, Sequence, Transaction, TxIn, TxOut, Txid};
pub use transaction::{
    new_transaction, script_from_hex, spend_input, token_txout, transaction_bytes,
    transaction_from_bytes, transaction_from_hex, transaction_to_hex,
};

/// One output requested from [`Ledger::create_action`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionOutput {
    pub satoshis: u64,
    pub locking_script: ScriptBuf,
    /// Basket the creator's store files the output under. `None` means the
    /// creator does not keep custody.
    pub basket: Option<String>,
    pub tags: Vec<String>,
    pub description: String,
    /// Serialized custody metadata stored alongside the output.
    pub custom_instructions: Option<String>,
}

/// One previously created output consumed by [`Ledger::create_action`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionInput {
    pub outpoint: OutPoint,
    pub unlocking_script: ScriptBuf,
    pub description: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CreateActionArgs {
    pub description: String,
    pub inputs: Vec<ActionInput>,
    pub outputs: Vec<ActionOutput>,
}

impl CreateActionArgs {
    /// Lay out the requested inputs and outputs as a transaction, in order.
    pub fn to_transaction(&self) -> Transaction {
        let inputs = self
            .inputs
            .iter()
            .map(|input| spend_input(input.outpoint, input.unlocking_script.clone()))
            .collect();
        let outputs = self
            .outputs
            .iter()
            .map(|output| token_txout(output.satoshis, output.locking_script.clone()))
            .collect();
        new_transaction(inputs, outputs)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateActionResult {
    pub txid: Txid,
    pub transaction: Transaction,
    pub envelope: Option<Envelope>,
}

/// A transaction received from a counterparty, handed to the local store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitDirectArgs {
    pub sender_identity_key: PublicKey,
    pub note: String,
    pub amount: u64,
    pub transaction: TokenTransaction,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitDirectResult {
    pub txid: Txid,
    /// Outputs newly filed by this submission. Zero on a repeat submission.
    pub outputs_added: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListOutputsArgs {
    pub basket: String,
    pub tags: Option<TagFilter>,
    pub include_envelope: bool,
}

/// A spendable output as stored by the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputRecord {
    #[serde(with = "crate::hex_serde::outpoint")]
    pub outpoint: OutPoint,
    pub satoshis: u64,
    #[serde(with = "crate::hex_serde::script")]
    pub locking_script: ScriptBuf,
    pub basket: Option<String>,
    pub tags: Vec<String>,
    /// Custody metadata as stored, JSON text.
    pub custom_instructions: Option<String>,
    pub envelope: Option<Envelope>,
    /// Unix seconds.
    pub created_at: i64,
}

/// Transaction construction and output persistence.
#[async_trait]
pub trait Ledger: Send + Sync {
    /// Build a transaction with the requested inputs and outputs, record the
    /// basketed outputs as spendable and mark consumed inputs spent.
    ///
    /// Consuming an output that is already spent fails with
    /// [`Error::AlreadySpent`](crate::Error::AlreadySpent).
    async fn create_action(&self, args: CreateActionArgs) -> Result<CreateActionResult>;

    /// File the described outputs of a counterparty's transaction.
    /// Submitting the same transaction twice is a no-op.
    async fn submit_direct(&self, args: SubmitDirectArgs) -> Result<SubmitDirectResult>;

    /// Spendable outputs in one basket, newest first.
    async fn list_outputs(&self, args: ListOutputsArgs) -> Result<Vec<OutputRecord>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_lays_out_transaction_in_order() {
        let prev = OutPoint::new(Txid::from_byte_array([3; 32]), 1);
        let args = CreateActionArgs {
            description: "spend".into(),
            inputs: vec![ActionInput {
                outpoint: prev,
                unlocking_script: ScriptBuf::from_bytes(vec![0x01, 0xc2]),
                description: "Redeems a todo token".into(),
            }],
            outputs: vec![ActionOutput {
                satoshis: 1,
                locking_script: ScriptBuf::from_bytes(vec![0xac]),
                basket: None,
                tags: Vec::new(),
                description: "out".into(),
                custom_instructions: None,
            }],
        };
        let tx = args.to_transaction();
        assert_eq!(tx.input[0].previous_output, prev);
        assert_eq!(tx.input[0].sequence, Sequence::MAX);
        assert_eq!(tx.input[0].script_sig.as_bytes(), &[0x01, 0xc2]);
        assert_eq!(tx.output[0].value, Amount::from_sat(1));
    }
}
