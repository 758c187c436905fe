//! In-memory collaborators for tests.
//!
//! [`MemoryLedger`] keeps outputs in a vector and checks every unlock against
//! its PushDrop locking script. [`SharedRelay`] is a message-box server that
//! several [`MemoryTransport`]s (one per identity) talk to, and records every
//! acknowledgement call so tests can assert on batching.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use nostr_sdk::secp256k1::PublicKey;

use crate::config::ProtocolConfig;
use crate::error::{Error, Result};
use crate::ledger::{
    CreateActionArgs, CreateActionResult, Ledger, ListOutputsArgs, OutPoint, OutputRecord,
    ScriptBuf, SubmitDirectArgs, SubmitDirectResult, Transaction, Txid,
};
use crate::pushdrop;
use crate::signer::LocalSigner;
use crate::token::Envelope;
use crate::tokenator::Tokenator;
use crate::transport::{Message, OutgoingMessage, SendReceipt, Transport};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ---------------------------------------------------------------------------
// Ledger
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct StoredOutput {
    outpoint: OutPoint,
    satoshis: u64,
    locking_script: ScriptBuf,
    basket: Option<String>,
    tags: Vec<String>,
    custom_instructions: Option<String>,
    created_at: i64,
    spent_by: Option<Txid>,
}

/// A direct submission as the ledger saw it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    pub sender: PublicKey,
    pub note: String,
    pub amount: u64,
    pub txid: Txid,
}

#[derive(Debug, Default)]
struct LedgerState {
    outputs: Vec<StoredOutput>,
    envelopes: BTreeMap<Txid, Envelope>,
    submissions: Vec<Submission>,
    clock: i64,
    fail_submissions: bool,
}

impl LedgerState {
    fn tick(&mut self) -> i64 {
        self.clock += 1;
        self.clock
    }

    fn find(&self, outpoint: &OutPoint) -> Option<usize> {
        self.outputs.iter().position(|o| o.outpoint == *outpoint)
    }

    fn envelope_for(&self, tx: &Transaction) -> Envelope {
        let mut envelope = Envelope::for_transaction(tx);
        for input in &tx.input {
            let parent = input.previous_output.txid;
            if let Some(parent_env) = self.envelopes.get(&parent) {
                envelope
                    .inputs
                    .insert(parent.to_string(), parent_env.clone());
            }
        }
        envelope
    }
}

/// Vector-backed [`Ledger`]. Timestamps are a logical clock.
#[derive(Debug, Default, Clone)]
pub struct MemoryLedger {
    state: Arc<Mutex<LedgerState>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following `submit_direct` fail with a submission error.
    pub fn fail_submissions(&self, fail: bool) {
        lock(&self.state).fail_submissions = fail;
    }

    pub fn submissions(&self) -> Vec<Submission> {
        lock(&self.state).submissions.clone()
    }

    pub fn is_spent(&self, outpoint: &OutPoint) -> bool {
        let state = lock(&self.state);
        state
            .find(outpoint)
            .is_some_and(|i| state.outputs[i].spent_by.is_some())
    }

    /// Number of outputs ever filed, spent ones included.
    pub fn output_count(&self) -> usize {
        lock(&self.state).outputs.len()
    }
}

#[async_trait]
impl Ledger for MemoryLedger {
    async fn create_action(&self, args: CreateActionArgs) -> Result<CreateActionResult> {
        let mut state = lock(&self.state);

        for input in &args.inputs {
            let outpoint = input.outpoint;
            let index = state.find(&outpoint).ok_or(Error::UnknownOutput {
                txid: outpoint.txid,
                vout: outpoint.vout,
            })?;
            let stored = &state.outputs[index];
            if stored.spent_by.is_some() {
                return Err(Error::AlreadySpent {
                    txid: outpoint.txid,
                    vout: outpoint.vout,
                });
            }
            pushdrop::verify_unlock(
                &input.unlocking_script,
                &stored.locking_script,
                &outpoint,
                stored.satoshis,
            )
            .map_err(|e| Error::Transaction(format!("input {outpoint}: {e}")))?;
        }

        let transaction = args.to_transaction();
        let txid = transaction.compute_txid();
        let envelope = state.envelope_for(&transaction);

        for input in &args.inputs {
            if let Some(index) = state.find(&input.outpoint) {
                state.outputs[index].spent_by = Some(txid);
            }
        }
        let created_at = state.tick();
        for (vout, output) in args.outputs.into_iter().enumerate() {
            if output.basket.is_none() {
                continue;
            }
            state.outputs.push(StoredOutput {
                outpoint: OutPoint::new(txid, vout as u32),
                satoshis: output.satoshis,
                locking_script: output.locking_script,
                basket: output.basket,
                tags: output.tags,
                custom_instructions: output.custom_instructions,
                created_at,
                spent_by: None,
            });
        }
        state.envelopes.insert(txid, envelope.clone());

        Ok(CreateActionResult {
            txid,
            transaction,
            envelope: Some(envelope),
        })
    }

    async fn submit_direct(&self, args: SubmitDirectArgs) -> Result<SubmitDirectResult> {
        let mut state = lock(&self.state);
        if state.fail_submissions {
            return Err(Error::Submission("store unavailable".into()));
        }

        let tx = &args.transaction;
        let txid = tx.raw_tx.compute_txid();
        if txid != tx.txid {
            return Err(Error::Submission(format!(
                "txid {} does not match transaction {txid}",
                tx.txid
            )));
        }

        let created_at = state.tick();
        let mut outputs_added = 0;
        for output in &tx.outputs {
            let tx_out = tx.raw_tx.output.get(output.vout as usize).ok_or_else(|| {
                Error::Submission(format!("vout {} not in transaction {txid}", output.vout))
            })?;
            let custom_instructions = output
                .custom_instructions
                .as_ref()
                .map(serde_json::to_string)
                .transpose()?;
            let outpoint = OutPoint::new(txid, output.vout);

            match state.find(&outpoint) {
                Some(index) => {
                    let stored = &mut state.outputs[index];
                    stored.basket = output.basket.clone().or(stored.basket.take());
                    for tag in &output.tags {
                        if !stored.tags.contains(tag) {
                            stored.tags.push(tag.clone());
                        }
                    }
                    if custom_instructions.is_some() {
                        stored.custom_instructions = custom_instructions;
                    }
                }
                None => {
                    state.outputs.push(StoredOutput {
                        outpoint,
                        satoshis: tx_out.value.to_sat(),
                        locking_script: tx_out.script_pubkey.clone(),
                        basket: output.basket.clone(),
                        tags: output.tags.clone(),
                        custom_instructions,
                        created_at,
                        spent_by: None,
                    });
                    outputs_added += 1;
                }
            }
        }

        let envelope = tx
            .envelope
            .clone()
            .unwrap_or_else(|| Envelope::for_transaction(&tx.raw_tx));
        state.envelopes.entry(txid).or_insert(envelope);
        state.submissions.push(Submission {
            sender: args.sender_identity_key,
            note: args.note,
            amount: args.amount,
            txid,
        });

        Ok(SubmitDirectResult {
            txid,
            outputs_added,
        })
    }

    async fn list_outputs(&self, args: ListOutputsArgs) -> Result<Vec<OutputRecord>> {
        let state = lock(&self.state);
        let mut records: Vec<OutputRecord> = state
            .outputs
            .iter()
            .filter(|o| o.spent_by.is_none())
            .filter(|o| o.basket.as_deref() == Some(args.basket.as_str()))
            .filter(|o| args.tags.as_ref().is_none_or(|f| f.matches(&o.tags)))
            .map(|o| OutputRecord {
                outpoint: o.outpoint,
                satoshis: o.satoshis,
                locking_script: o.locking_script.clone(),
                basket: o.basket.clone(),
                tags: o.tags.clone(),
                custom_instructions: o.custom_instructions.clone(),
                envelope: if args.include_envelope {
                    state.envelopes.get(&o.outpoint.txid).cloned()
                } else {
                    None
                },
                created_at: o.created_at,
            })
            .collect();
        records.reverse();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(records)
    }
}

// ---------------------------------------------------------------------------
// Transport
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct Delivery {
    recipient: PublicKey,
    message: Message,
}

#[derive(Debug, Default)]
struct RelayState {
    deliveries: Vec<Delivery>,
    acknowledged: HashSet<String>,
    ack_calls: Vec<Vec<String>>,
    next_id: u64,
    fail_acknowledgements: bool,
}

/// In-process message-box server shared by several identities.
#[derive(Debug, Default, Clone)]
pub struct SharedRelay {
    state: Arc<Mutex<RelayState>>,
}

impl SharedRelay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Transport endpoint for `identity`.
    pub fn transport_for(&self, identity: PublicKey) -> MemoryTransport {
        MemoryTransport {
            relay: self.clone(),
            identity,
        }
    }

    /// Place a raw message in `recipient`'s box, bypassing any sender.
    pub fn inject(&self, recipient: PublicKey, message_box: &str, sender: PublicKey, body: &str) -> String {
        let mut state = lock(&self.state);
        state.next_id += 1;
        let message_id = format!("msg-{}", state.next_id);
        state.deliveries.push(Delivery {
            recipient,
            message: Message {
                message_id: message_id.clone(),
                message_box: message_box.to_string(),
                sender,
                body: body.to_string(),
            },
        });
        message_id
    }

    /// Make every following `acknowledge_messages` call fail after it is
    /// recorded.
    pub fn fail_acknowledgements(&self, fail: bool) {
        lock(&self.state).fail_acknowledgements = fail;
    }

    /// Every `acknowledge_messages` call, in order.
    pub fn ack_calls(&self) -> Vec<Vec<String>> {
        lock(&self.state).ack_calls.clone()
    }

    pub fn is_acknowledged(&self, message_id: &str) -> bool {
        lock(&self.state).acknowledged.contains(message_id)
    }
}

/// One identity's view of a [`SharedRelay`].
#[derive(Debug, Clone)]
pub struct MemoryTransport {
    relay: SharedRelay,
    identity: PublicKey,
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn send_message(&self, message: OutgoingMessage) -> Result<SendReceipt> {
        let message_id = self.relay.inject(
            message.recipient,
            &message.message_box,
            self.identity,
            &message.body,
        );
        Ok(SendReceipt {
            message_id,
            status: "success".into(),
        })
    }

    async fn list_messages(&self, message_box: &str) -> Result<Vec<Message>> {
        let state = lock(&self.relay.state);
        Ok(state
            .deliveries
            .iter()
            .filter(|d| d.recipient == self.identity)
            .filter(|d| d.message.message_box == message_box)
            .filter(|d| !state.acknowledged.contains(&d.message.message_id))
            .map(|d| d.message.clone())
            .collect())
    }

    async fn acknowledge_messages(&self, message_ids: &[String]) -> Result<()> {
        let mut state = lock(&self.relay.state);
        state.ack_calls.push(message_ids.to_vec());
        if state.fail_acknowledgements {
            return Err(Error::Transport("relay refused acknowledgement".into()));
        }
        state.acknowledged.extend(message_ids.iter().cloned());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

pub type MemoryTokenator = Tokenator<LocalSigner, MemoryLedger, MemoryTransport>;

pub fn test_config() -> ProtocolConfig {
    ProtocolConfig::new("todo list", "1", b"1ToDoDtKreEzbHYKFjmoBuduFmSXXUGZG".to_vec())
}

/// A fresh identity with its own ledger, connected to `relay`.
pub fn memory_party(relay: &SharedRelay) -> MemoryTokenator {
    let signer = LocalSigner::generate();
    let transport = relay.transport_for(signer.identity());
    match Tokenator::new(test_config(), signer, MemoryLedger::new(), transport) {
        Ok(party) => party,
        Err(e) => panic!("test config is valid: {e}"),
    }
}

/// Identity key of a party.
pub fn identity_of(party: &MemoryTokenator) -> PublicKey {
    party.signer().identity()
}
