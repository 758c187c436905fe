//! Token artifacts and their message-body wire format.
//!
//! Message bodies are JSON. Two places carry nested JSON that peers may send
//! either as text or as structured values: `customInstructions` on each
//! output and the `inputs` map of an [`Envelope`]. Both forms are accepted
//! and normalized to typed values during deserialization, so nothing past the
//! transport boundary handles raw text.

use std::collections::BTreeMap;

use nostr_sdk::secp256k1::PublicKey;
use serde::{Deserialize, Serialize};

use crate::keys::{Counterparty, public_key_hex};
use crate::ledger::{ScriptBuf, Transaction, Txid, transaction_to_hex};

/// Ownership proof attached to every token output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustodyMetadata {
    #[serde(with = "crate::hex_serde::script")]
    pub output_script: ScriptBuf,
    /// Identity key of the token creator.
    #[serde(with = "public_key_hex")]
    pub sender: PublicKey,
    pub recipient: Counterparty,
    #[serde(rename = "protocolID")]
    pub protocol_id: String,
    #[serde(rename = "keyID")]
    pub key_id: String,
}

/// SPV-style proof bundle for a transaction and its ancestry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    pub raw_tx: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proof: Option<serde_json::Value>,
    #[serde(
        default,
        skip_serializing_if = "BTreeMap::is_empty",
        deserialize_with = "json_text::deserialize"
    )]
    pub inputs: BTreeMap<String, Envelope>,
}

impl Envelope {
    pub fn for_transaction(tx: &Transaction) -> Self {
        Self {
            raw_tx: transaction_to_hex(tx),
            proof: None,
            inputs: BTreeMap::new(),
        }
    }
}

/// Output descriptor carried in a token body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenOutput {
    pub vout: u32,
    pub satoshis: u64,
    #[serde(default)]
    pub basket: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    /// `None` when absent or unreadable; validation rejects such outputs.
    #[serde(default, with = "json_text::lenient")]
    pub custom_instructions: Option<CustodyMetadata>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenTransaction {
    #[serde(with = "crate::hex_serde::txid")]
    pub txid: Txid,
    #[serde(with = "crate::hex_serde::transaction")]
    pub raw_tx: Transaction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub envelope: Option<Envelope>,
    pub outputs: Vec<TokenOutput>,
}

/// Message body of a token in flight.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenBody {
    pub transaction: TokenTransaction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<u64>,
}

/// A freshly created token, not yet sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub recipient: Counterparty,
    /// Application payload as encrypted into the script (recipient included).
    pub payload: serde_json::Value,
    pub message_box: String,
    pub body: TokenBody,
}

impl Token {
    pub fn txid(&self) -> Txid {
        self.body.transaction.txid
    }
}

/// A token unwrapped from a transport message, not yet validated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingToken {
    pub message_id: String,
    pub sender: PublicKey,
    pub body: TokenBody,
}

/// Basket query row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpendableToken {
    #[serde(with = "crate::hex_serde::txid")]
    pub txid: Txid,
    pub vout: u32,
    #[serde(with = "crate::hex_serde::script")]
    pub locking_script: ScriptBuf,
    pub satoshis: u64,
    pub tags: Vec<String>,
    pub envelope: Option<Envelope>,
    pub custom_instructions: Option<CustodyMetadata>,
    pub created_at: i64,
}

/// Serde helpers for fields that travel as JSON text.
pub(crate) mod json_text {
    use serde::de::{DeserializeOwned, Error as _};
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;

    /// Accept either JSON text or the structured value.
    pub fn deserialize<'de, D, T>(d: D) -> Result<T, D::Error>
    where
        D: Deserializer<'de>,
        T: DeserializeOwned,
    {
        match Value::deserialize(d)? {
            Value::String(text) => serde_json::from_str(&text).map_err(D::Error::custom),
            other => serde_json::from_value(other).map_err(D::Error::custom),
        }
    }

    /// Optional value written as JSON text; unreadable input becomes `None`.
    pub mod lenient {
        use serde::de::DeserializeOwned;
        use serde::ser::Error as _;
        use serde::{Deserialize, Deserializer, Serialize, Serializer};
        use serde_json::Value;

        pub fn serialize<S, T>(value: &Option<T>, s: S) -> Result<S::Ok, S::Error>
        where
            S: Serializer,
            T: Serialize,
        {
            match value {
                Some(v) => {
                    let text = serde_json::to_string(v).map_err(S::Error::custom)?;
                    s.serialize_some(&text)
                }
                None => s.serialize_none(),
            }
        }

        pub fn deserialize<'de, D, T>(d: D) -> Result<Option<T>, D::Error>
        where
            D: Deserializer<'de>,
            T: DeserializeOwned,
        {
            let parsed = match Value::deserialize(d)? {
                Value::Null => return Ok(None),
                Value::String(text) => serde_json::from_str(&text),
                other => serde_json::from_value(other),
            };
            match parsed {
                Ok(v) => Ok(Some(v)),
                Err(e) => {
                    log::debug!("discarding unreadable custom instructions: {e}");
                    Ok(None)
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::{new_transaction, token_txout};
    use serde_json::json;

    const SENDER: &str = "0279be667ef9dcbbac55a06295ce870b07029bfcdb2dce28d959f2815b16f81798";

    fn metadata_json() -> serde_json::Value {
        json!({
            "outputScript": "21ac",
            "sender": SENDER,
            "recipient": "self",
            "protocolID": "todo list",
            "keyID": "1",
        })
    }

    fn body_json(custom_instructions: serde_json::Value) -> serde_json::Value {
        let tx = new_transaction(
            Vec::new(),
            vec![token_txout(1, ScriptBuf::from_bytes(vec![0x21, 0xac]))],
        );
        json!({
            "transaction": {
                "txid": tx.compute_txid().to_string(),
                "rawTx": transaction_to_hex(&tx),
                "outputs": [{
                    "vout": 0,
                    "satoshis": 1,
                    "basket": "todo_tokens",
                    "customInstructions": custom_instructions,
                }],
            },
            "amount": 1,
        })
    }

    #[test]
    fn custom_instructions_accepted_as_text_or_object() {
        let as_text: TokenBody =
            serde_json::from_value(body_json(json!(metadata_json().to_string()))).unwrap();
        let as_object: TokenBody = serde_json::from_value(body_json(metadata_json())).unwrap();
        assert_eq!(as_text, as_object);

        let meta = as_text.transaction.outputs[0]
            .custom_instructions
            .as_ref()
            .unwrap();
        assert_eq!(meta.recipient, Counterparty::Myself);
        assert_eq!(meta.protocol_id, "todo list");
    }

    #[test]
    fn custom_instructions_serialize_as_text() {
        let body: TokenBody = serde_json::from_value(body_json(metadata_json())).unwrap();
        let wire = serde_json::to_value(&body).unwrap();
        let text = wire["transaction"]["outputs"][0]["customInstructions"]
            .as_str()
            .unwrap();
        let reparsed: serde_json::Value = serde_json::from_str(text).unwrap();
        assert_eq!(reparsed, metadata_json());
    }

    #[test]
    fn missing_or_garbled_instructions_become_none() {
        let mut missing = body_json(json!(null));
        missing["transaction"]["outputs"][0]
            .as_object_mut()
            .unwrap()
            .remove("customInstructions");
        let body: TokenBody = serde_json::from_value(missing).unwrap();
        assert!(body.transaction.outputs[0].custom_instructions.is_none());

        let garbled: TokenBody = serde_json::from_value(body_json(json!("{not json"))).unwrap();
        assert!(garbled.transaction.outputs[0].custom_instructions.is_none());
    }

    #[test]
    fn envelope_inputs_accept_text() {
        let parent = json!({ "rawTx": "00", "proof": { "height": 7 } });
        let nested = json!({
            "rawTx": "01",
            "inputs": json!({ "aa": parent.clone() }).to_string(),
        });
        let env: Envelope = serde_json::from_value(nested).unwrap();
        assert_eq!(env.inputs["aa"].raw_tx, "00");
        assert_eq!(env.inputs["aa"].proof, Some(json!({ "height": 7 })));

        let structured: Envelope =
            serde_json::from_value(json!({ "rawTx": "01", "inputs": { "aa": parent } })).unwrap();
        assert_eq!(env, structured);
    }
}
