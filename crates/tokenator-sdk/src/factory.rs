use serde_json::{Map, Value};

use crate::config::ProtocolConfig;
use crate::error::{Error, Result};
use crate::keys::{Counterparty, KeyPath, Signer};
use crate::ledger::{ActionOutput, CreateActionArgs, Ledger};
use crate::pushdrop;
use crate::token::{CustodyMetadata, Token, TokenBody, TokenOutput, TokenTransaction};

/// Vout of the token output in every creation transaction.
pub const TOKEN_VOUT: u32 = 0;

/// Recipient given by the caller, else the one named in the payload's
/// `recipient` field, else `Myself`. The two must agree when both are set.
fn resolve_recipient(payload: &Value, recipient: Option<Counterparty>) -> Result<Counterparty> {
    let named = match payload.get("recipient") {
        None | Some(Value::Null) => None,
        Some(Value::String(text)) if text.trim().is_empty() => None,
        Some(Value::String(text)) => Some(text.parse::<Counterparty>()?),
        Some(other) => {
            return Err(Error::Counterparty(format!(
                "payload recipient must be a string, got {other}"
            )));
        }
    };
    match (recipient, named) {
        (Some(given), Some(named)) if given != named => Err(Error::Counterparty(format!(
            "recipient {given} conflicts with payload recipient {named}"
        ))),
        (Some(given), _) => Ok(given),
        (None, named) => Ok(named.unwrap_or_default()),
    }
}

/// Amount announced in the token body: the payload's numeric `amount`, else
/// the protocol's token value.
fn body_amount(payload: &Value, config: &ProtocolConfig) -> u64 {
    payload
        .get("amount")
        .and_then(Value::as_u64)
        .unwrap_or(config.default_token_value)
}

/// Add the recipient to the payload. Non-object payloads are wrapped under
/// `value`.
fn payload_with_recipient(payload: Value, recipient: &Counterparty) -> Value {
    let mut object = match payload {
        Value::Object(map) => map,
        other => {
            let mut map = Map::new();
            map.insert("value".into(), other);
            map
        }
    };
    object.insert("recipient".into(), Value::String(recipient.to_string()));
    Value::Object(object)
}

/// Lock `payload` into a new token output for `recipient`.
pub async fn create_token<S, L>(
    signer: &S,
    ledger: &L,
    config: &ProtocolConfig,
    payload: Value,
    recipient: Option<Counterparty>,
    tags: Vec<String>,
) -> Result<Token>
where
    S: Signer + ?Sized,
    L: Ledger + ?Sized,
{
    let recipient = resolve_recipient(&payload, recipient)?;
    let amount = body_amount(&payload, config);
    let path = KeyPath::new(&config.protocol_id, &config.key_id, recipient);

    let payload = payload_with_recipient(payload, &recipient);
    let ciphertext = signer.encrypt(&serde_json::to_vec(&payload)?, &path).await?;

    let fields = vec![config.protocol_address.clone(), ciphertext];
    let locking_script = pushdrop::create(signer, &fields, &path).await?;

    let metadata = CustodyMetadata {
        output_script: locking_script.clone(),
        sender: signer.identity_key().await?,
        recipient,
        protocol_id: config.protocol_id.clone(),
        key_id: config.key_id.clone(),
    };

    // The creator keeps custody only of tokens addressed to itself.
    let basket = recipient.is_myself().then(|| config.basket.clone());
    let created = ledger
        .create_action(CreateActionArgs {
            description: format!("Create a {} token", config.protocol_id),
            inputs: Vec::new(),
            outputs: vec![ActionOutput {
                satoshis: config.default_token_value,
                locking_script,
                basket,
                tags: tags.clone(),
                description: config.token_note(),
                custom_instructions: Some(serde_json::to_string(&metadata)?),
            }],
        })
        .await?;

    log::info!(
        "created {} token {} for {recipient}",
        config.protocol_id,
        created.txid
    );

    Ok(Token {
        recipient,
        payload,
        message_box: config.message_box.clone(),
        body: TokenBody {
            transaction: TokenTransaction {
                txid: created.txid,
                raw_tx: created.transaction,
                envelope: created.envelope,
                outputs: vec![TokenOutput {
                    vout: TOKEN_VOUT,
                    satoshis: config.default_token_value,
                    basket: Some(config.basket.clone()),
                    tags,
                    custom_instructions: Some(metadata),
                }],
            },
            amount: Some(amount),
        },
    })
}
