//! Custody acceptance of received tokens and redemption of held ones.

use nostr_sdk::secp256k1::PublicKey;

use crate::config::ProtocolConfig;
use crate::error::{Error, Result};
use crate::keys::{Counterparty, KeyPath, Signer};
use crate::ledger::{
    ActionInput, CreateActionArgs, CreateActionResult, Ledger, OutPoint, SubmitDirectArgs,
    SubmitDirectResult, Txid,
};
use crate::pushdrop;
use crate::token::{IncomingToken, SpendableToken};
use crate::validator;

/// A token taken into custody from a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcceptedToken {
    pub message_id: String,
    pub sender: PublicKey,
    pub txid: Txid,
    pub vouts: Vec<u32>,
}

/// A message that did not yield a token. Never acknowledged.
#[derive(Debug)]
pub struct Rejection {
    pub message_id: String,
    pub error: Error,
}

/// Outcome of one message in a receive batch.
#[derive(Debug)]
pub enum Processed {
    Accepted(AcceptedToken),
    Rejected(Rejection),
}

#[derive(Debug, Default)]
pub struct ReceiptReport {
    pub accepted: Vec<AcceptedToken>,
    pub rejected: Vec<Rejection>,
    /// Set when the accepted messages could not be acknowledged. Their tokens
    /// are in the store regardless; the messages will be delivered again.
    pub acknowledgement_error: Option<Error>,
}

impl ReceiptReport {
    pub fn accepted_ids(&self) -> Vec<String> {
        self.accepted.iter().map(|a| a.message_id.clone()).collect()
    }

    pub fn is_acknowledged(&self) -> bool {
        self.acknowledgement_error.is_none()
    }
}

impl FromIterator<Processed> for ReceiptReport {
    fn from_iter<I: IntoIterator<Item = Processed>>(iter: I) -> Self {
        iter.into_iter()
            .fold(ReceiptReport::default(), |mut report, processed| {
                match processed {
                    Processed::Accepted(token) => report.accepted.push(token),
                    Processed::Rejected(rejection) => report.rejected.push(rejection),
                }
                report
            })
    }
}

/// File a validated token in the local store under the protocol basket.
pub async fn accept<L: Ledger + ?Sized>(
    ledger: &L,
    config: &ProtocolConfig,
    incoming: &IncomingToken,
) -> Result<SubmitDirectResult> {
    let mut transaction = incoming.body.transaction.clone();
    for output in &mut transaction.outputs {
        output.basket = Some(config.basket.clone());
    }
    let result = ledger
        .submit_direct(SubmitDirectArgs {
            sender_identity_key: incoming.sender,
            note: config.token_note(),
            amount: config.default_token_value,
            transaction,
        })
        .await?;
    log::info!(
        "accepted {} token {} from message {}",
        config.protocol_id,
        result.txid,
        incoming.message_id
    );
    Ok(result)
}

async fn validate_and_accept<S, L>(
    signer: &S,
    ledger: &L,
    config: &ProtocolConfig,
    incoming: &IncomingToken,
) -> Result<SubmitDirectResult>
where
    S: Signer + ?Sized,
    L: Ledger + ?Sized,
{
    validator::validate(signer, &incoming.body).await?;
    accept(ledger, config, incoming).await
}

/// Validate then accept one incoming token.
pub async fn process<S, L>(
    signer: &S,
    ledger: &L,
    config: &ProtocolConfig,
    incoming: IncomingToken,
) -> Processed
where
    S: Signer + ?Sized,
    L: Ledger + ?Sized,
{
    match validate_and_accept(signer, ledger, config, &incoming).await {
        Ok(_) => Processed::Accepted(AcceptedToken {
            message_id: incoming.message_id,
            sender: incoming.sender,
            txid: incoming.body.transaction.txid,
            vouts: incoming
                .body
                .transaction
                .outputs
                .iter()
                .map(|o| o.vout)
                .collect(),
        }),
        Err(error) => {
            log::warn!("rejected token message {}: {error}", incoming.message_id);
            Processed::Rejected(Rejection {
                message_id: incoming.message_id,
                error,
            })
        }
    }
}

/// Key path a held token is unlocked under: the relationship recorded in its
/// metadata, or the protocol's self path when it carries none.
fn redemption_path(config: &ProtocolConfig, token: &SpendableToken) -> KeyPath {
    match &token.custom_instructions {
        Some(meta) => KeyPath::new(
            &meta.protocol_id,
            &meta.key_id,
            Counterparty::Other(meta.sender),
        ),
        None => KeyPath::new(&config.protocol_id, &config.key_id, Counterparty::Myself),
    }
}

/// Spend a held token.
pub async fn redeem<S, L>(
    signer: &S,
    ledger: &L,
    config: &ProtocolConfig,
    token: &SpendableToken,
    description: Option<String>,
) -> Result<CreateActionResult>
where
    S: Signer + ?Sized,
    L: Ledger + ?Sized,
{
    let outpoint = OutPoint::new(token.txid, token.vout);
    let path = redemption_path(config, token);
    let unlocking_script = pushdrop::redeem(
        signer,
        &path,
        &outpoint,
        &token.locking_script,
        token.satoshis,
    )
    .await?;

    let result = ledger
        .create_action(CreateActionArgs {
            description: description
                .unwrap_or_else(|| format!("Delete a {} token", config.protocol_id)),
            inputs: vec![ActionInput {
                outpoint,
                unlocking_script,
                description: format!("Redeems a {} token", config.protocol_id),
            }],
            outputs: Vec::new(),
        })
        .await?;
    log::info!("redeemed token {outpoint} in {}", result.txid);
    Ok(result)
}

/// Recover the application payload from a held token.
pub async fn decrypt_payload<S: Signer + ?Sized>(
    signer: &S,
    token: &SpendableToken,
) -> Result<serde_json::Value> {
    let meta = token
        .custom_instructions
        .as_ref()
        .ok_or_else(|| Error::InvalidToken("token has no custody metadata".into()))?;
    let decoded = pushdrop::decode(&token.locking_script)?;
    let ciphertext = decoded
        .fields
        .get(1)
        .ok_or_else(|| Error::InvalidToken("token script carries no payload field".into()))?;

    let path = KeyPath::new(
        &meta.protocol_id,
        &meta.key_id,
        Counterparty::Other(meta.sender),
    );
    let plaintext = signer.decrypt(ciphertext, &path).await?;
    Ok(serde_json::from_slice(&plaintext)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::Hash;

    #[test]
    fn report_partitions_in_order() {
        let sender = {
            use nostr_sdk::secp256k1::{Secp256k1, SecretKey};
            let sk = SecretKey::from_slice(&[0x09; 32]).unwrap();
            PublicKey::from_secret_key(&Secp256k1::new(), &sk)
        };
        let accepted = |id: &str| {
            Processed::Accepted(AcceptedToken {
                message_id: id.into(),
                sender,
                txid: Txid::all_zeros(),
                vouts: vec![0],
            })
        };
        let rejected = |id: &str| {
            Processed::Rejected(Rejection {
                message_id: id.into(),
                error: Error::InvalidToken("no metadata".into()),
            })
        };

        let report: ReceiptReport =
            vec![accepted("a"), rejected("b"), accepted("c")].into_iter().collect();
        assert_eq!(report.accepted_ids(), vec!["a", "c"]);
        assert_eq!(report.rejected.len(), 1);
        assert_eq!(report.rejected[0].message_id, "b");
    }
}
