//! Ownership checks on received tokens.

use crate::error::{Error, Result};
use crate::keys::{Counterparty, KeyPath, Signer};
use crate::pushdrop;
use crate::token::{TokenBody, TokenOutput};

/// Verify that every output of `body` is locked to a key this signer controls
/// under the relationship recorded in its custody metadata.
pub async fn validate<S: Signer + ?Sized>(signer: &S, body: &TokenBody) -> Result<()> {
    let transaction = &body.transaction;
    if transaction.outputs.is_empty() {
        return Err(Error::InvalidToken("token carries no outputs".into()));
    }
    let actual_txid = transaction.raw_tx.compute_txid();
    if actual_txid != transaction.txid {
        return Err(Error::InvalidToken(format!(
            "txid {} does not match raw transaction {actual_txid}",
            transaction.txid
        )));
    }

    for output in &transaction.outputs {
        validate_output(signer, body, output).await?;
    }
    Ok(())
}

async fn validate_output<S: Signer + ?Sized>(
    signer: &S,
    body: &TokenBody,
    output: &TokenOutput,
) -> Result<()> {
    let vout = output.vout;
    let meta = output.custom_instructions.as_ref().ok_or_else(|| {
        Error::InvalidToken(format!("output {vout} has no readable custody metadata"))
    })?;
    let tx_out = body
        .transaction
        .raw_tx
        .output
        .get(vout as usize)
        .ok_or_else(|| Error::InvalidToken(format!("output {vout} is not in the transaction")))?;
    if meta.output_script != tx_out.script_pubkey {
        return Err(Error::InvalidToken(format!(
            "output {vout} metadata describes a different script"
        )));
    }

    let decoded = pushdrop::decode(&tx_out.script_pubkey)
        .map_err(|e| Error::InvalidToken(format!("output {vout}: {e}")))?;

    let path = KeyPath::new(
        &meta.protocol_id,
        &meta.key_id,
        Counterparty::Other(meta.sender),
    );
    let derived = signer.derive_public_key(&path, true).await?;
    if derived != decoded.locking_public_key {
        return Err(Error::InvalidOwnerKey {
            derived: hex::encode(derived.serialize()),
            locking: hex::encode(decoded.locking_public_key.serialize()),
        });
    }

    let creator = signer.derive_public_key(&path, false).await?;
    if !pushdrop::verify_fields(&decoded, &creator) {
        return Err(Error::InvalidToken(format!(
            "output {vout} field signature is not the sender's"
        )));
    }
    Ok(())
}
