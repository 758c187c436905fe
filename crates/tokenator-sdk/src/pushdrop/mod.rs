//! PushDrop script codec: data-carrying outputs locked to a derived key.

pub mod script;
pub mod sighash;

use bitcoin::{OutPoint, Script, ScriptBuf};
use nostr_sdk::secp256k1::PublicKey;
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};
use crate::keys::{KeyPath, Signer};
use crate::signer::verify_signature;

pub use script::{DecodedPushDrop, decode_locking_script as decode};
pub use sighash::TOKEN_SIGHASH;

/// Digest the creator signs to bind the data fields to the script.
pub fn fields_digest(fields: &[Vec<u8>]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    for field in fields {
        hasher.update(field);
    }
    hasher.finalize().into()
}

/// Build a locking script carrying `fields`, spendable by the counterparty of
/// `path` (or by the signer itself when the counterparty is `Myself`).
pub async fn create<S: Signer + ?Sized>(
    signer: &S,
    fields: &[Vec<u8>],
    path: &KeyPath,
) -> Result<ScriptBuf> {
    let locking_key = signer.derive_public_key(path, false).await?;
    let signature = signer
        .create_signature(fields_digest(fields), path)
        .await?;
    Ok(script::build_locking_script(&locking_key, fields, &signature))
}

/// Check the creator signature embedded in a decoded script against the
/// creator's child key for the relationship.
pub fn verify_fields(decoded: &DecodedPushDrop, creator_key: &PublicKey) -> bool {
    verify_signature(
        fields_digest(&decoded.fields),
        &decoded.signature,
        creator_key,
    )
}

/// Unlocking script for the token output at `outpoint`.
///
/// `path.counterparty` is the party the token was exchanged with: the sender
/// for a received token, `Myself` for a self-issued one.
pub async fn redeem<S: Signer + ?Sized>(
    signer: &S,
    path: &KeyPath,
    outpoint: &OutPoint,
    locking_script: &Script,
    amount: u64,
) -> Result<ScriptBuf> {
    let digest = sighash::digest(outpoint, locking_script, amount, TOKEN_SIGHASH);
    let signature = signer.create_signature(digest, path).await?;
    Ok(script::build_unlocking_script(&signature, TOKEN_SIGHASH))
}

/// Check that `unlocking_script` satisfies the PushDrop `locking_script` for
/// the given outpoint and amount.
pub fn verify_unlock(
    unlocking_script: &Script,
    locking_script: &Script,
    outpoint: &OutPoint,
    amount: u64,
) -> Result<()> {
    let decoded = decode(locking_script)?;
    let bytes = unlocking_script.as_bytes();
    // single direct push: <len> <der || sighash>
    let (len, body) = bytes
        .split_first()
        .ok_or_else(|| Error::Script("empty unlocking script".into()))?;
    if *len as usize != body.len() || body.len() < 2 {
        return Err(Error::Script("unlocking script is not a single signature push".into()));
    }
    let (der, flag) = body.split_at(body.len() - 1);
    let digest = sighash::digest(outpoint, locking_script, amount, flag[0]);
    if verify_signature(digest, der, &decoded.locking_public_key) {
        Ok(())
    } else {
        Err(Error::Script(format!("signature does not unlock {outpoint}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::Counterparty;
    use crate::ledger::{Hash, Txid};
    use crate::signer::LocalSigner;

    fn fields() -> Vec<Vec<u8>> {
        vec![b"1TodoAddr".to_vec(), vec![0xde, 0xad, 0xbe, 0xef]]
    }

    #[tokio::test]
    async fn self_token_roundtrip() {
        let signer = LocalSigner::generate();
        let path = KeyPath::new("todo list", "1", Counterparty::Myself);

        let script = create(&signer, &fields(), &path).await.unwrap();
        let decoded = decode(&script).unwrap();

        let own = signer.derive_public_key(&path, true).await.unwrap();
        assert_eq!(decoded.locking_public_key, own);
        assert_eq!(decoded.fields, fields());
        assert!(verify_fields(&decoded, &own));
    }

    #[tokio::test]
    async fn recipient_can_unlock() {
        let alice = LocalSigner::generate();
        let bob = LocalSigner::generate();
        let to_bob = KeyPath::new("todo list", "1", Counterparty::Other(bob.identity()));
        let from_alice = KeyPath::new("todo list", "1", Counterparty::Other(alice.identity()));

        let script = create(&alice, &fields(), &to_bob).await.unwrap();
        let outpoint = OutPoint::new(Txid::from_byte_array([7; 32]), 0);

        let unlock = redeem(&bob, &from_alice, &outpoint, &script, 1).await.unwrap();
        verify_unlock(&unlock, &script, &outpoint, 1).unwrap();

        // Alice cannot spend what she locked to Bob.
        let forged = redeem(&alice, &to_bob, &outpoint, &script, 1).await.unwrap();
        assert!(verify_unlock(&forged, &script, &outpoint, 1).is_err());

        // Creator signature checks out under Alice's child key as Bob sees it.
        let creator = bob.derive_public_key(&from_alice, false).await.unwrap();
        assert!(verify_fields(&decode(&script).unwrap(), &creator));
    }

    #[tokio::test]
    async fn unlock_bound_to_amount() {
        let signer = LocalSigner::generate();
        let path = KeyPath::new("todo list", "1", Counterparty::Myself);
        let script = create(&signer, &fields(), &path).await.unwrap();
        let outpoint = OutPoint::new(Txid::from_byte_array([1; 32]), 3);

        let unlock = redeem(&signer, &path, &outpoint, &script, 5).await.unwrap();
        assert_eq!(*unlock.as_bytes().last().unwrap(), TOKEN_SIGHASH);
        assert!(verify_unlock(&unlock, &script, &outpoint, 5).is_ok());
        assert!(verify_unlock(&unlock, &script, &outpoint, 6).is_err());
    }
}
