//! Counterparties, key paths and the `Signer` capability.
//!
//! Every protocol key is addressed by a [`KeyPath`]: a protocol identifier, a
//! key identifier and the counterparty the key is shared with. The signer
//! turns that triple into a child public key (for locking and verification),
//! an ECDSA signature (for unlocking) or a symmetric key (for payload
//! encryption). How it does so is the signer's business; callers only ever
//! see the resulting keys.

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use nostr_sdk::secp256k1::PublicKey;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{Error, Result};

/// Security level prefixed to every invoice number (counterparty-bound keys).
pub const SECURITY_LEVEL: u8 = 2;

/// The identity a key is derived against or data is encrypted for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Counterparty {
    /// The signer itself. Wire form `"self"`.
    #[default]
    Myself,
    /// The publicly known "anyone" key. Wire form `"anyone"`.
    Anyone,
    /// Another identity, by its compressed public key.
    Other(PublicKey),
}

impl Counterparty {
    pub fn is_myself(&self) -> bool {
        matches!(self, Counterparty::Myself)
    }
}

impl fmt::Display for Counterparty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Counterparty::Myself => f.write_str("self"),
            Counterparty::Anyone => f.write_str("anyone"),
            Counterparty::Other(pk) => f.write_str(&hex::encode(pk.serialize())),
        }
    }
}

impl FromStr for Counterparty {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "self" => Ok(Counterparty::Myself),
            "anyone" => Ok(Counterparty::Anyone),
            other => parse_public_key(other)
                .map(Counterparty::Other)
                .map_err(|e| Error::Counterparty(format!("{other}: {e}"))),
        }
    }
}

impl From<PublicKey> for Counterparty {
    fn from(pk: PublicKey) -> Self {
        Counterparty::Other(pk)
    }
}

impl Serialize for Counterparty {
    fn serialize<S: Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        s.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Counterparty {
    fn deserialize<D: Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(d)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Parse a compressed (33-byte) secp256k1 public key from hex.
pub fn parse_public_key(s: &str) -> Result<PublicKey> {
    let bytes = hex::decode(s.trim()).map_err(|e| Error::KeyDerivation(format!("bad hex: {e}")))?;
    if bytes.len() != 33 {
        return Err(Error::KeyDerivation(format!(
            "expected 33-byte compressed key, got {} bytes",
            bytes.len()
        )));
    }
    PublicKey::from_slice(&bytes).map_err(|e| Error::KeyDerivation(e.to_string()))
}

/// Serde adapter for compressed public keys as hex strings.
pub mod public_key_hex {
    use nostr_sdk::secp256k1::PublicKey;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(pk: &PublicKey, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&hex::encode(pk.serialize()))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<PublicKey, D::Error> {
        let s = String::deserialize(d)?;
        super::parse_public_key(&s).map_err(serde::de::Error::custom)
    }
}

/// Address of one derived key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KeyPath {
    pub protocol_id: String,
    pub key_id: String,
    pub counterparty: Counterparty,
}

impl KeyPath {
    pub fn new(
        protocol_id: impl Into<String>,
        key_id: impl Into<String>,
        counterparty: Counterparty,
    ) -> Self {
        Self {
            protocol_id: protocol_id.into(),
            key_id: key_id.into(),
            counterparty,
        }
    }

    /// `<level>-<protocol>-<key>`; the protocol part is normalized so that
    /// case and surrounding whitespace never change the derived key.
    pub fn invoice_number(&self) -> String {
        format!(
            "{}-{}-{}",
            SECURITY_LEVEL,
            self.protocol_id.trim().to_lowercase(),
            self.key_id
        )
    }
}

/// Key derivation, signing and encryption for one identity.
///
/// Chosen once when the [`Tokenator`](crate::Tokenator) is built; every
/// cryptographic step of the token lifecycle goes through it.
#[async_trait]
pub trait Signer: Send + Sync {
    /// The long-lived identity key of this signer.
    async fn identity_key(&self) -> Result<PublicKey>;

    /// Derive the child public key for `path`.
    ///
    /// With `for_self = false` the key belongs to the counterparty (it is the
    /// key the counterparty can sign for); with `for_self = true` it is this
    /// signer's own child key for the same relationship.
    async fn derive_public_key(&self, path: &KeyPath, for_self: bool) -> Result<PublicKey>;

    /// DER-encoded ECDSA signature over `digest` by this signer's child key.
    async fn create_signature(&self, digest: [u8; 32], path: &KeyPath) -> Result<Vec<u8>>;

    /// Authenticated encryption under the symmetric key shared with the
    /// counterparty of `path`.
    async fn encrypt(&self, plaintext: &[u8], path: &KeyPath) -> Result<Vec<u8>>;

    /// Inverse of [`encrypt`](Signer::encrypt) from either side of the
    /// relationship.
    async fn decrypt(&self, ciphertext: &[u8], path: &KeyPath) -> Result<Vec<u8>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY_HEX: &str = "0279be667ef9dcbbac55a06295ce870b07029bfcdb2dce28d959f2815b16f81798";

    #[test]
    fn counterparty_wire_forms() {
        assert_eq!("self".parse::<Counterparty>().unwrap(), Counterparty::Myself);
        assert_eq!(
            "anyone".parse::<Counterparty>().unwrap(),
            Counterparty::Anyone
        );
        let other: Counterparty = KEY_HEX.parse().unwrap();
        assert_eq!(other.to_string(), KEY_HEX);

        let json = serde_json::to_string(&Counterparty::Myself).unwrap();
        assert_eq!(json, "\"self\"");
    }

    #[test]
    fn counterparty_rejects_garbage() {
        assert!(matches!(
            "bob".parse::<Counterparty>(),
            Err(Error::Counterparty(_))
        ));
        // x-only keys are not identities
        assert!("79be667ef9dcbbac55a06295ce870b07029bfcdb2dce28d959f2815b16f81798"
            .parse::<Counterparty>()
            .is_err());
    }

    #[test]
    fn invoice_number_normalizes_protocol() {
        let a = KeyPath::new("Todo List ", "1", Counterparty::Myself);
        let b = KeyPath::new("todo list", "1", Counterparty::Anyone);
        assert_eq!(a.invoice_number(), "2-todo list-1");
        assert_eq!(a.invoice_number(), b.invoice_number());
    }
}
