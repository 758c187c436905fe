//! [`Signer`] backed by a locally held secp256k1 key.
//!
//! Child keys follow the shared-secret construction: for identity key pair
//! `(a, A)` and counterparty public key `B`, the tweak is
//! `h = HMAC-SHA256(key = compressed(a·B), msg = invoice_number)`.
//! The counterparty's child public key is `B + h·G`, our own child key is
//! `a + h`. Because `a·B == b·A` both sides arrive at the same pair.
//! Payload encryption uses AES-256-GCM keyed by the x coordinate of
//! `our_child_private · their_child_public`.

use aes_gcm::aead::Aead;
use aes_gcm::{Aes256Gcm, KeyInit, Nonce};
use async_trait::async_trait;
use hmac::{Hmac, Mac};
use nostr_sdk::secp256k1::{self, All, Message, PublicKey, Scalar, Secp256k1, SecretKey};
use sha2::Sha256;

use crate::error::{Error, Result};
use crate::keys::{Counterparty, KeyPath, Signer};

type HmacSha256 = Hmac<Sha256>;

const NONCE_LEN: usize = 12;

/// Private key `1`; its public key is the generator, which makes "anyone"
/// keys derivable by every party.
const ANYONE_SECRET: [u8; 32] = {
    let mut b = [0u8; 32];
    b[31] = 1;
    b
};

pub struct LocalSigner {
    secp: Secp256k1<All>,
    secret: SecretKey,
    identity: PublicKey,
}

impl LocalSigner {
    pub fn new(secret: SecretKey) -> Self {
        let secp = Secp256k1::new();
        let identity = PublicKey::from_secret_key(&secp, &secret);
        Self {
            secp,
            secret,
            identity,
        }
    }

    pub fn from_hex(secret_hex: &str) -> Result<Self> {
        let bytes = hex::decode(secret_hex.trim())
            .map_err(|e| Error::Signer(format!("signing key is not hex: {e}")))?;
        let secret =
            SecretKey::from_slice(&bytes).map_err(|e| Error::Signer(format!("signing key: {e}")))?;
        Ok(Self::new(secret))
    }

    /// Fresh random identity.
    pub fn generate() -> Self {
        loop {
            let candidate: [u8; 32] = rand::random();
            if let Ok(secret) = SecretKey::from_slice(&candidate) {
                return Self::new(secret);
            }
        }
    }

    pub fn identity(&self) -> PublicKey {
        self.identity
    }

    pub fn secret_bytes(&self) -> [u8; 32] {
        self.secret.secret_bytes()
    }

    fn counterparty_key(&self, counterparty: &Counterparty) -> Result<PublicKey> {
        match counterparty {
            Counterparty::Myself => Ok(self.identity),
            Counterparty::Anyone => {
                let one = SecretKey::from_slice(&ANYONE_SECRET)
                    .map_err(|e| Error::KeyDerivation(e.to_string()))?;
                Ok(PublicKey::from_secret_key(&self.secp, &one))
            }
            Counterparty::Other(pk) => Ok(*pk),
        }
    }

    fn invoice_tweak(&self, path: &KeyPath) -> Result<Scalar> {
        let counterparty = self.counterparty_key(&path.counterparty)?;
        let shared = counterparty
            .mul_tweak(&self.secp, &Scalar::from(self.secret))
            .map_err(|e| Error::KeyDerivation(format!("shared secret: {e}")))?;

        let mut mac = <HmacSha256 as Mac>::new_from_slice(&shared.serialize())
            .map_err(|e| Error::KeyDerivation(e.to_string()))?;
        mac.update(path.invoice_number().as_bytes());
        let digest: [u8; 32] = mac.finalize().into_bytes().into();

        Scalar::from_be_bytes(digest).map_err(|e| Error::KeyDerivation(e.to_string()))
    }

    fn child_secret(&self, path: &KeyPath) -> Result<SecretKey> {
        let tweak = self.invoice_tweak(path)?;
        self.secret
            .add_tweak(&tweak)
            .map_err(|e| Error::KeyDerivation(format!("child private key: {e}")))
    }

    fn child_public(&self, path: &KeyPath, for_self: bool) -> Result<PublicKey> {
        let tweak = self.invoice_tweak(path)?;
        let base = if for_self {
            self.identity
        } else {
            self.counterparty_key(&path.counterparty)?
        };
        base.add_exp_tweak(&self.secp, &tweak)
            .map_err(|e| Error::KeyDerivation(format!("child public key: {e}")))
    }

    fn symmetric_key(&self, path: &KeyPath) -> Result<[u8; 32]> {
        let ours = self.child_secret(path)?;
        let theirs = self.child_public(path, false)?;
        let shared = theirs
            .mul_tweak(&self.secp, &Scalar::from(ours))
            .map_err(|e| Error::Encryption(format!("symmetric key: {e}")))?;
        let mut key = [0u8; 32];
        key.copy_from_slice(&shared.serialize()[1..33]);
        Ok(key)
    }

    fn cipher(&self, path: &KeyPath) -> Result<Aes256Gcm> {
        let key = self.symmetric_key(path)?;
        Aes256Gcm::new_from_slice(&key).map_err(|e| Error::Encryption(e.to_string()))
    }
}

impl std::fmt::Debug for LocalSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalSigner")
            .field("identity", &hex::encode(self.identity.serialize()))
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Signer for LocalSigner {
    async fn identity_key(&self) -> Result<PublicKey> {
        Ok(self.identity)
    }

    async fn derive_public_key(&self, path: &KeyPath, for_self: bool) -> Result<PublicKey> {
        self.child_public(path, for_self)
    }

    async fn create_signature(&self, digest: [u8; 32], path: &KeyPath) -> Result<Vec<u8>> {
        let child = self.child_secret(path)?;
        let sig = self
            .secp
            .sign_ecdsa(&Message::from_digest(digest), &child);
        Ok(sig.serialize_der().to_vec())
    }

    async fn encrypt(&self, plaintext: &[u8], path: &KeyPath) -> Result<Vec<u8>> {
        let cipher = self.cipher(path)?;
        let nonce_bytes: [u8; NONCE_LEN] = rand::random();
        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&nonce_bytes), plaintext)
            .map_err(|e| Error::Encryption(e.to_string()))?;

        let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        out.extend_from_slice(&nonce_bytes);
        out.extend_from_slice(&ciphertext);
        Ok(out)
    }

    async fn decrypt(&self, ciphertext: &[u8], path: &KeyPath) -> Result<Vec<u8>> {
        if ciphertext.len() <= NONCE_LEN {
            return Err(Error::Encryption("ciphertext too short".into()));
        }
        let (nonce, body) = ciphertext.split_at(NONCE_LEN);
        self.cipher(path)?
            .decrypt(Nonce::from_slice(nonce), body)
            .map_err(|_| Error::Encryption("decryption failed: wrong key or tampered data".into()))
    }
}

/// Verify a DER ECDSA signature over `digest` against `key`.
pub fn verify_signature(digest: [u8; 32], der: &[u8], key: &PublicKey) -> bool {
    let secp = Secp256k1::verification_only();
    match secp256k1::ecdsa::Signature::from_der(der) {
        Ok(sig) => secp
            .verify_ecdsa(&Message::from_digest(digest), &sig, key)
            .is_ok(),
        Err(_) => false,
    }
}
