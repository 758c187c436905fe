//! Password-encrypted storage of the signing key.

use std::fs;
use std::path::{Path, PathBuf};

use aes_gcm::aead::Aead;
use aes_gcm::{Aes256Gcm, KeyInit, Nonce};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use nostr_sdk::secp256k1::SecretKey;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokenator_sdk::LocalSigner;
use zeroize::{Zeroize, Zeroizing};

pub const KEY_FILE: &str = "tokenator_key.json";

#[derive(Error, Debug)]
pub enum KeyStoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Crypto error: {0}")]
    Crypto(String),

    #[error("Wrong password")]
    WrongPassword,
}

#[derive(Serialize, Deserialize)]
struct EncryptedKeyFile {
    identity: String,
    salt: String,
    nonce: String,
    ciphertext: String,
}

fn derive_key(password: &str, salt: &[u8]) -> Result<Zeroizing<[u8; 32]>, KeyStoreError> {
    let mut key_bytes = Zeroizing::new([0u8; 32]);
    argon2::Argon2::default()
        .hash_password_into(password.as_bytes(), salt, key_bytes.as_mut())
        .map_err(|e| KeyStoreError::Crypto(e.to_string()))?;
    Ok(key_bytes)
}

fn decode(field: &str, value: &str) -> Result<Vec<u8>, KeyStoreError> {
    BASE64
        .decode(value)
        .map_err(|e| KeyStoreError::Crypto(format!("{field}: {e}")))
}

pub struct KeyStore {
    file_path: PathBuf,
}

impl KeyStore {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            file_path: data_dir.join(KEY_FILE),
        }
    }

    pub fn exists(&self) -> bool {
        self.file_path.exists()
    }

    pub fn path(&self) -> &Path {
        &self.file_path
    }

    pub fn save(&self, signer: &LocalSigner, password: &str) -> Result<(), KeyStoreError> {
        let salt: [u8; 16] = rand::random();
        let key_bytes = derive_key(password, &salt)?;

        let cipher = Aes256Gcm::new_from_slice(key_bytes.as_ref())
            .map_err(|e| KeyStoreError::Crypto(e.to_string()))?;
        let nonce_bytes: [u8; 12] = rand::random();
        let nonce = Nonce::from_slice(&nonce_bytes);
        let mut secret = signer.secret_bytes();
        let ciphertext = cipher.encrypt(nonce, secret.as_ref());
        secret.zeroize();
        let ciphertext = ciphertext.map_err(|e| KeyStoreError::Crypto(e.to_string()))?;

        let file = EncryptedKeyFile {
            identity: hex::encode(signer.identity().serialize()),
            salt: BASE64.encode(salt),
            nonce: BASE64.encode(nonce_bytes),
            ciphertext: BASE64.encode(ciphertext),
        };

        if let Some(parent) = self.file_path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.file_path, serde_json::to_string_pretty(&file)?)?;
        Ok(())
    }

    pub fn load(&self, password: &str) -> Result<LocalSigner, KeyStoreError> {
        let contents = fs::read_to_string(&self.file_path)?;
        let file: EncryptedKeyFile = serde_json::from_str(&contents)?;

        let salt = decode("salt", &file.salt)?;
        let key_bytes = derive_key(password, &salt)?;
        let cipher = Aes256Gcm::new_from_slice(key_bytes.as_ref())
            .map_err(|e| KeyStoreError::Crypto(e.to_string()))?;
        let nonce_bytes = decode("nonce", &file.nonce)?;
        if nonce_bytes.len() != 12 {
            return Err(KeyStoreError::Crypto(format!(
                "nonce: expected 12 bytes, got {}",
                nonce_bytes.len()
            )));
        }
        let ciphertext = decode("ciphertext", &file.ciphertext)?;

        let plaintext = Zeroizing::new(
            cipher
                .decrypt(Nonce::from_slice(&nonce_bytes), ciphertext.as_ref())
                .map_err(|_| KeyStoreError::WrongPassword)?,
        );
        let secret = SecretKey::from_slice(plaintext.as_slice())
            .map_err(|e| KeyStoreError::Crypto(e.to_string()))?;
        let signer = LocalSigner::new(secret);

        if hex::encode(signer.identity().serialize()) != file.identity {
            return Err(KeyStoreError::Crypto(
                "decrypted key does not match recorded identity".into(),
            ));
        }
        Ok(signer)
    }
}
