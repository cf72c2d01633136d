//! Authenticated encryption for secret values
//!
//! AES-256-GCM with a per-secret random nonce. The GCM tag is kept as a
//! separate field, and an independent SHA-256 checksum over the plaintext
//! provides a second integrity layer verified on every read.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm,
};
use argon2::{Argon2, Params};
use rand::Rng;
use sha2::{Digest, Sha256};

use crate::error::{Result, SecretError};

const TAG_LEN: usize = 16;
const NONCE_LEN: usize = 12;

/// Output of one encryption
#[derive(Debug, Clone)]
pub struct EncryptedPayload {
    pub ciphertext: Vec<u8>,
    pub nonce: [u8; NONCE_LEN],
    pub auth_tag: [u8; TAG_LEN],
}

/// Secret cipher bound to one master key
#[derive(Clone)]
pub struct SecretCipher {
    key: [u8; 32],
}

impl SecretCipher {
    /// Derive the master key from a password with Argon2id
    pub fn from_password(master_password: &str) -> Result<Self> {
        let key = derive_key(master_password.as_bytes(), b"pipewright-secret-store")?;
        Ok(Self { key })
    }

    /// Use a caller-provided 256-bit key directly
    pub fn from_key(key: [u8; 32]) -> Self {
        Self { key }
    }

    /// Encrypt plaintext under a fresh random nonce
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<EncryptedPayload> {
        let nonce: [u8; NONCE_LEN] = rand::thread_rng().gen();
        let cipher = Aes256Gcm::new(&self.key.into());
        let mut combined = cipher
            .encrypt(aes_gcm::Nonce::from_slice(&nonce), plaintext)
            .map_err(|e| SecretError::Encryption {
                message: e.to_string(),
            })?;

        // aes-gcm appends the tag to the ciphertext; store it separately.
        let tag_start = combined.len() - TAG_LEN;
        let mut auth_tag = [0u8; TAG_LEN];
        auth_tag.copy_from_slice(&combined[tag_start..]);
        combined.truncate(tag_start);

        Ok(EncryptedPayload {
            ciphertext: combined,
            nonce,
            auth_tag,
        })
    }

    /// Decrypt a payload, verifying the GCM tag
    pub fn decrypt(&self, payload: &EncryptedPayload) -> Result<Vec<u8>> {
        let mut combined = payload.ciphertext.clone();
        combined.extend_from_slice(&payload.auth_tag);

        let cipher = Aes256Gcm::new(&self.key.into());
        cipher
            .decrypt(aes_gcm::Nonce::from_slice(&payload.nonce), combined.as_ref())
            .map_err(|e| SecretError::Decryption {
                message: e.to_string(),
            })
    }
}

/// Hex SHA-256 checksum over plaintext
pub fn checksum(plaintext: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(plaintext);
    hex::encode(hasher.finalize())
}

fn derive_key(password: &[u8], salt: &[u8]) -> Result<[u8; 32]> {
    let mut key = [0u8; 32];
    let argon2 = Argon2::new(
        argon2::Algorithm::Argon2id,
        argon2::Version::V0x13,
        Params::new(65536, 3, 4, None).map_err(|e| SecretError::KeyDerivation {
            message: e.to_string(),
        })?,
    );
    argon2
        .hash_password_into(password, salt, &mut key)
        .map_err(|e| SecretError::KeyDerivation {
            message: e.to_string(),
        })?;
    Ok(key)
}
