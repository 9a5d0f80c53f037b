//! Passphrase-based sealing of data at rest.
//!
//! A 256-bit key is derived from the passphrase with PBKDF2-HMAC-SHA256 over
//! a fresh random salt, and the plaintext is encrypted with AES-256-GCM under
//! a fresh random nonce. Ciphertext, nonce and salt travel together as a
//! [`SealedBlob`] of base64 strings so they can be written to string storage.

use crate::error::{AppError, Result};
use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use rand::RngCore;
use sha2::Sha256;

/// PBKDF2 rounds used for every derived key.
pub const PBKDF2_ITERATIONS: u32 = 100_000;

pub const SALT_LEN: usize = 16;

/// AES-256-GCM nonce length (96 bits).
pub const NONCE_LEN: usize = 12;

const KEY_LEN: usize = 32;

/// Ciphertext with the nonce and salt needed to open it, all base64.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SealedBlob {
    pub ciphertext: String,
    pub nonce: String,
    pub salt: String,
}

/// Derives the AES key for `passphrase` and `salt`.
pub fn derive_key(passphrase: &str, salt: &[u8], iterations: u32) -> [u8; KEY_LEN] {
    let mut key = [0u8; KEY_LEN];
    pbkdf2::pbkdf2_hmac::<Sha256>(passphrase.as_bytes(), salt, iterations, &mut key);
    key
}

/// Encrypts `plaintext` under a key derived from `passphrase`.
pub fn seal(plaintext: &[u8], passphrase: &str, iterations: u32) -> Result<SealedBlob> {
    let mut salt = [0u8; SALT_LEN];
    rand::rngs::OsRng.fill_bytes(&mut salt);

    let key = derive_key(passphrase, &salt, iterations);
    let cipher = Aes256Gcm::new_from_slice(&key).map_err(|e| AppError::crypto(e.to_string()))?;
    let nonce = Aes256Gcm::generate_nonce(OsRng);
    let ciphertext = cipher
        .encrypt(&nonce, plaintext)
        .map_err(|e| AppError::crypto(e.to_string()))?;

    Ok(SealedBlob {
        ciphertext: BASE64.encode(ciphertext),
        nonce: BASE64.encode(nonce.as_slice()),
        salt: BASE64.encode(salt),
    })
}

/// Decrypts a blob produced by [`seal`].
///
/// Every failure (bad base64, wrong nonce length, wrong passphrase, tampered
/// ciphertext) yields `None`.
pub fn open(blob: &SealedBlob, passphrase: &str, iterations: u32) -> Option<Vec<u8>> {
    let salt = BASE64.decode(&blob.salt).ok()?;
    let nonce_bytes = BASE64.decode(&blob.nonce).ok()?;
    let ciphertext = BASE64.decode(&blob.ciphertext).ok()?;
    if nonce_bytes.len() != NONCE_LEN {
        return None;
    }

    let key = derive_key(passphrase, &salt, iterations);
    let cipher = Aes256Gcm::new_from_slice(&key).ok()?;
    cipher
        .decrypt(Nonce::from_slice(&nonce_bytes), ciphertext.as_slice())
        .ok()
}
