//! Key material: default key, passphrase derivation, personal keys
//!
//! The raw passphrase is never stored anywhere; only its SHA-256 digest
//! is used as key material.

use ring::digest;
use ring::rand::{SecureRandom, SystemRandom};
use thiserror::Error;
use zeroize::Zeroizing;

use crate::cipher::KEY_SIZE;

/// Seed for the key used when no passphrase has been configured.
/// Shields records from casual inspection of the storage file only.
const DEFAULT_KEY_SEED: &str = "arogya-device-default-v1";

#[derive(Error, Debug)]
pub enum KeyError {
    #[error("Invalid key length: expected {expected} hex chars, got {got}")]
    InvalidLength { expected: usize, got: usize },

    #[error("Invalid hex encoding")]
    InvalidHex,

    #[error("Random generator unavailable")]
    Rng,
}

/// Key used when the user has not supplied a passphrase or personal key.
pub fn default_key() -> Zeroizing<[u8; KEY_SIZE]> {
    derive_key(DEFAULT_KEY_SEED)
}

/// Derive a 256-bit key from a user passphrase via SHA-256.
pub fn derive_key(passphrase: &str) -> Zeroizing<[u8; KEY_SIZE]> {
    let hash = digest::digest(&digest::SHA256, passphrase.as_bytes());
    let mut key = Zeroizing::new([0u8; KEY_SIZE]);
    key.copy_from_slice(hash.as_ref());
    key
}

/// Generate a random 256-bit personal key, rendered as 64 hex chars.
pub fn generate_personal_key() -> Result<String, KeyError> {
    let mut key = Zeroizing::new([0u8; KEY_SIZE]);
    SystemRandom::new()
        .fill(key.as_mut())
        .map_err(|_| KeyError::Rng)?;
    Ok(encode_hex(&*key))
}

/// Parse a personal key previously produced by [`generate_personal_key`].
pub fn parse_hex_key(encoded: &str) -> Result<Zeroizing<[u8; KEY_SIZE]>, KeyError> {
    if encoded.len() != KEY_SIZE * 2 {
        return Err(KeyError::InvalidLength {
            expected: KEY_SIZE * 2,
            got: encoded.len(),
        });
    }
    let bytes = decode_hex(encoded)?;
    let mut key = Zeroizing::new([0u8; KEY_SIZE]);
    key.copy_from_slice(&bytes);
    Ok(key)
}

pub(crate) fn encode_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

pub(crate) fn decode_hex(encoded: &str) -> Result<Vec<u8>, KeyError> {
    if encoded.len() % 2 != 0 || !encoded.is_ascii() {
        return Err(KeyError::InvalidHex);
    }
    (0..encoded.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&encoded[i..i + 2], 16).map_err(|_| KeyError::InvalidHex))
        .collect()
}
