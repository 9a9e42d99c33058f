//! ChaCha20-Poly1305 authenticated encryption for record payloads
//!
//! Wire form is `nonce || ciphertext || tag`. The nonce is prepended so
//! decryption needs no external state.

use chacha20poly1305::{
    aead::{Aead, KeyInit},
    ChaCha20Poly1305, Nonce,
};
use ring::rand::{SecureRandom, SystemRandom};
use thiserror::Error;
use zeroize::Zeroizing;

/// 256-bit key (32 bytes)
pub const KEY_SIZE: usize = 32;
/// 96-bit nonce (12 bytes)
pub const NONCE_SIZE: usize = 12;

#[derive(Error, Debug)]
pub enum CipherError {
    #[error("Encryption failed")]
    EncryptionFailed,

    #[error("Decryption failed - data may be corrupted or tampered")]
    DecryptionFailed,

    #[error("Invalid key size: expected {KEY_SIZE}, got {0}")]
    InvalidKeySize(usize),
}

/// Seal a plaintext under the given 256-bit key.
///
/// Returns `nonce || ciphertext || tag`.
pub fn seal(key: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, CipherError> {
    if key.len() != KEY_SIZE {
        return Err(CipherError::InvalidKeySize(key.len()));
    }

    let cipher = ChaCha20Poly1305::new_from_slice(key)
        .map_err(|_| CipherError::InvalidKeySize(key.len()))?;

    let mut nonce_bytes = [0u8; NONCE_SIZE];
    SystemRandom::new()
        .fill(&mut nonce_bytes)
        .map_err(|_| CipherError::EncryptionFailed)?;
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext)
        .map_err(|_| CipherError::EncryptionFailed)?;

    let mut sealed = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
    sealed.extend_from_slice(&nonce_bytes);
    sealed.extend_from_slice(&ciphertext);

    Ok(sealed)
}

/// Open a payload produced by [`seal`].
///
/// Expects `nonce || ciphertext || tag`.
pub fn open(key: &[u8], sealed: &[u8]) -> Result<Zeroizing<Vec<u8>>, CipherError> {
    if key.len() != KEY_SIZE {
        return Err(CipherError::InvalidKeySize(key.len()));
    }

    if sealed.len() < NONCE_SIZE {
        return Err(CipherError::DecryptionFailed);
    }

    let cipher = ChaCha20Poly1305::new_from_slice(key)
        .map_err(|_| CipherError::InvalidKeySize(key.len()))?;

    let (nonce_bytes, ciphertext) = sealed.split_at(NONCE_SIZE);
    let nonce = Nonce::from_slice(nonce_bytes);

    let plaintext = cipher
        .decrypt(nonce, ciphertext)
        .map_err(|_| CipherError::DecryptionFailed)?;

    Ok(Zeroizing::new(plaintext))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys;

    #[test]
    fn test_seal_open_roundtrip() {
        let key = keys::default_key();
        let plaintext = br#"{"symptoms":"persistent cough","age":34}"#;

        let sealed = seal(&*key, plaintext).unwrap();

        // Sealed form must not contain the plaintext
        assert_ne!(&sealed[NONCE_SIZE..], plaintext);

        let opened = open(&*key, &sealed).unwrap();
        assert_eq!(opened.as_slice(), plaintext);
    }

    #[test]
    fn test_tampered_payload_fails() {
        let key = keys::default_key();
        let mut sealed = seal(&*key, b"blood pressure reading").unwrap();

        if let Some(byte) = sealed.last_mut() {
            *byte ^= 0xFF;
        }

        assert!(open(&*key, &sealed).is_err());
    }

    #[test]
    fn test_wrong_key_fails() {
        let key1 = keys::derive_key("first passphrase");
        let key2 = keys::derive_key("second passphrase");

        let sealed = seal(&*key1, b"allergy list").unwrap();
        assert!(open(&*key2, &sealed).is_err());
    }

    #[test]
    fn test_short_key_rejected() {
        assert!(matches!(
            seal(&[0u8; 16], b"x"),
            Err(CipherError::InvalidKeySize(16))
        ));
    }

    #[test]
    fn test_truncated_payload_fails() {
        let key = keys::default_key();
        assert!(open(&*key, &[0u8; 4]).is_err());
    }
}
