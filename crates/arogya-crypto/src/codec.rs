//! Record codec: serialize and seal records into opaque storable strings
//!
//! Encoded values are hex-armored `nonce || ciphertext || tag`. Values
//! written before encryption existed, or while it is toggled off, are
//! plain JSON; [`RecordCodec::decode`] accepts both forms so flipping the
//! setting never strands existing data.

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use tracing::warn;
use zeroize::Zeroizing;

use crate::cipher::{self, KEY_SIZE};
use crate::keys;

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("payload is neither valid ciphertext nor plain JSON")]
    Undecodable,
}

/// Which decode path produced the record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded<T> {
    /// Decrypted with the codec key.
    Encrypted(T),
    /// Parsed directly as plain JSON (legacy or encryption-off payload).
    Plaintext(T),
}

impl<T> Decoded<T> {
    pub fn into_inner(self) -> T {
        match self {
            Decoded::Encrypted(record) | Decoded::Plaintext(record) => record,
        }
    }

    pub fn was_encrypted(&self) -> bool {
        matches!(self, Decoded::Encrypted(_))
    }
}

/// Codec over a single symmetric key.
pub struct RecordCodec {
    key: Zeroizing<[u8; KEY_SIZE]>,
}

impl RecordCodec {
    pub fn new(key: Zeroizing<[u8; KEY_SIZE]>) -> Self {
        Self { key }
    }

    pub fn with_default_key() -> Self {
        Self::new(keys::default_key())
    }

    pub fn with_passphrase(passphrase: &str) -> Self {
        Self::new(keys::derive_key(passphrase))
    }

    /// Serialize and seal a record into an opaque storable string.
    ///
    /// Falls back to the plain JSON form if sealing fails; callers must
    /// not assume the returned string is ciphertext.
    pub fn encode<T: Serialize>(&self, record: &T) -> String {
        let json = match serde_json::to_string(record) {
            Ok(json) => json,
            Err(err) => {
                warn!("record serialization failed: {err}");
                return "null".to_string();
            }
        };
        match cipher::seal(&*self.key, json.as_bytes()) {
            Ok(sealed) => keys::encode_hex(&sealed),
            Err(err) => {
                warn!("sealing failed, storing record in plain form: {err}");
                json
            }
        }
    }

    /// Serialize a record without sealing it (encryption toggled off).
    pub fn encode_plain<T: Serialize>(&self, record: &T) -> String {
        serde_json::to_string(record).unwrap_or_else(|err| {
            warn!("record serialization failed: {err}");
            "null".to_string()
        })
    }

    /// Decode a stored value, trying the sealed form first and falling
    /// back to plain JSON. Both paths failing is the only error.
    pub fn decode<T: DeserializeOwned>(&self, stored: &str) -> Result<Decoded<T>, CodecError> {
        if let Some(record) = self.try_open(stored) {
            return Ok(Decoded::Encrypted(record));
        }
        match serde_json::from_str(stored) {
            Ok(record) => Ok(Decoded::Plaintext(record)),
            Err(_) => Err(CodecError::Undecodable),
        }
    }

    fn try_open<T: DeserializeOwned>(&self, stored: &str) -> Option<T> {
        let sealed = keys::decode_hex(stored).ok()?;
        let plaintext = cipher::open(&*self.key, &sealed).ok()?;
        if plaintext.is_empty() {
            return None;
        }
        serde_json::from_slice(&plaintext).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Reading {
        label: String,
        value: f32,
        taken_at: chrono::DateTime<Utc>,
    }

    fn sample() -> Reading {
        Reading {
            label: "fasting glucose".to_string(),
            value: 92.5,
            taken_at: Utc.with_ymd_and_hms(2024, 3, 1, 7, 30, 0).unwrap(),
        }
    }

    #[test]
    fn test_encode_decode_roundtrip() {
        let codec = RecordCodec::with_default_key();
        let record = sample();

        let stored = codec.encode(&record);
        assert!(!stored.contains("glucose"));

        let decoded = codec.decode::<Reading>(&stored).unwrap();
        assert!(decoded.was_encrypted());
        assert_eq!(decoded.into_inner(), record);
    }

    #[test]
    fn test_legacy_plaintext_still_decodes() {
        let codec = RecordCodec::with_passphrase("user key");
        let record = sample();

        let stored = serde_json::to_string(&record).unwrap();
        let decoded = codec.decode::<Reading>(&stored).unwrap();
        assert!(!decoded.was_encrypted());
        assert_eq!(decoded.into_inner(), record);
    }

    #[test]
    fn test_garbage_is_undecodable() {
        let codec = RecordCodec::with_default_key();
        assert!(matches!(
            codec.decode::<Reading>("not hex, not json"),
            Err(CodecError::Undecodable)
        ));
        // Valid hex but not a sealed payload
        assert!(matches!(
            codec.decode::<Reading>("deadbeef"),
            Err(CodecError::Undecodable)
        ));
    }

    #[test]
    fn test_wrong_key_falls_back_then_fails() {
        let writer = RecordCodec::with_passphrase("old key");
        let reader = RecordCodec::with_passphrase("new key");

        let stored = writer.encode(&sample());
        assert!(reader.decode::<Reading>(&stored).is_err());
    }

    #[test]
    fn test_plain_encoding_is_json() {
        let codec = RecordCodec::with_default_key();
        let stored = codec.encode_plain(&sample());
        let parsed: Reading = serde_json::from_str(&stored).unwrap();
        assert_eq!(parsed, sample());
    }
}
