//! Arogya Crypto - encryption layer for on-device health records
//!
//! This crate provides:
//! - ChaCha20-Poly1305 sealing of serialized records
//! - SHA-256 key derivation from a user passphrase
//! - Random personal key generation (hex)
//! - A record codec tolerant of legacy plaintext payloads

pub mod cipher;
pub mod codec;
pub mod keys;

pub use cipher::CipherError;
pub use codec::{CodecError, Decoded, RecordCodec};
pub use keys::KeyError;
