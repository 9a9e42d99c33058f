//! Arogya Store - encrypted persistent records for the health assistant
//!
//! A typed layer over a durable string key/value backend. Each record
//! kind occupies one namespaced key; collection kinds persist as a single
//! encoded blob with capacity enforced on every write. Values route
//! through the encryption codec when the (plaintext) preference flag says
//! so, and reads tolerate either form so toggling never strands data.

pub mod backend;
pub mod records;
pub mod snapshot;
pub mod store;

pub use backend::{FileBackend, InMemoryBackend, StorageBackend};
pub use records::{
    ActivityLevel, ChatMessage, ChatRole, Consultation, DietGoal, Gender, HealthProfile, Language,
    Preferences,
};
pub use snapshot::Snapshot;
pub use store::HealthStore;

/// Store errors
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Storage IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Storage lock poisoned")]
    LockPoisoned,

    #[error("No home directory")]
    NoHomeDir,

    #[error("Key error: {0}")]
    Key(#[from] arogya_crypto::KeyError),

    #[error("Import payload invalid: {0}")]
    InvalidImport(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;
