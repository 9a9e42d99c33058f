//! Typed persistent store over a string key/value backend
//!
//! Each record kind occupies one namespaced key (chat transcripts one per
//! feature module). Collection kinds persist as a single encoded blob, so
//! every write rewrites the whole collection with its capacity enforced
//! first. Unreadable values behave as absent data; only backend IO
//! failures surface as errors.

use std::sync::Arc;

use arogya_crypto::{keys, RecordCodec};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::warn;

use crate::backend::StorageBackend;
use crate::records::{
    ChatMessage, Consultation, HealthProfile, Language, Preferences, CHAT_CAPACITY,
    CONSULTATION_CAPACITY, SEARCH_HISTORY_CAPACITY,
};
use crate::Result;

/// Every key this application owns starts with this prefix.
pub const KEY_PREFIX: &str = "arogya.";

const PROFILE_KEY: &str = "arogya.profile";
const CONSULTATIONS_KEY: &str = "arogya.consultations";
const SEARCH_HISTORY_KEY: &str = "arogya.search_history";
const PREFERENCES_KEY: &str = "arogya.preferences";

fn chat_key(module: &str) -> String {
    format!("{KEY_PREFIX}chat.{module}")
}

/// Persistent record store for one device profile.
pub struct HealthStore {
    backend: Arc<dyn StorageBackend>,
}

impl HealthStore {
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        Self { backend }
    }

    // --- preferences (always plaintext) ---

    /// Current preferences; unreadable or missing values yield defaults.
    pub fn preferences(&self) -> Result<Preferences> {
        match self.backend.get(PREFERENCES_KEY)? {
            Some(raw) => match serde_json::from_str(&raw) {
                Ok(prefs) => Ok(prefs),
                Err(err) => {
                    warn!("preferences unreadable, using defaults: {err}");
                    Ok(Preferences::default())
                }
            },
            None => Ok(Preferences::default()),
        }
    }

    pub fn save_preferences(&self, prefs: &Preferences) -> Result<()> {
        self.backend.set(PREFERENCES_KEY, &serde_json::to_string(prefs)?)
    }

    pub fn language(&self) -> Result<Language> {
        Ok(self.preferences()?.language)
    }

    pub fn set_language(&self, language: Language) -> Result<()> {
        let mut prefs = self.preferences()?;
        prefs.language = language;
        self.save_preferences(&prefs)
    }

    pub fn encryption_enabled(&self) -> Result<bool> {
        Ok(self.preferences()?.encryption_enabled)
    }

    /// Toggle encryption for subsequent writes. Existing values are left
    /// as they are; reads accept either form.
    pub fn set_encryption_enabled(&self, enabled: bool) -> Result<()> {
        let mut prefs = self.preferences()?;
        prefs.encryption_enabled = enabled;
        self.save_preferences(&prefs)
    }

    /// Install or clear a personal key (64 hex chars, see
    /// `arogya_crypto::keys::generate_personal_key`). Does not re-encrypt
    /// records written under the previous key.
    pub fn set_custom_key(&self, key: Option<&str>) -> Result<()> {
        if let Some(encoded) = key {
            keys::parse_hex_key(encoded)?;
        }
        let mut prefs = self.preferences()?;
        prefs.custom_key = key.map(str::to_string);
        self.save_preferences(&prefs)
    }

    // --- profile (singleton, overwritten wholesale) ---

    pub fn save_profile(&self, profile: &HealthProfile) -> Result<()> {
        self.write_slot(PROFILE_KEY, profile)
    }

    pub fn profile(&self) -> Result<Option<HealthProfile>> {
        self.read_slot(PROFILE_KEY)
    }

    pub fn clear_profile(&self) -> Result<()> {
        self.backend.remove(PROFILE_KEY)
    }

    // --- consultations (newest-first, capacity 50) ---

    pub fn add_consultation(&self, consultation: Consultation) -> Result<()> {
        let mut list = self.consultations()?;
        list.insert(0, consultation);
        // newest-first, so truncate drops the oldest
        list.truncate(CONSULTATION_CAPACITY);
        self.write_slot(CONSULTATIONS_KEY, &list)
    }

    pub fn consultations(&self) -> Result<Vec<Consultation>> {
        Ok(self.read_slot(CONSULTATIONS_KEY)?.unwrap_or_default())
    }

    pub fn clear_consultations(&self) -> Result<()> {
        self.backend.remove(CONSULTATIONS_KEY)
    }

    // --- chat transcripts (oldest-first, tail kept, capacity 50/module) ---

    pub fn append_chat_message(&self, module: &str, message: ChatMessage) -> Result<()> {
        let key = chat_key(module);
        let mut transcript: Vec<ChatMessage> = self.read_slot(&key)?.unwrap_or_default();
        transcript.push(message);
        if transcript.len() > CHAT_CAPACITY {
            let excess = transcript.len() - CHAT_CAPACITY;
            transcript.drain(..excess);
        }
        self.write_slot(&key, &transcript)
    }

    pub fn chat_transcript(&self, module: &str) -> Result<Vec<ChatMessage>> {
        Ok(self.read_slot(&chat_key(module))?.unwrap_or_default())
    }

    pub fn clear_chat(&self, module: &str) -> Result<()> {
        self.backend.remove(&chat_key(module))
    }

    // --- search history (most-recent-first, dedup, capacity 20) ---

    /// Record a query. A re-issued query (case-insensitive) moves to the
    /// front instead of duplicating.
    pub fn add_search_query(&self, query: &str) -> Result<()> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(());
        }
        let mut history = self.search_history()?;
        let lowered = query.to_lowercase();
        history.retain(|existing| existing.to_lowercase() != lowered);
        history.insert(0, query.to_string());
        history.truncate(SEARCH_HISTORY_CAPACITY);
        self.write_slot(SEARCH_HISTORY_KEY, &history)
    }

    pub fn search_history(&self) -> Result<Vec<String>> {
        Ok(self.read_slot(SEARCH_HISTORY_KEY)?.unwrap_or_default())
    }

    pub fn clear_search_history(&self) -> Result<()> {
        self.backend.remove(SEARCH_HISTORY_KEY)
    }

    // --- whole-store reset ---

    /// Remove every key under the application prefix.
    pub fn reset_all(&self) -> Result<()> {
        for key in self.backend.keys()? {
            if key.starts_with(KEY_PREFIX) {
                self.backend.remove(&key)?;
            }
        }
        Ok(())
    }

    // --- encode/decode routing ---

    fn codec_for(&self, prefs: &Preferences) -> Result<RecordCodec> {
        match prefs.custom_key.as_deref() {
            Some(encoded) => Ok(RecordCodec::new(keys::parse_hex_key(encoded)?)),
            None => Ok(RecordCodec::with_default_key()),
        }
    }

    fn write_slot<T: Serialize>(&self, key: &str, record: &T) -> Result<()> {
        let prefs = self.preferences()?;
        let codec = self.codec_for(&prefs)?;
        let stored = if prefs.encryption_enabled {
            codec.encode(record)
        } else {
            codec.encode_plain(record)
        };
        self.backend.set(key, &stored)
    }

    fn read_slot<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let Some(stored) = self.backend.get(key)? else {
            return Ok(None);
        };
        let codec = self.codec_for(&self.preferences()?)?;
        match codec.decode::<T>(&stored) {
            Ok(decoded) => Ok(Some(decoded.into_inner())),
            Err(err) => {
                warn!("unreadable record at {key}, treating as absent: {err}");
                Ok(None)
            }
        }
    }
}
