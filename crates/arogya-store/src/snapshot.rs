//! Export/import snapshot
//!
//! The snapshot is always plain JSON so an export stays portable across
//! devices and key changes. Import parses the whole payload before any
//! write happens, then replays records through the normal save paths so
//! the current encryption settings apply.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::records::{Consultation, HealthProfile, Language};
use crate::store::HealthStore;
use crate::{Result, StoreError};

/// Portable snapshot of one device's data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub profile: Option<HealthProfile>,
    pub consultations: Vec<Consultation>,
    pub search_history: Vec<String>,
    pub language: Language,
    pub exported_at: DateTime<Utc>,
}

impl HealthStore {
    /// Produce a plaintext snapshot of profile, consultations, search
    /// history, and language.
    pub fn export_snapshot(&self) -> Result<String> {
        let snapshot = Snapshot {
            profile: self.profile()?,
            consultations: self.consultations()?,
            search_history: self.search_history()?,
            language: self.language()?,
            exported_at: Utc::now(),
        };
        Ok(serde_json::to_string_pretty(&snapshot)?)
    }

    /// Replace the store's contents with a snapshot.
    ///
    /// The payload is validated as a whole first; a malformed payload
    /// leaves every existing record untouched.
    pub fn import_snapshot(&self, payload: &str) -> Result<()> {
        let snapshot: Snapshot = serde_json::from_str(payload)
            .map_err(|err| StoreError::InvalidImport(err.to_string()))?;

        self.clear_consultations()?;
        self.clear_search_history()?;
        if let Some(profile) = &snapshot.profile {
            self.save_profile(profile)?;
        } else {
            self.clear_profile()?;
        }

        // Replay oldest-first so ordering and capacity rules come out as
        // they were on the exporting device.
        for consultation in snapshot.consultations.into_iter().rev() {
            self.add_consultation(consultation)?;
        }
        for query in snapshot.search_history.into_iter().rev() {
            self.add_search_query(&query)?;
        }
        self.set_language(snapshot.language)?;
        Ok(())
    }
}
