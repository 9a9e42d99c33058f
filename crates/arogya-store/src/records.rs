//! Record types persisted by the store

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Most recent consultations kept on device
pub const CONSULTATION_CAPACITY: usize = 50;
/// Most recent messages kept per chat module
pub const CHAT_CAPACITY: usize = 50;
/// Most recent search queries kept
pub const SEARCH_HISTORY_CAPACITY: usize = 20;

/// UI language, also selects localized error strings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    En,
    Te,
}

impl Language {
    pub fn as_str(&self) -> &'static str {
        match self {
            Language::En => "en",
            Language::Te => "te",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Gender {
    Male,
    Female,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityLevel {
    Sedentary,
    Light,
    Moderate,
    Active,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DietGoal {
    LoseWeight,
    Maintain,
    GainWeight,
}

/// Singleton per device; overwritten wholesale on save.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthProfile {
    pub age: u32,
    pub gender: Gender,
    pub height_cm: f32,
    pub weight_kg: f32,
    pub conditions: Vec<String>,
    pub medications: Vec<String>,
    pub allergies: Vec<String>,
    pub smoker: bool,
    pub drinks_alcohol: bool,
    pub activity_level: ActivityLevel,
    pub diet_goal: DietGoal,
    pub daily_calorie_target: Option<u32>,
    pub last_updated: DateTime<Utc>,
}

impl HealthProfile {
    pub fn new(age: u32, gender: Gender, height_cm: f32, weight_kg: f32) -> Self {
        Self {
            age,
            gender,
            height_cm,
            weight_kg,
            conditions: vec![],
            medications: vec![],
            allergies: vec![],
            smoker: false,
            drinks_alcohol: false,
            activity_level: ActivityLevel::Moderate,
            diet_goal: DietGoal::Maintain,
            daily_calorie_target: None,
            last_updated: Utc::now(),
        }
    }

    pub fn with_conditions(mut self, conditions: Vec<String>) -> Self {
        self.conditions = conditions;
        self
    }

    pub fn with_medications(mut self, medications: Vec<String>) -> Self {
        self.medications = medications;
        self
    }

    pub fn with_allergies(mut self, allergies: Vec<String>) -> Self {
        self.allergies = allergies;
        self
    }

    /// Body mass index from the stored anthropometrics.
    pub fn bmi(&self) -> Option<f32> {
        if self.height_cm <= 0.0 || self.weight_kg <= 0.0 {
            return None;
        }
        let height_m = self.height_cm / 100.0;
        Some(self.weight_kg / (height_m * height_m))
    }

    /// Refresh the last-updated stamp before saving.
    pub fn touch(&mut self) {
        self.last_updated = Utc::now();
    }
}

/// One symptom consultation and its generated results.
/// Append-only; the store evicts the oldest past capacity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Consultation {
    pub id: Uuid,
    pub symptoms: String,
    pub results: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl Consultation {
    pub fn new(symptoms: impl Into<String>, results: Vec<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            symptoms: symptoms.into(),
            results,
            created_at: Utc::now(),
        }
    }
}

/// Message role within a chat transcript
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

/// A message in a per-module chat transcript
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: Uuid,
    pub role: ChatRole,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(ChatRole::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(ChatRole::Assistant, content)
    }

    fn new(role: ChatRole, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            role,
            content: content.into(),
            created_at: Utc::now(),
        }
    }
}

/// Scalar settings; always stored unencrypted so they can be read before
/// any key material is resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preferences {
    pub language: Language,
    pub encryption_enabled: bool,
    /// Optional personal key (64 hex chars) replacing the default key.
    pub custom_key: Option<String>,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            language: Language::En,
            encryption_enabled: true,
            custom_key: None,
        }
    }
}
