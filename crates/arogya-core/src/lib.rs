//! Arogya Core - request shaping between the UI and the AI backend
//!
//! Admission control, result caching with staleness horizons, and the
//! gateway seam to the generative AI service. Everything is an
//! explicitly constructed instance with process lifetime; tests build
//! isolated copies per case.

pub mod assistant;
pub mod cache;
pub mod gateway;
pub mod limiter;

pub use assistant::Assistant;
pub use cache::{CacheOptions, EntryState, QueryCache};
pub use gateway::{Gateway, GatewayError, GeminiClient};
pub use limiter::{RateLimitExceeded, RateLimiter, RatePolicy};

use arogya_store::Language;

/// Anything an assistant operation can fail with.
#[derive(Debug, thiserror::Error)]
pub enum AssistantError {
    #[error("Rate limited: {0}")]
    RateLimited(#[from] RateLimitExceeded),

    #[error("Gateway error: {0}")]
    Gateway(#[from] GatewayError),

    #[error("Store error: {0}")]
    Store(#[from] arogya_store::StoreError),
}

impl AssistantError {
    /// One of a fixed set of user-facing strings in the given language.
    /// Raw error text never crosses this boundary.
    pub fn localized(&self, language: Language) -> String {
        match (self, language) {
            (AssistantError::RateLimited(err), Language::En) => format!(
                "Too many requests. Please wait {} seconds and try again.",
                err.retry_after_secs
            ),
            (AssistantError::RateLimited(err), Language::Te) => format!(
                "చాలా అభ్యర్థనలు వచ్చాయి. దయచేసి {} సెకన్లు వేచి ఉండి మళ్లీ ప్రయత్నించండి.",
                err.retry_after_secs
            ),
            (AssistantError::Gateway(GatewayError::NotConfigured(_)), Language::En) => {
                "The service is not set up yet. Please contact support.".to_string()
            }
            (AssistantError::Gateway(GatewayError::NotConfigured(_)), Language::Te) => {
                "సేవ ఇంకా సిద్ధం కాలేదు. దయచేసి సపోర్ట్‌ను సంప్రదించండి.".to_string()
            }
            (_, Language::En) => "Something went wrong. Please try again.".to_string(),
            (_, Language::Te) => "ఏదో పొరపాటు జరిగింది. దయచేసి మళ్లీ ప్రయత్నించండి.".to_string(),
        }
    }
}
