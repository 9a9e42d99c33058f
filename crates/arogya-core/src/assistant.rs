//! Request shaping in front of the AI backend
//!
//! One admission check, one cache decision, one gateway call; results
//! are persisted so the UI reads them back after a reload. Collaborators
//! are injected at construction - no ambient singletons.

use std::sync::Arc;
use std::time::Duration;

use arogya_store::{ChatMessage, Consultation, HealthStore, Language};

use crate::cache::{self, CacheOptions, QueryCache};
use crate::gateway::Gateway;
use crate::limiter::{RateLimiter, RatePolicy};
use crate::AssistantError;

/// Operation classes used for admission control.
pub mod op {
    pub const CONSULTATION: &str = "consultation";
    pub const CHAT: &str = "chat";
    pub const SEARCH: &str = "search";
    pub const REFERENCE: &str = "reference";
}

/// Per-minute budgets per operation class.
fn default_limiter() -> RateLimiter {
    const MINUTE: Duration = Duration::from_secs(60);
    RateLimiter::new(RatePolicy::new(5, MINUTE))
        .with_policy(op::CONSULTATION, RatePolicy::new(5, MINUTE))
        .with_policy(op::CHAT, RatePolicy::new(8, MINUTE))
        .with_policy(op::SEARCH, RatePolicy::new(10, MINUTE))
        .with_policy(op::REFERENCE, RatePolicy::new(10, MINUTE))
}

/// Cache keys combine operation, normalized text, and language.
fn cache_key(operation: &str, text: &str, language: Language) -> String {
    let lowered = text.trim().to_lowercase();
    let normalized = lowered.split_whitespace().collect::<Vec<_>>().join(" ");
    format!("{operation}:{normalized}:{}", language.as_str())
}

/// The health assistant's request-shaping layer.
pub struct Assistant {
    store: Arc<HealthStore>,
    gateway: Arc<dyn Gateway>,
    limiter: RateLimiter,
    cache: Arc<QueryCache>,
}

impl Assistant {
    pub fn new(store: Arc<HealthStore>, gateway: Arc<dyn Gateway>) -> Self {
        Self {
            store,
            gateway,
            limiter: default_limiter(),
            cache: Arc::new(QueryCache::new()),
        }
    }

    /// Replace the admission policies (tests, constrained deployments).
    pub fn with_limiter(mut self, limiter: RateLimiter) -> Self {
        self.limiter = limiter;
        self
    }

    /// Submit a symptom description. Write-style: never served from the
    /// cache, but the result lands under the derived lookup key so an
    /// immediate re-read of the same query is instant.
    pub async fn consult(&self, symptoms: &str) -> Result<Consultation, AssistantError> {
        self.limiter.admit(op::CONSULTATION)?;
        let key = cache_key(op::SEARCH, symptoms, self.store.language()?);
        let gateway = Arc::clone(&self.gateway);
        let prompt = symptoms.to_string();

        let text = self
            .cache
            .refresh(&key, CacheOptions::for_mutation(), move || {
                let gateway = Arc::clone(&gateway);
                let prompt = prompt.clone();
                async move { gateway.generate(&prompt).await }
            })
            .await?;

        let consultation = Consultation::new(symptoms, vec![text]);
        self.store.add_consultation(consultation.clone())?;
        Ok(consultation)
    }

    /// Cached read of general health information.
    pub async fn lookup(&self, query: &str) -> Result<String, AssistantError> {
        self.limiter.admit(op::SEARCH)?;
        let key = cache_key(op::SEARCH, query, self.store.language()?);
        let gateway = Arc::clone(&self.gateway);
        let prompt = query.to_string();

        let text = self
            .cache
            .get_or_fetch(&key, CacheOptions::default(), move || {
                let gateway = Arc::clone(&gateway);
                let prompt = prompt.clone();
                async move { gateway.generate(&prompt).await }
            })
            .await?;

        self.store.add_search_query(query)?;
        Ok(text)
    }

    /// Rarely-changing reference content; long staleness window.
    pub async fn reference(&self, topic: &str) -> Result<String, AssistantError> {
        self.limiter.admit(op::REFERENCE)?;
        let key = cache_key(op::REFERENCE, topic, self.store.language()?);
        let gateway = Arc::clone(&self.gateway);
        let prompt = topic.to_string();

        let text = self
            .cache
            .get_or_fetch(&key, CacheOptions::for_reference(), move || {
                let gateway = Arc::clone(&gateway);
                let prompt = prompt.clone();
                async move { gateway.generate(&prompt).await }
            })
            .await?;
        Ok(text)
    }

    /// One chat turn in a feature module. Replies depend on conversation
    /// context, so they are never cached; the transcript is persisted in
    /// both directions.
    pub async fn chat(&self, module: &str, message: &str) -> Result<String, AssistantError> {
        self.limiter.admit(op::CHAT)?;
        self.store
            .append_chat_message(module, ChatMessage::user(message))?;

        let gateway = Arc::clone(&self.gateway);
        let prompt = message.to_string();
        let fetch = move || {
            let gateway = Arc::clone(&gateway);
            let prompt = prompt.clone();
            async move { gateway.generate(&prompt).await }
        };
        let reply = cache::fetch_with_backoff(&CacheOptions::for_mutation(), &fetch).await?;

        self.store
            .append_chat_message(module, ChatMessage::assistant(&reply))?;
        Ok(reply)
    }

    /// Quota left in the current window for an operation class.
    pub fn remaining_quota(&self, class: &str) -> usize {
        self.limiter.remaining(class)
    }

    /// Milliseconds until the class frees a slot; UI wait hints.
    pub fn wait_hint_ms(&self, class: &str) -> u64 {
        self.limiter.ms_until_slot(class)
    }

    /// Localize a failure for display in the configured language.
    pub fn user_message(&self, error: &AssistantError) -> String {
        let language = self.store.language().unwrap_or_default();
        error.localized(language)
    }
}
