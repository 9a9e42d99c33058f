//! Gateway to the generative AI backend
//!
//! The core hands caller text through verbatim; prompt construction and
//! rendering of the generated text are the UI's business.

use async_trait::async_trait;
use serde_json::{json, Value};
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    #[error("Gateway not configured: {0}")]
    NotConfigured(String),

    #[error("Upstream rejected the request: {0}")]
    Upstream(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Upstream returned no content")]
    EmptyCompletion,
}

impl GatewayError {
    /// Whether a retry could plausibly succeed. A missing credential
    /// never fixes itself.
    pub fn is_transient(&self) -> bool {
        !matches!(self, GatewayError::NotConfigured(_))
    }
}

/// Seam to the AI text service.
#[async_trait]
pub trait Gateway: Send + Sync {
    /// Send prompt text and get the generated text back.
    async fn generate(&self, prompt: &str) -> Result<String, GatewayError>;
}

const API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";
const DEFAULT_MODEL: &str = "gemini-1.5-flash";

/// Gemini generateContent client.
pub struct GeminiClient {
    http: reqwest::Client,
    api_key: String,
    api_url: String,
}

impl GeminiClient {
    pub fn new(api_key: impl Into<String>) -> Result<Self, GatewayError> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(GatewayError::NotConfigured("missing API key".to_string()));
        }
        Ok(Self {
            http: reqwest::Client::new(),
            api_url: format!("{API_BASE}/{DEFAULT_MODEL}:generateContent"),
            api_key,
        })
    }

    pub fn with_model(mut self, model: &str) -> Self {
        self.api_url = format!("{API_BASE}/{model}:generateContent");
        self
    }
}

#[async_trait]
impl Gateway for GeminiClient {
    async fn generate(&self, prompt: &str) -> Result<String, GatewayError> {
        let resp = self
            .http
            .post(&self.api_url)
            .query(&[("key", self.api_key.as_str())])
            .json(&json!({
                "contents": [{ "parts": [{ "text": prompt }] }]
            }))
            .send()
            .await
            .map_err(|e| GatewayError::Network(e.to_string()))?;

        let body: Value = resp
            .json()
            .await
            .map_err(|e| GatewayError::Network(e.to_string()))?;

        if let Some(err) = body.get("error") {
            let message = err["message"].as_str().unwrap_or("unknown upstream error");
            return Err(GatewayError::Upstream(message.to_string()));
        }

        match body["candidates"][0]["content"]["parts"][0]["text"].as_str() {
            Some(text) if !text.trim().is_empty() => Ok(text.to_string()),
            _ => Err(GatewayError::EmptyCompletion),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_api_key_is_a_config_error() {
        assert!(matches!(
            GeminiClient::new("   "),
            Err(GatewayError::NotConfigured(_))
        ));
    }

    #[test]
    fn test_config_errors_are_not_transient() {
        assert!(!GatewayError::NotConfigured("x".to_string()).is_transient());
        assert!(GatewayError::Network("x".to_string()).is_transient());
        assert!(GatewayError::Upstream("x".to_string()).is_transient());
    }

    #[test]
    fn test_model_override_changes_endpoint() {
        let client = GeminiClient::new("test-key").unwrap().with_model("gemini-1.5-pro");
        assert!(client.api_url.contains("gemini-1.5-pro"));
    }
}
