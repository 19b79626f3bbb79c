pub mod error;
pub mod gemini;
pub mod openai;
pub mod provider;

pub use error::{ProviderError, ProviderResult};
pub use gemini::{GeminiClient, DEFAULT_GEMINI_BASE_URL};
pub use openai::{OpenAiClient, DEFAULT_OPENAI_BASE_URL};
pub use provider::{is_usable_api_key, CompletionProvider, CompletionRequest};

use std::sync::Arc;
use std::time::Duration;

/// Credentials, endpoints and model names for both provider families
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub gemini_api_key: Option<String>,
    pub gemini_base_url: String,
    pub gemini_model: String,
    pub gemini_model_fallback: String,
    pub openai_api_key: Option<String>,
    pub openai_base_url: String,
    pub openai_model: String,
    /// Hard bound on a single HTTP call
    pub request_timeout: Duration,
}

fn env_non_empty(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            gemini_api_key: None,
            gemini_base_url: DEFAULT_GEMINI_BASE_URL.to_string(),
            gemini_model: "gemini-3-flash-preview".to_string(),
            gemini_model_fallback: "gemini-2.5-flash".to_string(),
            openai_api_key: None,
            openai_base_url: DEFAULT_OPENAI_BASE_URL.to_string(),
            openai_model: "gpt-4o-mini".to_string(),
            request_timeout: Duration::from_secs(120),
        }
    }
}

impl ProviderConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            gemini_api_key: env_non_empty("GEMINI_API_KEY"),
            gemini_base_url: env_non_empty("GEMINI_BASE_URL").unwrap_or(defaults.gemini_base_url),
            gemini_model: env_non_empty("GEMINI_MODEL").unwrap_or(defaults.gemini_model),
            gemini_model_fallback: env_non_empty("GEMINI_MODEL_FALLBACK")
                .unwrap_or(defaults.gemini_model_fallback),
            openai_api_key: env_non_empty("OPENAI_API_KEY"),
            openai_base_url: env_non_empty("OPENAI_BASE_URL").unwrap_or(defaults.openai_base_url),
            openai_model: env_non_empty("OPENAI_MODEL").unwrap_or(defaults.openai_model),
            request_timeout: env_non_empty("LLM_REQUEST_TIMEOUT")
                .and_then(|v| v.parse::<u64>().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.request_timeout),
        }
    }

    pub fn has_gemini(&self) -> bool {
        is_usable_api_key(self.gemini_api_key.as_deref())
    }

    pub fn has_openai(&self) -> bool {
        is_usable_api_key(self.openai_api_key.as_deref())
    }

    /// Gemini client, or `None` when the key is unusable or the client fails to build
    pub fn build_gemini(&self) -> Option<Arc<dyn CompletionProvider>> {
        let key = self.gemini_api_key.clone().filter(|_| self.has_gemini())?;
        match GeminiClient::new(key, self.gemini_base_url.clone(), self.request_timeout) {
            Ok(client) => {
                tracing::info!("Gemini client ready (model: {})", self.gemini_model);
                Some(Arc::new(client))
            }
            Err(e) => {
                tracing::warn!("Gemini client unavailable: {}", e);
                None
            }
        }
    }

    /// OpenAI-compatible client, or `None` when not configured
    pub fn build_openai(&self) -> Option<Arc<dyn CompletionProvider>> {
        let key = self.openai_api_key.clone().filter(|_| self.has_openai())?;
        match OpenAiClient::new(key, self.openai_base_url.clone(), self.request_timeout) {
            Ok(client) => {
                tracing::info!(
                    "OpenAI-compatible client ready (base_url: {}, model: {})",
                    self.openai_base_url,
                    self.openai_model
                );
                Some(Arc::new(client))
            }
            Err(e) => {
                tracing::warn!("OpenAI-compatible client unavailable: {}", e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unconfigured_builds_nothing() {
        let cfg = ProviderConfig::default();
        assert!(!cfg.has_gemini());
        assert!(cfg.build_gemini().is_none());
        assert!(cfg.build_openai().is_none());
    }

    #[test]
    fn test_configured_gemini_builds() {
        let cfg = ProviderConfig {
            gemini_api_key: Some("AIzaSyD-0123456789abcdef".into()),
            ..Default::default()
        };
        let client = cfg.build_gemini().unwrap();
        assert_eq!(client.backend_name(), "gemini");
        assert!(cfg.build_openai().is_none());
    }
}
