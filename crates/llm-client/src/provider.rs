use analysis_core::{GenerationParams, ProviderFamily};
use async_trait::async_trait;

use crate::error::{ProviderError, ProviderResult};

/// One prompt plus the sampling parameters to run it with
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub system_prompt: String,
    pub prompt: String,
    pub params: GenerationParams,
}

impl CompletionRequest {
    pub fn new(
        system_prompt: impl Into<String>,
        prompt: impl Into<String>,
        params: GenerationParams,
    ) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            prompt: prompt.into(),
            params,
        }
    }
}

/// Backend-agnostic text completion.
///
/// Implemented by the Gemini and OpenAI-compatible HTTP clients; the model is
/// passed per call so one client can serve several tiers of its family.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    async fn complete(&self, model: &str, request: &CompletionRequest) -> ProviderResult<String>;

    fn family(&self) -> ProviderFamily;

    fn backend_name(&self) -> &'static str;
}

/// Placeholder keys like `your_api_key_here` and short junk are treated as unset
pub fn is_usable_api_key(key: Option<&str>) -> bool {
    match key.map(str::trim) {
        Some(k) => !k.is_empty() && !k.starts_with("your_") && k.len() > 10,
        None => false,
    }
}

/// Turn a non-2xx response into a `ProviderError::Status`, keeping a short body excerpt
pub(crate) async fn error_for_status(response: reqwest::Response) -> ProviderError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    let message: String = body.chars().take(300).collect();
    ProviderError::Status { status, message }
}
