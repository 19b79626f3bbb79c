use analysis_core::ProviderFamily;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{ProviderError, ProviderResult};
use crate::provider::{error_for_status, is_usable_api_key, CompletionProvider, CompletionRequest};

pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

#[derive(Debug, Clone, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Clone, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Clone, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

/// Client for any OpenAI-compatible `/chat/completions` endpoint
/// (OpenAI, DeepSeek, Qwen, Moonshot, ...)
#[derive(Clone)]
pub struct OpenAiClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl OpenAiClient {
    pub fn new(api_key: String, base_url: String, timeout: Duration) -> ProviderResult<Self> {
        if !is_usable_api_key(Some(&api_key)) {
            return Err(ProviderError::Unavailable(
                "OPENAI_API_KEY missing or placeholder".to_string(),
            ));
        }
        if !base_url.starts_with("http") {
            return Err(ProviderError::Unavailable(format!(
                "OPENAI_BASE_URL is not an http(s) URL: {}",
                base_url
            )));
        }
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProviderError::Unavailable(format!("HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }
}

fn build_body<'a>(model: &'a str, request: &'a CompletionRequest) -> ChatCompletionRequest<'a> {
    ChatCompletionRequest {
        model,
        messages: vec![
            ChatMessage {
                role: "system",
                content: &request.system_prompt,
            },
            ChatMessage {
                role: "user",
                content: &request.prompt,
            },
        ],
        temperature: request.params.temperature,
        max_tokens: request.params.max_output_tokens,
    }
}

fn extract_text(response: ChatCompletionResponse) -> Option<String> {
    response
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .filter(|t| !t.trim().is_empty())
}

#[async_trait]
impl CompletionProvider for OpenAiClient {
    async fn complete(&self, model: &str, request: &CompletionRequest) -> ProviderResult<String> {
        let url = format!("{}/chat/completions", self.base_url);
        tracing::debug!("POST {} model={}", url, model);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&build_body(model, request))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(error_for_status(response).await);
        }

        let body: ChatCompletionResponse = response.json().await?;
        extract_text(body).ok_or_else(|| ProviderError::EmptyResponse(format!("openai/{}", model)))
    }

    fn family(&self) -> ProviderFamily {
        ProviderFamily::Secondary
    }

    fn backend_name(&self) -> &'static str {
        "openai"
    }
}
