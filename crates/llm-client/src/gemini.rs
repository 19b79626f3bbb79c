use analysis_core::ProviderFamily;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{ProviderError, ProviderResult};
use crate::provider::{error_for_status, is_usable_api_key, CompletionProvider, CompletionRequest};

pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";

#[derive(Debug, Clone, Serialize)]
struct Part {
    text: String,
}

#[derive(Debug, Clone, Serialize)]
struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'static str>,
    parts: Vec<Part>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    system_instruction: Content,
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Clone, Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct ResponseContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Clone, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<ResponseContent>,
}

#[derive(Debug, Clone, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

/// Client for the native Gemini `generateContent` endpoint
#[derive(Clone)]
pub struct GeminiClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl GeminiClient {
    pub fn new(api_key: String, base_url: String, timeout: Duration) -> ProviderResult<Self> {
        if !is_usable_api_key(Some(&api_key)) {
            return Err(ProviderError::Unavailable(
                "GEMINI_API_KEY missing or placeholder".to_string(),
            ));
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

    fn endpoint(&self, model: &str) -> String {
        format!("{}/v1beta/models/{}:generateContent", self.base_url, model)
    }
}

fn build_body(request: &CompletionRequest) -> GenerateContentRequest {
    GenerateContentRequest {
        system_instruction: Content {
            role: None,
            parts: vec![Part {
                text: request.system_prompt.clone(),
            }],
        },
        contents: vec![Content {
            role: Some("user"),
            parts: vec![Part {
                text: request.prompt.clone(),
            }],
        }],
        generation_config: GenerationConfig {
            temperature: request.params.temperature,
            max_output_tokens: request.params.max_output_tokens,
        },
    }
}

/// Concatenate the text parts of the first candidate
fn extract_text(response: &GenerateContentResponse) -> Option<String> {
    let content = response.candidates.first()?.content.as_ref()?;
    let text: String = content
        .parts
        .iter()
        .filter_map(|p| p.text.as_deref())
        .collect();
    if text.trim().is_empty() {
        None
    } else {
        Some(text)
    }
}

#[async_trait]
impl CompletionProvider for GeminiClient {
    async fn complete(&self, model: &str, request: &CompletionRequest) -> ProviderResult<String> {
        let url = self.endpoint(model);
        tracing::debug!("POST {} ({} prompt chars)", url, request.prompt.len());

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&build_body(request))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(error_for_status(response).await);
        }

        let body: GenerateContentResponse = response.json().await?;
        extract_text(&body).ok_or_else(|| ProviderError::EmptyResponse(format!("gemini/{}", model)))
    }

    fn family(&self) -> ProviderFamily {
        ProviderFamily::Primary
    }

    fn backend_name(&self) -> &'static str {
        "gemini"
    }
}
