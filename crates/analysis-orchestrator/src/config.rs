use analysis_core::GenerationParams;
use llm_client::ProviderConfig;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

use crate::retry::RetryPolicy;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("{var} has an invalid value: {value:?}")]
    InvalidValue { var: &'static str, value: String },
}

/// Everything an `AnalysisOrchestrator` needs, built once and passed in
#[derive(Debug, Clone)]
pub struct AnalyzerConfig {
    pub providers: ProviderConfig,
    pub retry: RetryPolicy,
    pub generation: GenerationParams,
    /// Pause between batch dispatches
    pub request_delay: Duration,
    pub max_workers: usize,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            providers: ProviderConfig::default(),
            retry: RetryPolicy::default(),
            generation: GenerationParams::default(),
            request_delay: Duration::from_secs(2),
            max_workers: 3,
        }
    }
}

fn env_parse<T: FromStr>(var: &'static str) -> Result<Option<T>, ConfigError> {
    match std::env::var(var) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue { var, value: raw }),
        _ => Ok(None),
    }
}

fn env_secs(var: &'static str) -> Result<Option<Duration>, ConfigError> {
    env_parse::<f64>(var)?.map(|secs| secs_to_duration(var, secs)).transpose()
}

/// Negative, NaN and out-of-range values are rejected
fn secs_to_duration(var: &'static str, secs: f64) -> Result<Duration, ConfigError> {
    Duration::try_from_secs_f64(secs).map_err(|_| ConfigError::InvalidValue {
        var,
        value: secs.to_string(),
    })
}

impl AnalyzerConfig {
    /// Read the environment; unset variables keep their defaults, malformed
    /// numbers are an error.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let mut providers = ProviderConfig::from_env();

        let max_retries = env_parse::<u32>("GEMINI_MAX_RETRIES")?.unwrap_or(defaults.retry.max_retries);
        let base_delay = env_secs("GEMINI_RETRY_DELAY")?.unwrap_or(defaults.retry.base_delay);
        let max_delay = env_secs("GEMINI_RETRY_MAX_DELAY")?.unwrap_or(defaults.retry.max_delay);
        let mut retry = RetryPolicy::new(max_retries, base_delay, max_delay);
        if let Some(promote_after) = env_parse::<u32>("GEMINI_PROMOTE_AFTER")? {
            retry = retry.with_promote_after(promote_after);
        }

        if let Some(timeout) = env_secs("LLM_REQUEST_TIMEOUT")? {
            providers.request_timeout = timeout;
        }
        retry = retry.with_call_timeout(providers.request_timeout);

        let generation = GenerationParams {
            temperature: env_parse::<f32>("GEMINI_TEMPERATURE")?.unwrap_or(defaults.generation.temperature),
            max_output_tokens: env_parse::<u32>("LLM_MAX_OUTPUT_TOKENS")?
                .unwrap_or(defaults.generation.max_output_tokens),
        };

        Ok(Self {
            providers,
            retry,
            generation,
            request_delay: env_secs("GEMINI_REQUEST_DELAY")?.unwrap_or(defaults.request_delay),
            max_workers: env_parse::<usize>("MAX_WORKERS")?.unwrap_or(defaults.max_workers),
        })
    }

    /// Human-readable problems that do not prevent startup
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if !self.providers.has_gemini() && !self.providers.has_openai() {
            warnings.push("Neither GEMINI_API_KEY nor OPENAI_API_KEY is configured; AI analysis is disabled".to_string());
        }
        if self.providers.gemini_api_key.is_some() && !self.providers.has_gemini() {
            warnings.push("GEMINI_API_KEY looks like a placeholder and will be ignored".to_string());
        }
        if self.providers.openai_api_key.is_some() && !self.providers.has_openai() {
            warnings.push("OPENAI_API_KEY looks like a placeholder and will be ignored".to_string());
        }
        if self.providers.gemini_model == self.providers.gemini_model_fallback {
            warnings.push(format!(
                "GEMINI_MODEL_FALLBACK equals GEMINI_MODEL ({}); no fallback tier will be used",
                self.providers.gemini_model
            ));
        }
        if self.retry.promote_after >= self.retry.attempts_per_target() && self.retry.max_retries > 0 {
            warnings.push(format!(
                "GEMINI_PROMOTE_AFTER ({}) is not below GEMINI_MAX_RETRIES ({}); the fallback model only runs after the primary is exhausted",
                self.retry.promote_after, self.retry.max_retries
            ));
        }
        if !(0.0..=2.0).contains(&self.generation.temperature) {
            warnings.push(format!(
                "GEMINI_TEMPERATURE {} is outside 0.0..=2.0",
                self.generation.temperature
            ));
        }
        if self.max_workers == 0 {
            warnings.push("MAX_WORKERS is 0; one worker will be used".to_string());
        }

        warnings
    }
}
