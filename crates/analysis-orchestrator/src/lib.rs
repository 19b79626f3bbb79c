use analysis_core::{AnalysisContext, AnalysisResult, GenerationParams};
use chrono::Utc;
use llm_client::CompletionRequest;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;

pub mod cascade;
pub mod config;
pub mod names;
pub mod parser;
pub mod prompt;
pub mod repair;
pub mod retry;

pub use cascade::{CascadeError, CascadeOutcome, CascadeState, ProviderCascade, Transition};
pub use config::{AnalyzerConfig, ConfigError};
pub use names::resolve_name;
pub use parser::ResponseParser;
pub use prompt::{DashboardPromptFormatter, PromptFormatter};
pub use retry::{FailureKind, RetryPolicy, Sleeper, TokioSleeper};

const DISABLED_SUMMARY: &str = "AI 分析功能未启用（未配置 API Key）";

/// Runs one analysis per instrument: prompt, provider cascade, parse.
///
/// `analyze` never returns an error; every failure becomes a degraded
/// `AnalysisResult` with `success = false`.
pub struct AnalysisOrchestrator {
    cascade: ProviderCascade,
    parser: ResponseParser,
    formatter: Arc<dyn PromptFormatter>,
    generation: GenerationParams,
    max_workers: usize,
    request_delay: Duration,
    sleeper: Arc<dyn Sleeper>,
}

impl AnalysisOrchestrator {
    /// Wire up whichever provider families the configuration enables
    pub fn new(config: AnalyzerConfig) -> Self {
        let providers = &config.providers;
        let mut cascade = ProviderCascade::new(config.retry.clone());

        if let Some(gemini) = providers.build_gemini() {
            cascade = cascade.with_primary(
                gemini,
                providers.gemini_model.clone(),
                Some(providers.gemini_model_fallback.clone()),
            );
        }
        if let Some(openai) = providers.build_openai() {
            cascade = cascade.with_secondary(openai, providers.openai_model.clone());
        }

        if cascade.is_available() {
            let chain: Vec<String> = cascade.targets().iter().map(|t| t.to_string()).collect();
            tracing::info!("AI providers: {}", chain.join(" -> "));
        } else {
            tracing::warn!("No AI provider configured; analyses will return neutral results");
        }

        Self::with_cascade(cascade, config.generation)
            .with_max_workers(config.max_workers)
            .with_request_delay(config.request_delay)
    }

    /// Build around an already assembled cascade
    pub fn with_cascade(cascade: ProviderCascade, generation: GenerationParams) -> Self {
        Self {
            cascade,
            parser: ResponseParser::new(),
            formatter: Arc::new(DashboardPromptFormatter),
            generation,
            max_workers: 3,
            request_delay: Duration::from_secs(2),
            sleeper: Arc::new(TokioSleeper),
        }
    }

    pub fn with_formatter(mut self, formatter: Arc<dyn PromptFormatter>) -> Self {
        self.formatter = formatter;
        self
    }

    pub fn with_max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = max_workers.max(1);
        self
    }

    pub fn with_request_delay(mut self, delay: Duration) -> Self {
        self.request_delay = delay;
        self
    }

    /// Used for retry backoff as well as the pause between batch dispatches
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.cascade = self.cascade.with_sleeper(Arc::clone(&sleeper));
        self.sleeper = sleeper;
        self
    }

    /// At least one provider family is configured
    pub fn is_available(&self) -> bool {
        self.cascade.is_available()
    }

    pub fn request_delay(&self) -> Duration {
        self.request_delay
    }

    pub fn max_workers(&self) -> usize {
        self.max_workers
    }

    pub async fn analyze(&self, ctx: &AnalysisContext) -> AnalysisResult {
        let started = Instant::now();
        let name = resolve_name(ctx);

        if !self.cascade.is_available() {
            tracing::warn!("[{}] {} skipped: {}", ctx.code, name, CascadeError::NoProviders);
            let mut result =
                AnalysisResult::degraded(&ctx.code, &name, DISABLED_SUMMARY, CascadeError::NoProviders.to_string());
            result.provenance.elapsed_ms = started.elapsed().as_millis() as u64;
            return result;
        }

        tracing::info!("========== Analyzing {}({}) ==========", name, ctx.code);
        let prompt = self.formatter.format(ctx, &name);
        tracing::debug!("[{}] prompt: {} chars, news: {}", ctx.code, prompt.chars().count(), ctx.has_news());

        let request = CompletionRequest::new(self.formatter.system_prompt(), prompt, self.generation);

        let mut result = match self.cascade.run(&request).await {
            Ok(outcome) => {
                tracing::debug!("[{}] raw response: {}", ctx.code, outcome.text);
                let mut result = self.parser.parse(&outcome.text, &ctx.code, &name);
                result.provenance.raw_response = Some(outcome.text);
                result.provenance.target = Some(outcome.target);
                result.provenance.attempts = outcome.attempts;
                result.provenance.search_performed = ctx.has_news();
                result
            }
            Err(e) => {
                let cause = e.to_string();
                let short: String = cause.chars().take(100).collect();
                let mut result =
                    AnalysisResult::degraded(&ctx.code, &name, format!("分析过程出错: {}", short), cause);
                if let CascadeError::Exhausted { attempts, .. } = e {
                    result.provenance.attempts = attempts;
                }
                result
            }
        };

        result.provenance.elapsed_ms = started.elapsed().as_millis() as u64;
        result.provenance.analyzed_at = Utc::now();

        if result.success {
            tracing::info!(
                "[{}] {} done in {}ms: {} {} (score {}, via {})",
                ctx.code,
                result.name,
                result.provenance.elapsed_ms,
                result.trend_prediction,
                result.operation_advice,
                result.sentiment_score,
                result
                    .provenance
                    .target
                    .as_ref()
                    .map(|t| t.to_string())
                    .unwrap_or_default()
            );
        } else {
            tracing::error!(
                "[{}] {} failed after {} attempts: {}",
                ctx.code,
                result.name,
                result.provenance.attempts,
                result.error_message.as_deref().unwrap_or_default()
            );
        }

        result
    }

    /// Analyse many instruments with at most `max_workers` in flight, waiting
    /// `delay` between dispatches. Results keep the input order.
    pub async fn batch_analyze(self: &Arc<Self>, contexts: Vec<AnalysisContext>, delay: Duration) -> Vec<AnalysisResult> {
        let total = contexts.len();
        let semaphore = Arc::new(Semaphore::new(self.max_workers));
        let mut handles = Vec::with_capacity(total);

        tracing::info!("Batch analysis: {} instruments, {} workers", total, self.max_workers);

        for (i, ctx) in contexts.into_iter().enumerate() {
            if i > 0 && !delay.is_zero() {
                self.sleeper.sleep(delay).await;
            }

            let permit = Arc::clone(&semaphore).acquire_owned().await.ok();
            let code = ctx.code.clone();
            let name = resolve_name(&ctx);
            let orchestrator = Arc::clone(self);

            let handle = tokio::spawn(async move {
                let _permit = permit;
                orchestrator.analyze(&ctx).await
            });
            handles.push((handle, code, name));
        }

        let mut results = Vec::with_capacity(total);
        for (i, (handle, code, name)) in handles.into_iter().enumerate() {
            let result = match handle.await {
                Ok(result) => result,
                Err(e) => {
                    tracing::error!("[{}/{}] {} worker failed: {}", i + 1, total, code, e);
                    AnalysisResult::degraded(
                        &code,
                        &name,
                        "分析过程出错: worker aborted",
                        format!("analysis worker failed: {}", e),
                    )
                }
            };
            results.push(result);
        }

        let ok = results.iter().filter(|r| r.success).count();
        tracing::info!("Batch done: {}/{} succeeded", ok, total);
        results
    }
}
