use analysis_core::{
    AnalysisContext, DecisionType, GenerationParams, ParseStage, ProviderFamily, NEUTRAL_SCORE,
};
use analysis_orchestrator::{AnalysisOrchestrator, ProviderCascade, RetryPolicy, Sleeper};
use async_trait::async_trait;
use llm_client::{CompletionProvider, CompletionRequest, ProviderError, ProviderResult};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

type Responder = dyn Fn(&str, &CompletionRequest, usize) -> ProviderResult<String> + Send + Sync;

/// Fake backend: answers through a closure and logs every model it was asked for
struct ScriptedProvider {
    family: ProviderFamily,
    calls: Arc<Mutex<Vec<String>>>,
    responder: Box<Responder>,
    latency: Duration,
    in_flight: AtomicUsize,
    max_in_flight: Arc<AtomicUsize>,
}

impl ScriptedProvider {
    fn new(
        family: ProviderFamily,
        calls: Arc<Mutex<Vec<String>>>,
        responder: impl Fn(&str, &CompletionRequest, usize) -> ProviderResult<String> + Send + Sync + 'static,
    ) -> Self {
        Self {
            family,
            calls,
            responder: Box::new(responder),
            latency: Duration::ZERO,
            in_flight: AtomicUsize::new(0),
            max_in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }
}

#[async_trait]
impl CompletionProvider for ScriptedProvider {
    async fn complete(&self, model: &str, request: &CompletionRequest) -> ProviderResult<String> {
        let call_index = {
            let mut calls = self.calls.lock().unwrap();
            calls.push(model.to_string());
            calls.len() - 1
        };

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        (self.responder)(model, request, call_index)
    }

    fn family(&self) -> ProviderFamily {
        self.family
    }

    fn backend_name(&self) -> &'static str {
        "scripted"
    }
}

/// Records requested waits instead of sleeping
#[derive(Default)]
struct RecordingSleeper {
    waits: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    fn waits(&self) -> Vec<Duration> {
        self.waits.lock().unwrap().clone()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        self.waits.lock().unwrap().push(duration);
    }
}

fn rate_limited() -> ProviderError {
    ProviderError::Status {
        status: 429,
        message: "Resource has been exhausted (e.g. check quota).".into(),
    }
}

fn secs(values: &[u64]) -> Vec<Duration> {
    values.iter().copied().map(Duration::from_secs).collect()
}

fn calls_log() -> Arc<Mutex<Vec<String>>> {
    Arc::new(Mutex::new(Vec::new()))
}

#[tokio::test]
async fn test_always_rate_limited_walks_every_target() {
    let calls = calls_log();
    let primary = ScriptedProvider::new(ProviderFamily::Primary, Arc::clone(&calls), |_, _, _| Err(rate_limited()));
    let secondary =
        ScriptedProvider::new(ProviderFamily::Secondary, Arc::clone(&calls), |_, _, _| Err(rate_limited()));
    let sleeper = Arc::new(RecordingSleeper::default());

    let cascade = ProviderCascade::new(RetryPolicy::new(4, Duration::from_secs(5), Duration::from_secs(60)))
        .with_primary(Arc::new(primary), "A", Some("B".to_string()))
        .with_secondary(Arc::new(secondary), "C");
    let orchestrator =
        AnalysisOrchestrator::with_cascade(cascade, GenerationParams::default()).with_sleeper(sleeper.clone());

    let result = orchestrator.analyze(&AnalysisContext::new("600519")).await;

    assert_eq!(
        *calls.lock().unwrap(),
        vec!["A", "A", "B", "B", "B", "B", "C", "C", "C", "C"]
    );
    assert_eq!(sleeper.waits(), secs(&[5, 5, 10, 20, 5, 10, 20]));

    assert!(!result.success);
    assert_eq!(result.sentiment_score, NEUTRAL_SCORE);
    assert_eq!(result.decision_type, DecisionType::Hold);
    assert_eq!(result.provenance.attempts, 10);
    let message = result.error_message.unwrap();
    assert!(message.contains("429"), "{}", message);
    assert!(result.analysis_summary.starts_with("分析过程出错"));
}

#[tokio::test]
async fn test_no_backend_returns_immediately() {
    let orchestrator = AnalysisOrchestrator::with_cascade(
        ProviderCascade::new(RetryPolicy::default()),
        GenerationParams::default(),
    );
    assert!(!orchestrator.is_available());

    let result = tokio::time::timeout(
        Duration::from_secs(1),
        orchestrator.analyze(&AnalysisContext::new("600519")),
    )
    .await
    .expect("unconfigured analysis must not wait");

    assert!(!result.success);
    assert_eq!(result.sentiment_score, 50);
    assert_eq!(result.trend_prediction, "震荡");
    assert_eq!(result.operation_advice, "持有");
    assert_eq!(result.name, "贵州茅台");
    assert_eq!(result.error_message.as_deref(), Some("no AI backend configured"));
    assert_eq!(result.provenance.attempts, 0);
    assert!(result.provenance.target.is_none());
}

#[tokio::test]
async fn test_fallback_tier_answer_is_recorded() {
    let calls = calls_log();
    let primary = ScriptedProvider::new(ProviderFamily::Primary, Arc::clone(&calls), |model, _, _| {
        if model == "gemini-3-flash-preview" {
            Err(rate_limited())
        } else {
            Ok("```json\n{\"sentiment_score\": 72, \"operation_advice\": \"买入\", \"trend_prediction\": \"看多\"}\n```"
                .to_string())
        }
    });
    let sleeper = Arc::new(RecordingSleeper::default());
    let cascade = ProviderCascade::new(RetryPolicy::default()).with_primary(
        Arc::new(primary),
        "gemini-3-flash-preview",
        Some("gemini-2.5-flash".to_string()),
    );
    let orchestrator =
        AnalysisOrchestrator::with_cascade(cascade, GenerationParams::default()).with_sleeper(sleeper.clone());

    let result = orchestrator.analyze(&AnalysisContext::new("300750")).await;

    assert!(result.success);
    assert_eq!(result.name, "宁德时代");
    assert_eq!(result.sentiment_score, 72);
    assert_eq!(result.decision_type, DecisionType::Buy);
    assert_eq!(result.provenance.parse_stage, Some(ParseStage::Strict));
    assert_eq!(result.provenance.attempts, 3);
    let target = result.provenance.target.unwrap();
    assert_eq!(target.model_name, "gemini-2.5-flash");
    assert!(target.is_fallback_tier);
    assert!(result.provenance.raw_response.unwrap().contains("\"sentiment_score\": 72"));
    assert_eq!(sleeper.waits(), secs(&[5]));
}

#[tokio::test]
async fn test_unavailable_primary_goes_straight_to_secondary() {
    let calls = calls_log();
    let primary = ScriptedProvider::new(ProviderFamily::Primary, Arc::clone(&calls), |_, _, _| {
        Err(ProviderError::Status {
            status: 403,
            message: "API key not valid".into(),
        })
    });
    let secondary = ScriptedProvider::new(ProviderFamily::Secondary, Arc::clone(&calls), |_, _, _| {
        Ok("{\"sentiment_score\": 30, \"operation_advice\": \"减仓\"}".to_string())
    });
    let sleeper = Arc::new(RecordingSleeper::default());
    let cascade = ProviderCascade::new(RetryPolicy::default())
        .with_primary(Arc::new(primary), "A", Some("B".to_string()))
        .with_secondary(Arc::new(secondary), "C");
    let orchestrator =
        AnalysisOrchestrator::with_cascade(cascade, GenerationParams::default()).with_sleeper(sleeper.clone());

    let result = orchestrator.analyze(&AnalysisContext::new("AAPL")).await;

    assert_eq!(*calls.lock().unwrap(), vec!["A", "C"]);
    assert!(sleeper.waits().is_empty());
    assert!(result.success);
    assert_eq!(result.decision_type, DecisionType::Sell);
    assert_eq!(result.provenance.target.unwrap().family, ProviderFamily::Secondary);
}

#[tokio::test]
async fn test_unparseable_answer_still_succeeds() {
    let calls = calls_log();
    let primary = ScriptedProvider::new(ProviderFamily::Primary, calls, |_, _, _| {
        Ok("抱歉，我无法访问实时数据 ¯\\_(ツ)_/¯ }{ ]]".to_string())
    });
    let cascade = ProviderCascade::new(RetryPolicy::default()).with_primary(Arc::new(primary), "A", None);
    let orchestrator = AnalysisOrchestrator::with_cascade(cascade, GenerationParams::default());

    let result = orchestrator.analyze(&AnalysisContext::new("000858")).await;

    assert!(result.success);
    assert_eq!(result.provenance.parse_stage, Some(ParseStage::Heuristic));
    assert_eq!(result.decision_type, DecisionType::Hold);
    assert_eq!(result.confidence_level, analysis_core::ConfidenceLevel::Low);
    assert!(result.analysis_summary.starts_with("抱歉"));
}

#[test]
#[cfg(debug_assertions)]
#[should_panic(expected = "not a secondary backend")]
fn test_client_registered_under_wrong_family() {
    let primary = ScriptedProvider::new(ProviderFamily::Primary, calls_log(), |_, _, _| Ok(String::new()));
    let _ = ProviderCascade::new(RetryPolicy::default()).with_secondary(Arc::new(primary), "C");
}

#[tokio::test]
async fn test_search_flag_follows_supplied_news() {
    let calls = calls_log();
    let primary = ScriptedProvider::new(ProviderFamily::Primary, calls, |_, _, _| {
        Ok("{\"sentiment_score\": 60, \"operation_advice\": \"持有\", \"search_performed\": false}".to_string())
    });
    let cascade = ProviderCascade::new(RetryPolicy::default()).with_primary(Arc::new(primary), "A", None);
    let orchestrator = AnalysisOrchestrator::with_cascade(cascade, GenerationParams::default());

    let with_news = AnalysisContext::new("600519").with_news("茅台公告分红");
    let result = orchestrator.analyze(&with_news).await;
    assert!(result.success);
    assert!(result.provenance.search_performed);

    let result = orchestrator.analyze(&AnalysisContext::new("600519")).await;
    assert!(!result.provenance.search_performed);
}

#[tokio::test]
async fn test_call_timeout_counts_as_transient() {
    let calls = calls_log();
    let primary = ScriptedProvider::new(ProviderFamily::Primary, Arc::clone(&calls), |_, _, index| {
        Ok(format!("{{\"sentiment_score\": {}}}", 60 + index))
    })
    .with_latency(Duration::from_millis(200));
    let policy = RetryPolicy::new(2, Duration::from_secs(1), Duration::from_secs(1))
        .with_call_timeout(Duration::from_millis(20));
    let sleeper = Arc::new(RecordingSleeper::default());
    let cascade = ProviderCascade::new(policy).with_primary(Arc::new(primary), "A", None);
    let orchestrator =
        AnalysisOrchestrator::with_cascade(cascade, GenerationParams::default()).with_sleeper(sleeper.clone());

    let result = orchestrator.analyze(&AnalysisContext::new("600036")).await;

    assert!(!result.success);
    assert_eq!(*calls.lock().unwrap(), vec!["A", "A"]);
    assert_eq!(sleeper.waits(), secs(&[1]));
    assert!(result.error_message.unwrap().contains("Timed out"));
}

#[tokio::test]
async fn test_batch_keeps_order_and_paces_dispatches() {
    let calls = calls_log();
    let codes = ["600519", "000001", "300750", "PANIC", "AAPL"];
    let provider = ScriptedProvider::new(ProviderFamily::Primary, calls, move |_, request, _| {
        if request.prompt.contains("**PANIC**") {
            panic!("provider crashed");
        }
        let score = codes
            .iter()
            .position(|c| request.prompt.contains(&format!("**{}**", c)))
            .map(|i| 10 * (i + 1))
            .unwrap_or(0);
        Ok(format!("{{\"sentiment_score\": {}, \"operation_advice\": \"持有\"}}", score))
    })
    .with_latency(Duration::from_millis(20));
    let max_in_flight = Arc::clone(&provider.max_in_flight);

    let sleeper = Arc::new(RecordingSleeper::default());
    let cascade = ProviderCascade::new(RetryPolicy::default()).with_primary(Arc::new(provider), "A", None);
    let orchestrator = Arc::new(
        AnalysisOrchestrator::with_cascade(cascade, GenerationParams::default())
            .with_max_workers(2)
            .with_sleeper(sleeper.clone()),
    );

    let contexts = codes.iter().map(|c| AnalysisContext::new(*c)).collect();
    let results = orchestrator
        .batch_analyze(contexts, Duration::from_secs(2))
        .await;

    let returned: Vec<&str> = results.iter().map(|r| r.code.as_str()).collect();
    assert_eq!(returned, codes);
    assert_eq!(results[0].sentiment_score, 10);
    assert_eq!(results[1].sentiment_score, 20);
    assert_eq!(results[2].sentiment_score, 30);
    assert_eq!(results[4].sentiment_score, 50);
    assert!(results[0].success && results[4].success);

    assert!(!results[3].success);
    assert_eq!(results[3].sentiment_score, NEUTRAL_SCORE);
    assert!(results[3].error_message.as_deref().unwrap().contains("worker failed"));

    assert_eq!(sleeper.waits(), secs(&[2, 2, 2, 2]));
    assert!(max_in_flight.load(Ordering::SeqCst) <= 2);
}
