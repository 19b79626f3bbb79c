//! analyzer-cli: run the AI decision dashboard over one or more instruments.
//!
//! Contexts come from JSON files (one `AnalysisContext` or an array of them),
//! bare codes, or the built-in demo. Results are written as a JSON array.
//!
//! Usage:
//!   cargo run -p analyzer-cli -- --contexts ctx/600519.json ctx/batch.json
//!   cargo run -p analyzer-cli -- --codes 600519 AAPL 00700 --out results.json
//!   cargo run -p analyzer-cli -- --demo
//!   cargo run -p analyzer-cli -- --check

use analysis_core::{AnalysisContext, AnalysisResult, DailyQuote, RealtimeQuote, TrendSnapshot};
use analysis_orchestrator::{AnalysisOrchestrator, AnalyzerConfig};
use anyhow::Context;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn init_logging() {
    let json_logging = std::env::var("RUST_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "analyzer_cli=info,analysis_orchestrator=info,llm_client=info".into());

    if json_logging {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

/// Values following `flag` up to the next `--option`
fn flag_values<'a>(args: &'a [String], flag: &str) -> Vec<&'a str> {
    match args.iter().position(|a| a == flag) {
        Some(idx) => args[idx + 1..]
            .iter()
            .take_while(|a| !a.starts_with("--"))
            .map(|s| s.as_str())
            .collect(),
        None => Vec::new(),
    }
}

fn flag_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .map(|s| s.as_str())
}

/// A single context object or an array of them
fn parse_contexts(raw: &str) -> anyhow::Result<Vec<AnalysisContext>> {
    let value: serde_json::Value = serde_json::from_str(raw)?;
    let contexts = if value.is_array() {
        serde_json::from_value(value)?
    } else {
        vec![serde_json::from_value(value)?]
    };
    Ok(contexts)
}

fn load_contexts(path: &str) -> anyhow::Result<Vec<AnalysisContext>> {
    let raw = std::fs::read_to_string(path).with_context(|| format!("reading {}", path))?;
    parse_contexts(&raw).with_context(|| format!("parsing {}", path))
}

fn parse_delay(raw: &str) -> anyhow::Result<Duration> {
    let secs: f64 = raw.parse().context("--delay expects seconds")?;
    Duration::try_from_secs_f64(secs).context("--delay expects non-negative seconds")
}

fn demo_context() -> AnalysisContext {
    let mut ctx = AnalysisContext::new("600519").with_news(
        "贵州茅台发布年度经营数据，营业收入同比增长约15%；公司公告拟实施年度分红。",
    );
    ctx.date = Some("2026-10-16".to_string());
    ctx.ma_status = Some("多头排列".to_string());
    ctx.today = Some(DailyQuote {
        open: Some(1792.0),
        high: Some(1825.0),
        low: Some(1788.5),
        close: Some(1820.5),
        pct_chg: Some(1.62),
        volume: Some(3.2e6),
        amount: Some(5.8e9),
        ma5: Some(1801.2),
        ma10: Some(1786.4),
        ma20: Some(1760.9),
        volume_ratio: Some(0.86),
    });
    ctx.realtime = Some(RealtimeQuote {
        name: Some("贵州茅台".to_string()),
        price: Some(1820.5),
        volume_ratio: Some(0.86),
        volume_ratio_desc: Some("缩量".to_string()),
        turnover_rate: Some(0.25),
        pe_ratio: Some(24.3),
        ..Default::default()
    });
    ctx.trend_analysis = Some(TrendSnapshot {
        trend_status: Some("多头".to_string()),
        ma_alignment: Some("MA5>MA10>MA20".to_string()),
        trend_strength: 72.0,
        bias_ma5: 1.07,
        bias_ma10: 1.91,
        buy_signal: Some("买入".to_string()),
        signal_score: 68.0,
        signal_reasons: vec!["多头排列".to_string(), "缩量回踩MA5".to_string()],
        ..Default::default()
    });
    ctx
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  analyzer-cli --contexts FILE...     Analyse contexts from JSON files");
    eprintln!("  analyzer-cli --codes CODE...        Analyse bare codes (no market data)");
    eprintln!("  analyzer-cli --demo                 Analyse a built-in sample");
    eprintln!("  analyzer-cli --check                Print configuration warnings and exit");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --out PATH         Write results JSON to PATH instead of stdout");
    eprintln!("  --delay SECS       Pause between dispatches (default GEMINI_REQUEST_DELAY)");
    eprintln!("  --workers N        Concurrent analyses (default MAX_WORKERS)");
}

fn log_summary(results: &[AnalysisResult]) {
    for r in results {
        tracing::info!(
            "{} {}({}): {} / {} score={} confidence={}{}",
            r.emoji(),
            r.name,
            r.code,
            r.trend_prediction,
            r.operation_advice,
            r.sentiment_score,
            r.confidence_level.label(),
            r.error_message
                .as_deref()
                .map(|e| format!(" error={}", e))
                .unwrap_or_default()
        );
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_logging();

    let args: Vec<String> = std::env::args().collect();
    let mut config = AnalyzerConfig::from_env().context("invalid analyzer configuration")?;

    if let Some(workers) = flag_value(&args, "--workers") {
        config.max_workers = workers.parse().context("--workers expects a number")?;
    }

    for warning in config.validate() {
        tracing::warn!("{}", warning);
    }

    if args.iter().any(|a| a == "--check") {
        let orchestrator = AnalysisOrchestrator::new(config);
        tracing::info!("AI analysis available: {}", orchestrator.is_available());
        return Ok(());
    }

    let mut contexts = Vec::new();
    for path in flag_values(&args, "--contexts") {
        contexts.extend(load_contexts(path)?);
    }
    contexts.extend(flag_values(&args, "--codes").into_iter().map(AnalysisContext::new));
    if args.iter().any(|a| a == "--demo") {
        contexts.push(demo_context());
    }

    if contexts.is_empty() {
        print_usage();
        std::process::exit(1);
    }

    let delay = match flag_value(&args, "--delay") {
        Some(secs) => parse_delay(secs)?,
        None => config.request_delay,
    };

    let orchestrator = Arc::new(AnalysisOrchestrator::new(config));
    let results = orchestrator.batch_analyze(contexts, delay).await;
    log_summary(&results);

    let json = serde_json::to_string_pretty(&results)?;
    match flag_value(&args, "--out") {
        Some(path) => {
            std::fs::write(path, json).with_context(|| format!("writing {}", path))?;
            tracing::info!("Wrote {} results to {}", results.len(), path);
        }
        None => println!("{}", json),
    }

    Ok(())
}
