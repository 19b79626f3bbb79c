use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::dashboard::{Dashboard, SniperPoints};
use crate::types::{ConfidenceLevel, DecisionType, ProviderTarget};

/// Neutral score used for degraded and undecided results
pub const NEUTRAL_SCORE: u8 = 50;

/// Which parser stage produced the structured fields
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParseStage {
    Strict,
    Repaired,
    Heuristic,
}

/// Where a result came from and how long it took
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Provenance {
    /// Raw completion text, kept for debugging
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_response: Option<String>,
    /// Whether news search context was supplied with the prompt
    pub search_performed: bool,
    /// Target that produced the completion, `None` if no call succeeded
    #[serde(default)]
    pub target: Option<ProviderTarget>,
    /// Provider attempts made, successful one included
    pub attempts: u32,
    pub elapsed_ms: u64,
    pub analyzed_at: DateTime<Utc>,
    #[serde(default)]
    pub parse_stage: Option<ParseStage>,
}

/// Decision-dashboard verdict for a single instrument.
///
/// Always produced, even when every provider failed: failure is expressed
/// through `success` and `error_message`, never by an `Err`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub code: String,
    pub name: String,

    /// 0-100 (>70 strongly bullish, 40-60 range-bound, <40 bearish)
    pub sentiment_score: u8,
    pub trend_prediction: String,
    pub operation_advice: String,
    pub decision_type: DecisionType,
    pub confidence_level: ConfidenceLevel,

    #[serde(default)]
    pub dashboard: Option<Dashboard>,

    // Trend
    #[serde(default)]
    pub trend_analysis: String,
    #[serde(default)]
    pub short_term_outlook: String,
    #[serde(default)]
    pub medium_term_outlook: String,

    // Technicals
    #[serde(default)]
    pub technical_analysis: String,
    #[serde(default)]
    pub ma_analysis: String,
    #[serde(default)]
    pub volume_analysis: String,
    #[serde(default)]
    pub pattern_analysis: String,

    // Fundamentals
    #[serde(default)]
    pub fundamental_analysis: String,
    #[serde(default)]
    pub sector_position: String,
    #[serde(default)]
    pub company_highlights: String,

    // News and sentiment
    #[serde(default)]
    pub news_summary: String,
    #[serde(default)]
    pub market_sentiment: String,
    #[serde(default)]
    pub hot_topics: String,

    // Synthesis
    #[serde(default)]
    pub analysis_summary: String,
    #[serde(default)]
    pub key_points: String,
    #[serde(default)]
    pub risk_warning: String,
    #[serde(default)]
    pub buy_reason: String,
    #[serde(default)]
    pub data_sources: String,

    pub success: bool,
    #[serde(default)]
    pub error_message: Option<String>,
    pub provenance: Provenance,
}

impl AnalysisResult {
    /// Neutral placeholder with every narrative field empty
    pub fn neutral(code: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            name: name.into(),
            sentiment_score: NEUTRAL_SCORE,
            trend_prediction: "震荡".to_string(),
            operation_advice: "持有".to_string(),
            decision_type: DecisionType::Hold,
            confidence_level: ConfidenceLevel::Medium,
            dashboard: None,
            trend_analysis: String::new(),
            short_term_outlook: String::new(),
            medium_term_outlook: String::new(),
            technical_analysis: String::new(),
            ma_analysis: String::new(),
            volume_analysis: String::new(),
            pattern_analysis: String::new(),
            fundamental_analysis: String::new(),
            sector_position: String::new(),
            company_highlights: String::new(),
            news_summary: String::new(),
            market_sentiment: String::new(),
            hot_topics: String::new(),
            analysis_summary: String::new(),
            key_points: String::new(),
            risk_warning: String::new(),
            buy_reason: String::new(),
            data_sources: String::new(),
            success: true,
            error_message: None,
            provenance: Provenance {
                analyzed_at: Utc::now(),
                ..Default::default()
            },
        }
    }

    /// Failed analysis: neutral verdict, low confidence, `success = false`.
    ///
    /// An empty cause is replaced so that `error_message` is never blank.
    pub fn degraded(
        code: impl Into<String>,
        name: impl Into<String>,
        summary: impl Into<String>,
        cause: impl Into<String>,
    ) -> Self {
        let mut cause = cause.into();
        if cause.trim().is_empty() {
            cause = "analysis failed".to_string();
        }
        Self {
            confidence_level: ConfidenceLevel::Low,
            analysis_summary: summary.into(),
            risk_warning: "分析失败，请稍后重试或手动分析".to_string(),
            success: false,
            error_message: Some(cause),
            ..Self::neutral(code, name)
        }
    }

    /// One-line conclusion, preferring the dashboard
    pub fn core_conclusion(&self) -> &str {
        self.dashboard
            .as_ref()
            .and_then(|d| d.core_conclusion.one_sentence.as_deref())
            .unwrap_or(self.analysis_summary.as_str())
    }

    /// Advice for holders or non-holders, falling back to the flat advice
    pub fn position_advice(&self, has_position: bool) -> &str {
        self.dashboard
            .as_ref()
            .and_then(|d| d.core_conclusion.position_advice.as_ref())
            .and_then(|p| {
                if has_position {
                    p.has_position.as_deref()
                } else {
                    p.no_position.as_deref()
                }
            })
            .unwrap_or(self.operation_advice.as_str())
    }

    pub fn sniper_points(&self) -> Option<&SniperPoints> {
        self.dashboard
            .as_ref()
            .and_then(|d| d.battle_plan.as_ref())
            .and_then(|b| b.sniper_points.as_ref())
    }

    pub fn checklist(&self) -> &[String] {
        self.dashboard
            .as_ref()
            .and_then(|d| d.battle_plan.as_ref())
            .map(|b| b.action_checklist.as_slice())
            .unwrap_or(&[])
    }

    pub fn risk_alerts(&self) -> &[String] {
        self.dashboard
            .as_ref()
            .and_then(|d| d.intelligence.as_ref())
            .map(|i| i.risk_alerts.as_slice())
            .unwrap_or(&[])
    }

    pub fn emoji(&self) -> &'static str {
        match self.operation_advice.as_str() {
            "买入" | "加仓" => "🟢",
            "强烈买入" => "💚",
            "持有" => "🟡",
            "观望" => "⚪",
            "减仓" => "🟠",
            "卖出" => "🔴",
            "强烈卖出" => "❌",
            _ => "🟡",
        }
    }

    pub fn confidence_stars(&self) -> &'static str {
        self.confidence_level.stars()
    }
}
