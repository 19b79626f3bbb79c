//! Turns raw model output into an `AnalysisResult`.
//!
//! Three stages, each tried only when the previous one produced nothing
//! usable: strict decode, repaired decode, keyword heuristics. Parsing never
//! fails.

use analysis_core::{
    AnalysisResult, ConfidenceLevel, Dashboard, DecisionType, ParseStage, NEUTRAL_SCORE,
};
use serde_json::{Map, Value};

use crate::names::is_placeholder;
use crate::repair;

const POSITIVE_KEYWORDS: &[&str] = &[
    "看多", "买入", "上涨", "突破", "强势", "利好", "加仓", "bullish", "buy", "breakout",
];
const NEGATIVE_KEYWORDS: &[&str] = &[
    "看空", "卖出", "下跌", "跌破", "弱势", "利空", "减仓", "bearish", "sell", "breakdown",
];

/// Keys that mark a decoded object as an analysis document
const DOCUMENT_KEYS: &[&str] = &[
    "sentiment_score",
    "operation_advice",
    "trend_prediction",
    "analysis_summary",
    "dashboard",
];

const SUMMARY_CHARS: usize = 500;

#[derive(Debug, Clone, Copy, Default)]
pub struct ResponseParser;

impl ResponseParser {
    pub fn new() -> Self {
        Self
    }

    /// Parse `raw` into a result for `code`/`name`. `success` is always true;
    /// the stage that produced the fields is recorded in the provenance.
    pub fn parse(&self, raw: &str, code: &str, name: &str) -> AnalysisResult {
        let slice = extract_json_slice(raw);

        if let Some(doc) = slice.as_deref().and_then(decode_strict) {
            return reconcile(&doc, code, name, ParseStage::Strict);
        }

        if let Some(doc) = slice.as_deref().and_then(decode_repaired) {
            tracing::debug!("[{}] response recovered by JSON repair", code);
            return reconcile(&doc, code, name, ParseStage::Repaired);
        }

        tracing::warn!("[{}] no structured document in response, falling back to keywords", code);
        heuristic(raw, code, name)
    }
}

/// Remove code fences and cut from the first `{` to the last `}`.
///
/// A missing closing brace keeps the tail so truncated output can still be
/// repaired.
fn extract_json_slice(raw: &str) -> Option<String> {
    let cleaned = raw.replace("```json", "").replace("```JSON", "").replace("```", "");
    let start = cleaned.find('{')?;
    let slice = match cleaned.rfind('}') {
        Some(end) if end > start => &cleaned[start..=end],
        _ => &cleaned[start..],
    };
    Some(slice.to_string())
}

fn usable(value: Value) -> Option<Map<String, Value>> {
    match value {
        Value::Object(map) if DOCUMENT_KEYS.iter().any(|k| map.contains_key(*k)) => Some(map),
        _ => None,
    }
}

fn decode_strict(slice: &str) -> Option<Map<String, Value>> {
    serde_json::from_str::<Value>(slice).ok().and_then(usable)
}

fn decode_repaired(slice: &str) -> Option<Map<String, Value>> {
    let normalized = repair::normalize(slice);
    serde_json::from_str::<Value>(&normalized)
        .ok()
        .or_else(|| repair::repair(&normalized))
        .and_then(usable)
}

fn text_field(doc: &Map<String, Value>, key: &str) -> Option<String> {
    match doc.get(key)? {
        Value::Null => None,
        Value::String(s) => Some(s.trim().to_string()).filter(|s| !s.is_empty()),
        Value::Array(items) => {
            let joined = items
                .iter()
                .map(|v| match v {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .collect::<Vec<_>>()
                .join("; ");
            Some(joined).filter(|s| !s.is_empty())
        }
        other => Some(other.to_string()),
    }
}

fn text_or_empty(doc: &Map<String, Value>, key: &str) -> String {
    text_field(doc, key).unwrap_or_default()
}

/// Score from a number or a numeric string (`"72"`, `"72分"`), clamped to 0..=100
pub(crate) fn coerce_score(value: Option<&Value>) -> u8 {
    let number = match value {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => {
            let s = s.trim();
            let end = s
                .char_indices()
                .find(|(i, c)| !(c.is_ascii_digit() || *c == '.' || (*i == 0 && *c == '-')))
                .map(|(i, _)| i)
                .unwrap_or(s.len());
            s[..end].parse::<f64>().ok()
        }
        _ => None,
    };
    match number {
        Some(n) if n.is_finite() => n.round().clamp(0.0, 100.0) as u8,
        _ => NEUTRAL_SCORE,
    }
}

fn reconcile(doc: &Map<String, Value>, code: &str, name: &str, stage: ParseStage) -> AnalysisResult {
    let mut result = AnalysisResult::neutral(code, name);

    if is_placeholder(name, code) {
        if let Some(ai_name) = text_field(doc, "stock_name").filter(|n| !is_placeholder(n, code)) {
            result.name = ai_name;
        }
    }

    result.sentiment_score = coerce_score(doc.get("sentiment_score"));
    if let Some(trend) = text_field(doc, "trend_prediction") {
        result.trend_prediction = trend;
    }
    if let Some(advice) = text_field(doc, "operation_advice") {
        result.operation_advice = advice;
    }
    result.decision_type = text_field(doc, "decision_type")
        .and_then(|d| DecisionType::parse(&d))
        .unwrap_or_else(|| DecisionType::from_advice(&result.operation_advice));
    result.confidence_level = text_field(doc, "confidence_level")
        .and_then(|c| ConfidenceLevel::parse(&c))
        .unwrap_or_default();

    result.dashboard = doc.get("dashboard").and_then(Dashboard::from_value);

    result.trend_analysis = text_or_empty(doc, "trend_analysis");
    result.short_term_outlook = text_or_empty(doc, "short_term_outlook");
    result.medium_term_outlook = text_or_empty(doc, "medium_term_outlook");
    result.technical_analysis = text_or_empty(doc, "technical_analysis");
    result.ma_analysis = text_or_empty(doc, "ma_analysis");
    result.volume_analysis = text_or_empty(doc, "volume_analysis");
    result.pattern_analysis = text_or_empty(doc, "pattern_analysis");
    result.fundamental_analysis = text_or_empty(doc, "fundamental_analysis");
    result.sector_position = text_or_empty(doc, "sector_position");
    result.company_highlights = text_or_empty(doc, "company_highlights");
    result.news_summary = text_or_empty(doc, "news_summary");
    result.market_sentiment = text_or_empty(doc, "market_sentiment");
    result.hot_topics = text_or_empty(doc, "hot_topics");
    result.analysis_summary = text_field(doc, "analysis_summary").unwrap_or_else(|| "分析完成".to_string());
    result.key_points = text_or_empty(doc, "key_points");
    result.risk_warning = text_or_empty(doc, "risk_warning");
    result.buy_reason = text_or_empty(doc, "buy_reason");
    result.data_sources = text_or_empty(doc, "data_sources");

    result.provenance.parse_stage = Some(stage);
    result
}

fn count_keywords(text: &str, keywords: &[&str]) -> usize {
    keywords.iter().filter(|k| text.contains(*k)).count()
}

/// Verdict from keyword counts alone; confidence is always low
fn heuristic(raw: &str, code: &str, name: &str) -> AnalysisResult {
    let lowered = raw.to_lowercase();
    let positive = count_keywords(&lowered, POSITIVE_KEYWORDS);
    let negative = count_keywords(&lowered, NEGATIVE_KEYWORDS);

    let (score, trend, advice, decision) = if positive > negative + 1 {
        (65, "看多", "买入", DecisionType::Buy)
    } else if negative > positive + 1 {
        (35, "看空", "卖出", DecisionType::Sell)
    } else {
        (NEUTRAL_SCORE, "震荡", "持有", DecisionType::Hold)
    };

    let summary: String = raw.trim().chars().take(SUMMARY_CHARS).collect();
    let mut result = AnalysisResult::neutral(code, name);
    result.sentiment_score = score;
    result.trend_prediction = trend.to_string();
    result.operation_advice = advice.to_string();
    result.decision_type = decision;
    result.confidence_level = ConfidenceLevel::Low;
    result.analysis_summary = if summary.is_empty() {
        "模型未返回可解析内容".to_string()
    } else {
        summary
    };
    result.key_points = "JSON解析失败，仅供参考".to_string();
    result.risk_warning = "分析结果可能不准确，建议结合其他信息判断".to_string();
    result.provenance.parse_stage = Some(ParseStage::Heuristic);
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(raw: &str) -> AnalysisResult {
        ResponseParser::new().parse(raw, "600519", "贵州茅台")
    }

    #[test]
    fn test_minimal_document_inside_commentary() {
        let raw = "好的，以下是分析结果：\n{\"sentiment_score\": 72, \"operation_advice\": \"买入\"}\n以上仅供参考。";
        let r = parse(raw);
        assert_eq!(r.provenance.parse_stage, Some(ParseStage::Strict));
        assert_eq!(r.sentiment_score, 72);
        assert_eq!(r.decision_type, DecisionType::Buy);
        assert_eq!(r.trend_prediction, "震荡");
        assert_eq!(r.confidence_level, ConfidenceLevel::Medium);
        assert!(r.success);
    }

    #[test]
    fn test_full_document_is_taken_verbatim() {
        let doc = json!({
            "stock_name": "贵州茅台",
            "sentiment_score": 81,
            "trend_prediction": "看多",
            "operation_advice": "加仓",
            "decision_type": "buy",
            "confidence_level": "高",
            "dashboard": {
                "core_conclusion": {
                    "one_sentence": "缩量回踩MA5，可分批低吸",
                    "signal_type": "🟢买入信号",
                    "position_advice": {"no_position": "1760附近建仓", "has_position": "继续持有"}
                },
                "battle_plan": {
                    "sniper_points": {"ideal_buy": 1760, "stop_loss": "1700元"},
                    "action_checklist": ["✅ 多头排列", "⚠️ 乖离率偏高"]
                }
            },
            "analysis_summary": "多头排列，量能温和。",
            "key_points": "趋势向上",
            "risk_warning": "注意估值",
            "search_performed": true
        });
        let raw = format!("```json\n{}\n```", serde_json::to_string_pretty(&doc).unwrap());
        let r = parse(&raw);

        assert_eq!(r.provenance.parse_stage, Some(ParseStage::Strict));
        assert_eq!(r.sentiment_score, 81);
        assert_eq!(r.trend_prediction, "看多");
        assert_eq!(r.operation_advice, "加仓");
        assert_eq!(r.decision_type, DecisionType::Buy);
        assert_eq!(r.confidence_level, ConfidenceLevel::High);
        assert_eq!(r.analysis_summary, "多头排列，量能温和。");
        assert_eq!(r.risk_warning, "注意估值");
        assert_eq!(r.core_conclusion(), "缩量回踩MA5，可分批低吸");
        assert_eq!(r.checklist().len(), 2);
        let expected = Dashboard::from_value(&doc["dashboard"]).unwrap();
        assert_eq!(r.dashboard, Some(expected));
    }

    #[test]
    fn test_trailing_commas_and_python_literals_are_repaired() {
        let raw = r#"{"sentiment_score": 40, "operation_advice": "减仓", "search_performed": True, "key_points": "破位",}"#;
        let r = parse(raw);
        assert_eq!(r.provenance.parse_stage, Some(ParseStage::Repaired));
        assert_eq!(r.sentiment_score, 40);
        assert_eq!(r.decision_type, DecisionType::Sell);
        assert_eq!(r.key_points, "破位");
    }

    #[test]
    fn test_truncated_document_is_repaired() {
        let raw = "```json\n{\"sentiment_score\": \"58\", \"trend_prediction\": \"震荡\", \"analysis_summary\": \"等待缩量回";
        let r = parse(raw);
        assert_eq!(r.provenance.parse_stage, Some(ParseStage::Repaired));
        assert_eq!(r.sentiment_score, 58);
        assert_eq!(r.analysis_summary, "等待缩量回");
    }

    #[test]
    fn test_buy_keywords_fall_back_to_heuristic() {
        let raw = "整体看多，建议逢低买入，若放量突破前高可继续跟进。";
        let r = parse(raw);
        assert_eq!(r.provenance.parse_stage, Some(ParseStage::Heuristic));
        assert_eq!(r.decision_type, DecisionType::Buy);
        assert_eq!(r.sentiment_score, 65);
        assert_eq!(r.operation_advice, "买入");
        assert_eq!(r.confidence_level, ConfidenceLevel::Low);
        assert_eq!(r.analysis_summary, raw);
        assert!(r.success);
    }

    #[test]
    fn test_english_bearish_keywords() {
        let r = parse("Bearish setup, SELL into strength before the breakdown.");
        assert_eq!(r.decision_type, DecisionType::Sell);
        assert_eq!(r.sentiment_score, 35);
        assert_eq!(r.trend_prediction, "看空");
    }

    #[test]
    fn test_balanced_keywords_hold() {
        let r = parse("看多的理由是利好，看空的理由是利空。");
        assert_eq!(r.decision_type, DecisionType::Hold);
        assert_eq!(r.sentiment_score, 50);
    }

    #[test]
    fn test_summary_is_capped() {
        let raw = "震".repeat(2000);
        let r = parse(&raw);
        assert_eq!(r.analysis_summary.chars().count(), 500);
    }

    #[test]
    fn test_object_without_analysis_keys_is_not_a_document() {
        let r = parse("{\"foo\": 1} 建议买入，趋势强势，突破在即");
        assert_eq!(r.provenance.parse_stage, Some(ParseStage::Heuristic));
        assert_eq!(r.decision_type, DecisionType::Buy);
    }

    #[test]
    fn test_score_coercion() {
        assert_eq!(coerce_score(Some(&json!(72))), 72);
        assert_eq!(coerce_score(Some(&json!(71.6))), 72);
        assert_eq!(coerce_score(Some(&json!("66分"))), 66);
        assert_eq!(coerce_score(Some(&json!(140))), 100);
        assert_eq!(coerce_score(Some(&json!(-5))), 0);
        assert_eq!(coerce_score(Some(&json!("高"))), 50);
        assert_eq!(coerce_score(Some(&Value::Null)), 50);
        assert_eq!(coerce_score(None), 50);
    }

    #[test]
    fn test_invalid_dashboard_is_dropped() {
        let r = parse(r#"{"sentiment_score": 55, "dashboard": {"core_conclusion": "not an object"}}"#);
        assert_eq!(r.sentiment_score, 55);
        assert!(r.dashboard.is_none());
    }

    #[test]
    fn test_model_name_replaces_placeholder_only() {
        let parser = ResponseParser::new();
        let raw = r#"{"stock_name": "宁德时代", "sentiment_score": 60}"#;
        assert_eq!(parser.parse(raw, "300750", "股票300750").name, "宁德时代");
        assert_eq!(parser.parse(raw, "300750", "CATL").name, "CATL");
    }

    #[test]
    fn test_unknown_decision_type_derives_from_advice() {
        let r = parse(r#"{"operation_advice": "强烈卖出", "decision_type": "panic"}"#);
        assert_eq!(r.decision_type, DecisionType::Sell);
    }
}
