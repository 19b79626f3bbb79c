//! Typed "decision dashboard" returned by the model.
//!
//! A dashboard either decodes completely into these types or is discarded.
//! Only `core_conclusion` is mandatory; the other sections are optional, but
//! any section that is present must have the expected shape.

use serde::{Deserialize, Serialize};

/// A model-supplied figure that may come back as a number or as prose
/// (e.g. `"1820元"` or `"N/A"`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Metric {
    Number(serde_json::Number),
    Text(String),
}

impl Metric {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Metric::Number(n) => n.as_f64(),
            Metric::Text(s) => s.trim().parse().ok(),
        }
    }
}

impl std::fmt::Display for Metric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Metric::Number(n) => write!(f, "{}", n),
            Metric::Text(s) => f.write_str(s),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dashboard {
    pub core_conclusion: CoreConclusion,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_perspective: Option<DataPerspective>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intelligence: Option<Intelligence>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub battle_plan: Option<BattlePlan>,
}

impl Dashboard {
    /// Decode a raw sub-document; anything that does not fit is rejected
    pub fn from_value(value: &serde_json::Value) -> Option<Self> {
        if !value.is_object() {
            return None;
        }
        serde_json::from_value(value.clone()).ok()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CoreConclusion {
    /// One-line verdict
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub one_sentence: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signal_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_sensitivity: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position_advice: Option<PositionAdvice>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PositionAdvice {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub no_position: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub has_position: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DataPerspective {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trend_status: Option<TrendStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price_position: Option<PricePosition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume_analysis: Option<VolumeView>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chip_structure: Option<ChipStructure>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrendStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ma_alignment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_bullish: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trend_score: Option<Metric>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PricePosition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_price: Option<Metric>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ma5: Option<Metric>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ma10: Option<Metric>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ma20: Option<Metric>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bias_ma5: Option<Metric>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bias_status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub support_level: Option<Metric>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resistance_level: Option<Metric>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VolumeView {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume_ratio: Option<Metric>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume_status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub turnover_rate: Option<Metric>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume_meaning: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChipStructure {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profit_ratio: Option<Metric>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avg_cost: Option<Metric>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub concentration: Option<Metric>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chip_health: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Intelligence {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latest_news: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub risk_alerts: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub positive_catalysts: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub earnings_outlook: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sentiment_summary: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BattlePlan {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sniper_points: Option<SniperPoints>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position_strategy: Option<PositionStrategy>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub action_checklist: Vec<String>,
}

/// Concrete price levels for entries, stop and target
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SniperPoints {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ideal_buy: Option<Metric>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secondary_buy: Option<Metric>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_loss: Option<Metric>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub take_profit: Option<Metric>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PositionStrategy {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggested_position: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entry_plan: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub risk_control: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_full_dashboard_round_trips() {
        let raw = json!({
            "core_conclusion": {
                "one_sentence": "缩量回踩MA5，可轻仓介入",
                "signal_type": "🟢买入信号",
                "time_sensitivity": "本周内",
                "position_advice": {"no_position": "MA5附近试仓", "has_position": "继续持有"}
            },
            "data_perspective": {
                "trend_status": {"ma_alignment": "多头排列", "is_bullish": true, "trend_score": 78},
                "price_position": {"current_price": 1820.5, "ma5": 1810, "bias_ma5": 0.58, "bias_status": "安全"},
                "volume_analysis": {"volume_ratio": 0.8, "volume_status": "缩量"},
                "chip_structure": {"profit_ratio": "82%", "chip_health": "一般"}
            },
            "intelligence": {
                "latest_news": "提价落地",
                "risk_alerts": ["获利盘偏高"],
                "positive_catalysts": ["业绩预增"],
                "sentiment_summary": "偏暖"
            },
            "battle_plan": {
                "sniper_points": {"ideal_buy": "1810元", "stop_loss": 1760},
                "position_strategy": {"suggested_position": "3成"},
                "action_checklist": ["✅ 多头排列", "⚠️ 获利盘偏高"]
            }
        });

        let dashboard = Dashboard::from_value(&raw).unwrap();
        assert_eq!(serde_json::to_value(&dashboard).unwrap(), raw);
    }

    #[test]
    fn test_corrupt_section_rejects_dashboard() {
        let raw = json!({
            "core_conclusion": {"one_sentence": "ok"},
            "intelligence": {"risk_alerts": "should be a list"}
        });
        assert!(Dashboard::from_value(&raw).is_none());
    }

    #[test]
    fn test_missing_core_conclusion_rejects_dashboard() {
        let raw = json!({"battle_plan": {"action_checklist": []}});
        assert!(Dashboard::from_value(&raw).is_none());
        assert!(Dashboard::from_value(&json!("dashboard")).is_none());
    }

    #[test]
    fn test_metric_as_f64() {
        assert_eq!(Metric::Text(" 12.5 ".into()).as_f64(), Some(12.5));
        assert_eq!(Metric::Text("N/A".into()).as_f64(), None);
    }
}
