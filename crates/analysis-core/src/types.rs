use serde::{Deserialize, Serialize};

/// Daily OHLCV quote with the moving averages the trend model relies on
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DailyQuote {
    #[serde(default)]
    pub open: Option<f64>,
    #[serde(default)]
    pub high: Option<f64>,
    #[serde(default)]
    pub low: Option<f64>,
    #[serde(default)]
    pub close: Option<f64>,
    /// Percent change vs previous close
    #[serde(default)]
    pub pct_chg: Option<f64>,
    #[serde(default)]
    pub volume: Option<f64>,
    #[serde(default)]
    pub amount: Option<f64>,
    #[serde(default)]
    pub ma5: Option<f64>,
    #[serde(default)]
    pub ma10: Option<f64>,
    #[serde(default)]
    pub ma20: Option<f64>,
    #[serde(default)]
    pub volume_ratio: Option<f64>,
}

/// Intraday snapshot from a realtime quote source
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RealtimeQuote {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub price: Option<f64>,
    #[serde(default)]
    pub volume_ratio: Option<f64>,
    #[serde(default)]
    pub volume_ratio_desc: Option<String>,
    #[serde(default)]
    pub turnover_rate: Option<f64>,
    #[serde(default)]
    pub pe_ratio: Option<f64>,
    #[serde(default)]
    pub pb_ratio: Option<f64>,
    /// Total market value
    #[serde(default)]
    pub total_mv: Option<f64>,
    /// Circulating market value
    #[serde(default)]
    pub circ_mv: Option<f64>,
    #[serde(default)]
    pub change_60d: Option<f64>,
}

/// Cost distribution of holders (chip distribution)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChipDistribution {
    /// Fraction of holders in profit, 0.0 to 1.0
    #[serde(default)]
    pub profit_ratio: f64,
    #[serde(default)]
    pub avg_cost: Option<f64>,
    #[serde(default)]
    pub concentration_90: f64,
    #[serde(default)]
    pub concentration_70: f64,
    #[serde(default)]
    pub chip_status: Option<String>,
}

/// Output of the rule-based trend model, computed upstream
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrendSnapshot {
    #[serde(default)]
    pub trend_status: Option<String>,
    #[serde(default)]
    pub ma_alignment: Option<String>,
    #[serde(default)]
    pub trend_strength: f64,
    /// Bias of price vs MA5, in percent
    #[serde(default)]
    pub bias_ma5: f64,
    #[serde(default)]
    pub bias_ma10: f64,
    #[serde(default)]
    pub volume_status: Option<String>,
    #[serde(default)]
    pub volume_trend: Option<String>,
    #[serde(default)]
    pub buy_signal: Option<String>,
    #[serde(default)]
    pub signal_score: f64,
    #[serde(default)]
    pub signal_reasons: Vec<String>,
    #[serde(default)]
    pub risk_factors: Vec<String>,
}

/// Everything the caller knows about one instrument at analysis time.
///
/// Built by the data layer and only read by the orchestrator.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnalysisContext {
    pub code: String,
    #[serde(default)]
    pub stock_name: Option<String>,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub today: Option<DailyQuote>,
    #[serde(default)]
    pub ma_status: Option<String>,
    #[serde(default)]
    pub realtime: Option<RealtimeQuote>,
    #[serde(default)]
    pub chip: Option<ChipDistribution>,
    #[serde(default)]
    pub trend_analysis: Option<TrendSnapshot>,
    /// Volume today vs yesterday, as a multiple
    #[serde(default)]
    pub volume_change_ratio: Option<f64>,
    #[serde(default)]
    pub price_change_ratio: Option<f64>,
    /// Pre-fetched news search results
    #[serde(default)]
    pub news_context: Option<String>,
    /// Set when upstream quote sources failed and the tables are mostly N/A
    #[serde(default)]
    pub data_missing: bool,
}

impl AnalysisContext {
    pub fn new(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            ..Default::default()
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.stock_name = Some(name.into());
        self
    }

    pub fn with_news(mut self, news: impl Into<String>) -> Self {
        self.news_context = Some(news.into());
        self
    }

    /// True when a non-empty news block was supplied
    pub fn has_news(&self) -> bool {
        self.news_context
            .as_deref()
            .map(|n| !n.trim().is_empty())
            .unwrap_or(false)
    }
}

/// Sampling parameters forwarded to every provider
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GenerationParams {
    pub temperature: f32,
    pub max_output_tokens: u32,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            max_output_tokens: 8192,
        }
    }
}

/// Backend API surface a target belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderFamily {
    /// Native generative-model API (Gemini)
    Primary,
    /// OpenAI-compatible chat completions
    Secondary,
}

impl ProviderFamily {
    pub fn label(&self) -> &'static str {
        match self {
            ProviderFamily::Primary => "gemini",
            ProviderFamily::Secondary => "openai",
        }
    }
}

/// One concrete (family, model) pair the cascade can attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderTarget {
    pub family: ProviderFamily,
    pub model_name: String,
    pub is_fallback_tier: bool,
}

impl ProviderTarget {
    pub fn new(family: ProviderFamily, model_name: impl Into<String>) -> Self {
        Self {
            family,
            model_name: model_name.into(),
            is_fallback_tier: false,
        }
    }

    pub fn fallback(family: ProviderFamily, model_name: impl Into<String>) -> Self {
        Self {
            family,
            model_name: model_name.into(),
            is_fallback_tier: true,
        }
    }
}

impl std::fmt::Display for ProviderTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.family.label(), self.model_name)?;
        if self.is_fallback_tier {
            write!(f, " (fallback)")?;
        }
        Ok(())
    }
}

/// Coarse decision used for statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecisionType {
    Buy,
    #[default]
    Hold,
    Sell,
}

impl DecisionType {
    /// Map a free-form operation advice (Chinese or English) onto a decision
    pub fn from_advice(advice: &str) -> Self {
        let advice = advice.trim();
        match advice {
            "买入" | "加仓" | "强烈买入" => return DecisionType::Buy,
            "卖出" | "减仓" | "强烈卖出" => return DecisionType::Sell,
            _ => {}
        }
        match advice.to_lowercase().as_str() {
            "buy" | "strong buy" | "add" | "accumulate" => DecisionType::Buy,
            "sell" | "strong sell" | "reduce" | "trim" => DecisionType::Sell,
            _ => DecisionType::Hold,
        }
    }

    /// Parse an explicit decision label; unknown labels yield `None`
    pub fn parse(label: &str) -> Option<Self> {
        match label.trim().to_lowercase().as_str() {
            "buy" => Some(DecisionType::Buy),
            "hold" => Some(DecisionType::Hold),
            "sell" => Some(DecisionType::Sell),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DecisionType::Buy => "buy",
            DecisionType::Hold => "hold",
            DecisionType::Sell => "sell",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfidenceLevel {
    High,
    #[default]
    Medium,
    Low,
}

impl ConfidenceLevel {
    pub fn parse(label: &str) -> Option<Self> {
        match label.trim() {
            "高" => Some(ConfidenceLevel::High),
            "中" => Some(ConfidenceLevel::Medium),
            "低" => Some(ConfidenceLevel::Low),
            other => match other.to_lowercase().as_str() {
                "high" => Some(ConfidenceLevel::High),
                "medium" | "mid" => Some(ConfidenceLevel::Medium),
                "low" => Some(ConfidenceLevel::Low),
                _ => None,
            },
        }
    }

    /// Label in the report language
    pub fn label(&self) -> &'static str {
        match self {
            ConfidenceLevel::High => "高",
            ConfidenceLevel::Medium => "中",
            ConfidenceLevel::Low => "低",
        }
    }

    pub fn stars(&self) -> &'static str {
        match self {
            ConfidenceLevel::High => "⭐⭐⭐",
            ConfidenceLevel::Medium => "⭐⭐",
            ConfidenceLevel::Low => "⭐",
        }
    }
}
