use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const NOTIFY_CONFIDENCE_THRESHOLD: f64 = 80.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationCategory {
    Quantitative,
    Momentum,
    Combined,
}

impl RecommendationCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            RecommendationCategory::Quantitative => "quantitative",
            RecommendationCategory::Momentum => "momentum",
            RecommendationCategory::Combined => "combined",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "quantitative" | "quant" | "量化" | "量化选股" => Some(Self::Quantitative),
            "momentum" | "hot_money" | "hot-money" | "游资" | "游资短线" => Some(Self::Momentum),
            "combined" | "mixed" | "综合" => Some(Self::Combined),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HoldingPeriod {
    Intraday,
    Short,
    Swing,
    Medium,
}

impl HoldingPeriod {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "intraday" | "t+1" | "超短" | "隔日" => Some(Self::Intraday),
            "short" | "short_term" | "短线" | "1周内" => Some(Self::Short),
            "swing" | "波段" | "1-4周" => Some(Self::Swing),
            "medium" | "medium_term" | "中线" | "1-3月" => Some(Self::Medium),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuantSignal {
    pub score: f64,
    #[serde(default)]
    pub factors: Vec<String>,
    #[serde(default)]
    pub valuation: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MomentumSignal {
    #[serde(default)]
    pub limit_up_type: Option<String>,
    #[serde(default)]
    pub continuous_days: Option<u32>,
    #[serde(default)]
    pub dragon_tiger_net_buy: Option<f64>,
    #[serde(default)]
    pub sentiment: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub id: Uuid,
    /// Commit sequence number, strictly increasing in store order. Zero until committed.
    pub seq: u64,
    pub ticket: Option<Uuid>,
    pub code: String,
    pub name: String,
    pub category: RecommendationCategory,
    pub confidence: f64,
    pub target_price: Option<f64>,
    pub entry_price: Option<f64>,
    pub stop_loss: Option<f64>,
    pub holding_period: HoldingPeriod,
    pub reasoning: String,
    pub quant_signal: Option<QuantSignal>,
    pub momentum_signal: Option<MomentumSignal>,
    pub created_at: DateTime<Utc>,
}

impl Recommendation {
    pub fn is_notification_worthy(&self) -> bool {
        self.confidence >= NOTIFY_CONFIDENCE_THRESHOLD
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketAnalysis {
    pub trade_date: Option<String>,
    pub generated_at: DateTime<Utc>,
    pub indices_up: usize,
    pub indices_down: usize,
    pub average_index_change: f64,
    pub limit_up_count: usize,
    pub one_word_count: usize,
    pub max_continuous_days: u32,
    pub dragon_tiger_net_flow: f64,
    pub temperature: f64,
    pub sentiment: String,
    pub headline: String,
}
