use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HotSource {
    DragonTiger,
    LimitUp,
    ContinuousLimit,
    TopGainers,
}

impl HotSource {
    pub const ALL: [HotSource; 4] = [
        HotSource::DragonTiger,
        HotSource::LimitUp,
        HotSource::ContinuousLimit,
        HotSource::TopGainers,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            HotSource::DragonTiger => "dragon_tiger",
            HotSource::LimitUp => "limit_up",
            HotSource::ContinuousLimit => "continuous_limit",
            HotSource::TopGainers => "top_gainers",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LimitUpType {
    /// 一字板: sealed from the open with almost no turnover.
    OneWord,
    /// T字板: opened at the limit, briefly traded lower, resealed.
    TShape,
    /// 换手板: reached the limit on real turnover.
    Turnover,
}

impl LimitUpType {
    pub fn label(self) -> &'static str {
        match self {
            LimitUpType::OneWord => "一字板",
            LimitUpType::TShape => "T字板",
            LimitUpType::Turnover => "换手板",
        }
    }
}

/// 龙虎榜 entry. Amounts in 万 (ten-thousand yuan), caps in 亿.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DragonTigerItem {
    pub code: String,
    pub name: String,
    pub close_price: f64,
    pub change_percent: f64,
    pub net_buy: f64,
    pub buy_amount: f64,
    pub sell_amount: f64,
    pub turnover_rate: f64,
    pub float_market_cap: f64,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LimitUpItem {
    pub code: String,
    pub name: String,
    pub price: f64,
    pub change_percent: f64,
    pub amount: f64,
    pub float_market_cap: f64,
    pub turnover_rate: f64,
    pub seal_fund: f64,
    pub first_seal_time: String,
    pub last_seal_time: String,
    pub open_count: u32,
    pub continuous_days: u32,
    pub industry: String,
    pub limit_type: LimitUpType,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContinuousLimitItem {
    pub code: String,
    pub name: String,
    pub price: f64,
    pub change_percent: f64,
    pub continuous_days: u32,
    pub open_count: u32,
    pub turnover_rate: f64,
    pub industry: String,
    pub limit_type: LimitUpType,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopGainerItem {
    pub code: String,
    pub name: String,
    pub price: f64,
    pub change_percent: f64,
    pub turnover_rate: f64,
    pub amount: f64,
    pub volume_ratio: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceDiagnostic {
    pub source: HotSource,
    pub ok: bool,
    pub items: usize,
    pub dropped: usize,
    pub elapsed_ms: u64,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HotStockSnapshot {
    pub trade_date: String,
    pub scanned_at: DateTime<Utc>,
    pub dragon_tiger: Vec<DragonTigerItem>,
    pub limit_up: Vec<LimitUpItem>,
    pub continuous_limit: Vec<ContinuousLimitItem>,
    pub top_gainers: Vec<TopGainerItem>,
    pub diagnostics: Vec<SourceDiagnostic>,
}

impl HotStockSnapshot {
    pub fn failed_sources(&self) -> Vec<HotSource> {
        self.diagnostics
            .iter()
            .filter(|d| !d.ok)
            .map(|d| d.source)
            .collect()
    }

    pub fn name_of(&self, code: &str) -> Option<&str> {
        self.limit_up
            .iter()
            .find(|i| i.code == code)
            .map(|i| i.name.as_str())
            .or_else(|| {
                self.continuous_limit
                    .iter()
                    .find(|i| i.code == code)
                    .map(|i| i.name.as_str())
            })
            .or_else(|| {
                self.dragon_tiger
                    .iter()
                    .find(|i| i.code == code)
                    .map(|i| i.name.as_str())
            })
            .or_else(|| {
                self.top_gainers
                    .iter()
                    .find(|i| i.code == code)
                    .map(|i| i.name.as_str())
            })
    }

    pub fn dragon_tiger_by_net_buy(&self) -> Vec<DragonTigerItem> {
        let mut out = self.dragon_tiger.clone();
        out.sort_by(|a, b| {
            b.net_buy
                .partial_cmp(&a.net_buy)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        out
    }
}
