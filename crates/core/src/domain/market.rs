use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketIndex {
    pub code: String,
    pub name: String,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub current: f64,
    pub pre_close: f64,
    pub change_point: f64,
    pub change_percent: f64,
    /// Traded amount in yuan.
    pub amount: f64,
    /// `amount` of the same code in the previously committed snapshot.
    pub prev_amount: Option<f64>,
    pub volume: f64,
    pub timestamp: DateTime<Utc>,
}

impl MarketIndex {
    pub fn recompute_change(&mut self) {
        if self.pre_close > 0.0 {
            self.change_point = self.current - self.pre_close;
            self.change_percent = change_percent(self.current, self.pre_close);
        } else {
            self.change_point = 0.0;
            self.change_percent = 0.0;
        }
    }

    pub fn amount_change(&self) -> Option<f64> {
        self.prev_amount.map(|prev| self.amount - prev)
    }
}

pub fn change_percent(current: f64, pre_close: f64) -> f64 {
    if pre_close > 0.0 {
        (current - pre_close) / pre_close * 100.0
    } else {
        0.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sentiment {
    Positive,
    Neutral,
    Negative,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImpactLevel {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewsItem {
    pub id: String,
    pub title: String,
    pub summary: String,
    pub source: String,
    pub publish_time: String,
    pub related_codes: Vec<String>,
    pub importance: u8,
    pub sentiment: Sentiment,
    pub impact: ImpactLevel,
}
