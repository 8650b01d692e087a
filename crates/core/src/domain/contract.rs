use crate::domain::recommendation::{
    HoldingPeriod, MomentumSignal, QuantSignal, Recommendation, RecommendationCategory,
};
use anyhow::{bail, ensure, Context};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmRecommendation {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    pub category: String,
    pub confidence: f64,
    #[serde(default)]
    pub target_price: Option<f64>,
    #[serde(default)]
    pub entry_price: Option<f64>,
    #[serde(default)]
    pub stop_loss: Option<f64>,
    #[serde(default)]
    pub holding_period: Option<String>,
    pub reasoning: String,
    #[serde(default)]
    pub quant_signal: Option<QuantSignal>,
    #[serde(default)]
    pub momentum_signal: Option<MomentumSignal>,
}

#[derive(Debug, Clone, Default)]
pub struct Expected<'a> {
    pub code: Option<&'a str>,
    pub name: Option<&'a str>,
    pub ticket: Option<Uuid>,
}

impl LlmRecommendation {
    pub fn validate_and_into_recommendation(
        self,
        expected: Expected<'_>,
    ) -> anyhow::Result<Recommendation> {
        let returned_code = self
            .code
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(normalize_code);

        let code = match (expected.code, returned_code) {
            (Some(want), Some(got)) => {
                ensure!(
                    want == got,
                    "LLM output code mismatch: expected {want}, got {got}"
                );
                got
            }
            (Some(want), None) => want.to_string(),
            (None, Some(got)) => got,
            (None, None) => bail!("LLM output is missing the instrument code"),
        };
        ensure!(
            code.len() == 6 && code.bytes().all(|b| b.is_ascii_digit()),
            "LLM output code must be 6 digits (got {code:?})"
        );

        let name = self
            .name
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .or_else(|| expected.name.map(str::to_string))
            .unwrap_or_else(|| code.clone());

        let category = RecommendationCategory::parse(&self.category)
            .with_context(|| format!("unknown recommendation category: {:?}", self.category))?;

        ensure!(
            self.confidence.is_finite() && (0.0..=100.0).contains(&self.confidence),
            "confidence must be between 0 and 100 (got {})",
            self.confidence
        );

        let holding_period = match self.holding_period.as_deref() {
            Some(s) => HoldingPeriod::parse(s)
                .with_context(|| format!("unknown holding period: {s:?}"))?,
            None => HoldingPeriod::Short,
        };

        for (label, v) in [
            ("target_price", self.target_price),
            ("entry_price", self.entry_price),
            ("stop_loss", self.stop_loss),
        ] {
            if let Some(v) = v {
                ensure!(v.is_finite() && v > 0.0, "{label} must be positive (got {v})");
            }
        }

        let reasoning = self.reasoning.trim().to_string();
        ensure!(!reasoning.is_empty(), "reasoning must be non-empty");

        if let Some(q) = &self.quant_signal {
            ensure!(
                (0.0..=100.0).contains(&q.score),
                "quant_signal.score must be between 0 and 100 (got {})",
                q.score
            );
        }

        Ok(Recommendation {
            id: Uuid::new_v4(),
            seq: 0,
            ticket: expected.ticket,
            code,
            name,
            category,
            confidence: self.confidence,
            target_price: self.target_price,
            entry_price: self.entry_price,
            stop_loss: self.stop_loss,
            holding_period,
            reasoning,
            quant_signal: self.quant_signal,
            momentum_signal: self.momentum_signal,
            created_at: Utc::now(),
        })
    }
}

/// Strips exchange prefixes such as `sh600519`, `SZ000001` or `1.600519`.
pub fn normalize_code(raw: &str) -> String {
    let s = raw.trim();
    let s = s.rsplit('.').next().unwrap_or(s);
    let s = s.trim_start_matches(|c: char| c.is_ascii_alphabetic());
    s.to_string()
}
