//! Collaborators the pipeline talks to but does not own.

use crate::config::parse_code_list;
use crate::domain::recommendation::RecommendationCategory;
use crate::storage::kv::{load_json, save_json, KvStore};
use anyhow::Context;
use std::sync::Arc;
use tokio::sync::Mutex;

#[async_trait::async_trait]
pub trait NotificationGate: Send + Sync {
    async fn notify(&self, code: &str, confidence: f64, category: RecommendationCategory);
}

#[derive(Debug, Default, Clone)]
pub struct TracingNotifier;

#[async_trait::async_trait]
impl NotificationGate for TracingNotifier {
    async fn notify(&self, code: &str, confidence: f64, category: RecommendationCategory) {
        tracing::info!(
            %code,
            confidence,
            category = category.as_str(),
            "high-confidence recommendation"
        );
    }
}

#[async_trait::async_trait]
pub trait Watchlist: Send + Sync {
    async fn list(&self) -> anyhow::Result<Vec<String>>;
}

pub const WATCHLIST_KEY: &str = "watchlist";

pub struct KvWatchlist {
    kv: Arc<dyn KvStore>,
    writer: Mutex<()>,
}

impl KvWatchlist {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self {
            kv,
            writer: Mutex::new(()),
        }
    }

    pub async fn seed_if_empty(&self, seed: &[String]) -> anyhow::Result<bool> {
        let _guard = self.writer.lock().await;
        if load_json::<Vec<String>>(self.kv.as_ref(), WATCHLIST_KEY)
            .await?
            .is_some()
        {
            return Ok(false);
        }
        let codes = sanitize(seed)?;
        save_json(self.kv.as_ref(), WATCHLIST_KEY, &codes)
            .await
            .context("failed to seed watchlist")?;
        tracing::info!(count = codes.len(), "watchlist seeded");
        Ok(true)
    }

    pub async fn add(&self, code: &str) -> anyhow::Result<Vec<String>> {
        let code = validate_code(code)?;
        let _guard = self.writer.lock().await;
        let mut codes = self.load().await?;
        if !codes.iter().any(|c| *c == code) {
            codes.push(code);
            save_json(self.kv.as_ref(), WATCHLIST_KEY, &codes)
                .await
                .context("failed to save watchlist")?;
        }
        Ok(codes)
    }

    pub async fn remove(&self, code: &str) -> anyhow::Result<Vec<String>> {
        let code = validate_code(code)?;
        let _guard = self.writer.lock().await;
        let mut codes = self.load().await?;
        let before = codes.len();
        codes.retain(|c| *c != code);
        if codes.len() != before {
            save_json(self.kv.as_ref(), WATCHLIST_KEY, &codes)
                .await
                .context("failed to save watchlist")?;
        }
        Ok(codes)
    }

    async fn load(&self) -> anyhow::Result<Vec<String>> {
        Ok(load_json(self.kv.as_ref(), WATCHLIST_KEY)
            .await
            .context("failed to load watchlist")?
            .unwrap_or_default())
    }
}

#[async_trait::async_trait]
impl Watchlist for KvWatchlist {
    async fn list(&self) -> anyhow::Result<Vec<String>> {
        self.load().await
    }
}

#[derive(Debug, Clone)]
pub struct StaticWatchlist(pub Vec<String>);

impl StaticWatchlist {
    pub fn parse(s: &str) -> anyhow::Result<Self> {
        Ok(Self(sanitize(&parse_code_list(s))?))
    }
}

#[async_trait::async_trait]
impl Watchlist for StaticWatchlist {
    async fn list(&self) -> anyhow::Result<Vec<String>> {
        Ok(self.0.clone())
    }
}

pub fn validate_code(code: &str) -> anyhow::Result<String> {
    let code = code.trim();
    anyhow::ensure!(
        code.len() == 6 && code.bytes().all(|b| b.is_ascii_digit()),
        "instrument code must be 6 digits (got {code:?})"
    );
    Ok(code.to_string())
}

fn sanitize(codes: &[String]) -> anyhow::Result<Vec<String>> {
    let mut out: Vec<String> = Vec::with_capacity(codes.len());
    for c in codes {
        let c = validate_code(c)?;
        if !out.contains(&c) {
            out.push(c);
        }
    }
    Ok(out)
}
