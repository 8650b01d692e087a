use crate::domain::hot_stock::{DragonTigerItem, HotStockSnapshot};
use crate::domain::market::{MarketIndex, NewsItem};
use crate::storage::kv::{load_json, save_json, KvStore};
use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{watch, Mutex};

pub const INDICES_KEY: &str = "market.indices";
pub const NEWS_KEY: &str = "market.news";
pub const HOT_STOCKS_KEY: &str = "market.hot_stocks";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum AuthState {
    Unknown,
    Valid,
    Rejected {
        since: DateTime<Utc>,
        detail: String,
    },
}

pub struct MarketStore {
    kv: Arc<dyn KvStore>,
    writer: Mutex<()>,
    indices: watch::Sender<Arc<Vec<MarketIndex>>>,
    news: watch::Sender<Arc<Vec<NewsItem>>>,
    hot_stocks: watch::Sender<Option<Arc<HotStockSnapshot>>>,
    auth: watch::Sender<AuthState>,
}

impl MarketStore {
    pub async fn load(kv: Arc<dyn KvStore>) -> anyhow::Result<Self> {
        let indices: Vec<MarketIndex> = load_json(kv.as_ref(), INDICES_KEY)
            .await
            .context("failed to load index snapshot")?
            .unwrap_or_default();
        let news: Vec<NewsItem> = load_json(kv.as_ref(), NEWS_KEY)
            .await
            .context("failed to load news pool")?
            .unwrap_or_default();
        let hot: Option<HotStockSnapshot> = load_json(kv.as_ref(), HOT_STOCKS_KEY)
            .await
            .context("failed to load hot-stock snapshot")?;
        tracing::info!(
            indices = indices.len(),
            news = news.len(),
            hot_trade_date = hot.as_ref().map(|s| s.trade_date.as_str()),
            "restored market snapshots"
        );

        Ok(Self {
            kv,
            writer: Mutex::new(()),
            indices: watch::channel(Arc::new(indices)).0,
            news: watch::channel(Arc::new(news)).0,
            hot_stocks: watch::channel(hot.map(Arc::new)).0,
            auth: watch::channel(AuthState::Unknown).0,
        })
    }

    /// Replaces the index list, carrying each code's previous amount forward.
    pub async fn commit_indices(&self, mut fresh: Vec<MarketIndex>) -> anyhow::Result<()> {
        let _guard = self.writer.lock().await;
        {
            let prev = self.indices.borrow();
            let amounts: HashMap<&str, f64> =
                prev.iter().map(|i| (i.code.as_str(), i.amount)).collect();
            for idx in &mut fresh {
                idx.prev_amount = amounts.get(idx.code.as_str()).copied();
            }
        }
        save_json(self.kv.as_ref(), INDICES_KEY, &fresh)
            .await
            .context("failed to persist index snapshot")?;
        self.indices.send_replace(Arc::new(fresh));
        Ok(())
    }

    pub async fn commit_news(&self, items: Vec<NewsItem>) -> anyhow::Result<()> {
        let _guard = self.writer.lock().await;
        save_json(self.kv.as_ref(), NEWS_KEY, &items)
            .await
            .context("failed to persist news pool")?;
        self.news.send_replace(Arc::new(items));
        Ok(())
    }

    // Every commit persists before publishing; on failure readers keep the previous value.
    pub async fn commit_hot_stocks(&self, snapshot: HotStockSnapshot) -> anyhow::Result<()> {
        let _guard = self.writer.lock().await;
        save_json(self.kv.as_ref(), HOT_STOCKS_KEY, &snapshot)
            .await
            .context("failed to persist hot-stock snapshot")?;
        self.hot_stocks.send_replace(Some(Arc::new(snapshot)));
        Ok(())
    }

    pub fn set_auth_state(&self, state: AuthState) {
        self.auth.send_if_modified(|cur| {
            // Keep the first rejection time while the key stays bad.
            let unchanged = matches!(
                (&*cur, &state),
                (AuthState::Rejected { .. }, AuthState::Rejected { .. })
            ) || *cur == state;
            if !unchanged {
                *cur = state;
            }
            !unchanged
        });
    }

    pub fn indices(&self) -> Arc<Vec<MarketIndex>> {
        self.indices.borrow().clone()
    }

    pub fn news(&self) -> Arc<Vec<NewsItem>> {
        self.news.borrow().clone()
    }

    pub fn hot_stocks(&self) -> Option<Arc<HotStockSnapshot>> {
        self.hot_stocks.borrow().clone()
    }

    pub fn dragon_tiger_by_net_buy(&self) -> Vec<DragonTigerItem> {
        self.hot_stocks
            .borrow()
            .as_ref()
            .map(|s| s.dragon_tiger_by_net_buy())
            .unwrap_or_default()
    }

    pub fn auth_state(&self) -> AuthState {
        self.auth.borrow().clone()
    }
}
