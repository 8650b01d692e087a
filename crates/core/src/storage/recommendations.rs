use crate::domain::recommendation::{MarketAnalysis, Recommendation};
use crate::storage::kv::{load_json, save_json, KvStore};
use anyhow::Context;
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use uuid::Uuid;

pub const HISTORY_CAP: usize = 20;

pub const RECOMMENDATIONS_KEY: &str = "recommendations.history";
pub const ANALYSIS_KEY: &str = "analysis.history";

fn push_capped<T: Clone>(current: &[T], item: T) -> Vec<T> {
    let mut next = Vec::with_capacity(HISTORY_CAP);
    next.push(item);
    next.extend(current.iter().take(HISTORY_CAP - 1).cloned());
    next
}

/// Bounded recommendation and market-analysis histories.
///
/// Writers are serialized on one async lock and persist before publishing, so a failed KV
/// write leaves the visible history untouched. Readers borrow the last published value and
/// never wait on a writer.
pub struct RecommendationStore {
    kv: Arc<dyn KvStore>,
    // Guards the next sequence number and the persist-then-publish step.
    writer: Mutex<u64>,
    recommendations: watch::Sender<Arc<Vec<Recommendation>>>,
    analyses: watch::Sender<Arc<Vec<MarketAnalysis>>>,
}

impl RecommendationStore {
    pub async fn load(kv: Arc<dyn KvStore>) -> anyhow::Result<Self> {
        let mut recs: Vec<Recommendation> = load_json(kv.as_ref(), RECOMMENDATIONS_KEY)
            .await
            .context("failed to load recommendation history")?
            .unwrap_or_default();
        let mut analyses: Vec<MarketAnalysis> = load_json(kv.as_ref(), ANALYSIS_KEY)
            .await
            .context("failed to load analysis history")?
            .unwrap_or_default();
        recs.truncate(HISTORY_CAP);
        analyses.truncate(HISTORY_CAP);

        let next_seq = recs.iter().map(|r| r.seq).max().unwrap_or(0) + 1;
        tracing::info!(
            recommendations = recs.len(),
            analyses = analyses.len(),
            next_seq,
            "recommendation store loaded"
        );

        let (recommendations, _) = watch::channel(Arc::new(recs));
        let (analyses, _) = watch::channel(Arc::new(analyses));
        Ok(Self {
            kv,
            writer: Mutex::new(next_seq),
            recommendations,
            analyses,
        })
    }

    pub async fn save(&self, mut rec: Recommendation) -> anyhow::Result<Recommendation> {
        let mut next_seq = self.writer.lock().await;
        rec.seq = *next_seq;

        let next = push_capped(&self.recommendations.borrow(), rec.clone());
        save_json(self.kv.as_ref(), RECOMMENDATIONS_KEY, &next)
            .await
            .with_context(|| format!("failed to persist recommendation for {}", rec.code))?;

        self.recommendations.send_replace(Arc::new(next));
        *next_seq += 1;

        tracing::debug!(
            code = %rec.code,
            seq = rec.seq,
            confidence = rec.confidence,
            "recommendation committed"
        );
        Ok(rec)
    }

    pub async fn save_analysis(&self, analysis: MarketAnalysis) -> anyhow::Result<()> {
        let _guard = self.writer.lock().await;

        let next = push_capped(&self.analyses.borrow(), analysis);
        save_json(self.kv.as_ref(), ANALYSIS_KEY, &next)
            .await
            .context("failed to persist market analysis")?;

        self.analyses.send_replace(Arc::new(next));
        Ok(())
    }

    pub fn latest(&self) -> Option<Recommendation> {
        self.recommendations.borrow().first().cloned()
    }

    pub fn history(&self) -> Arc<Vec<Recommendation>> {
        self.recommendations.borrow().clone()
    }

    pub fn latest_analysis(&self) -> Option<MarketAnalysis> {
        self.analyses.borrow().first().cloned()
    }

    pub fn analysis_history(&self) -> Arc<Vec<MarketAnalysis>> {
        self.analyses.borrow().clone()
    }

    pub fn find_by_ticket(&self, ticket: Uuid) -> Option<Recommendation> {
        self.recommendations
            .borrow()
            .iter()
            .find(|r| r.ticket == Some(ticket))
            .cloned()
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<Vec<Recommendation>>> {
        self.recommendations.subscribe()
    }
}
