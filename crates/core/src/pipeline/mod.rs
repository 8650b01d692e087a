//! Composition root: wires fetchers, stores and the analysis scheduler, and drives the two
//! periodic schedules.

pub mod guard;

use crate::analysis::{
    summarize_market, AnalysisScheduler, CycleReport, Pacer, RecomputeBusy, RecomputeHandle,
    Strategy,
};
use crate::collab::{NotificationGate, Watchlist};
use crate::config::Settings;
use crate::domain::hot_stock::{HotStockSnapshot, SourceDiagnostic};
use crate::ingest::{FeedEndpoints, FeedHttp, HotStockScanner, MarketSnapshotFetcher};
use crate::llm::LlmClient;
use crate::storage::{KvStore, MarketStore, RecommendationStore};
use crate::time::calendar::{exchange_today, trade_date_key};
use crate::time::TradingCalendar;
use chrono::{Datelike, Utc};
use guard::CycleGuard;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

const DEFAULT_NEWS_LIMIT: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleKind {
    Fast,
    Slow,
}

impl CycleKind {
    pub fn as_str(self) -> &'static str {
        match self {
            CycleKind::Fast => "fast",
            CycleKind::Slow => "slow",
        }
    }
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub fast_cycle: Duration,
    pub slow_cycle: Duration,
    pub analysis_delay: Duration,
    pub news_limit: usize,
}

impl PipelineConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            fast_cycle: settings.fast_cycle,
            slow_cycle: settings.slow_cycle,
            analysis_delay: settings.analysis_delay,
            news_limit: DEFAULT_NEWS_LIMIT,
        }
    }
}

pub struct PipelineParts {
    pub calendar: TradingCalendar,
    pub http: FeedHttp,
    pub endpoints: FeedEndpoints,
    pub kv: Arc<dyn KvStore>,
    pub watchlist: Arc<dyn Watchlist>,
    pub llm: Arc<dyn LlmClient>,
    pub notifier: Arc<dyn NotificationGate>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FastCycleReport {
    pub indices_ok: bool,
    pub news_ok: bool,
    pub analysis_saved: bool,
    pub elapsed_ms: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SlowCycleReport {
    pub trade_date: Option<String>,
    pub sources: Vec<SourceDiagnostic>,
    pub analysis: CycleReport,
    pub elapsed_ms: u64,
}

pub struct Pipeline {
    config: PipelineConfig,
    calendar: Arc<TradingCalendar>,
    fetcher: MarketSnapshotFetcher,
    scanner: HotStockScanner,
    scheduler: Arc<AnalysisScheduler>,
    market: Arc<MarketStore>,
    store: Arc<RecommendationStore>,
    watchlist: Arc<dyn Watchlist>,
    fast: CycleGuard,
    slow: CycleGuard,
    cancel: CancellationToken,
    tracker: TaskTracker,
}

pub struct PipelineHandle {
    pipeline: Arc<Pipeline>,
}

impl PipelineHandle {
    pub async fn shutdown(self) {
        self.pipeline.shutdown().await;
    }
}

impl Pipeline {
    pub async fn build(config: PipelineConfig, parts: PipelineParts) -> anyhow::Result<Arc<Self>> {
        let market = Arc::new(MarketStore::load(parts.kv.clone()).await?);
        let store = Arc::new(RecommendationStore::load(parts.kv).await?);
        let scheduler = Arc::new(AnalysisScheduler::new(
            parts.llm,
            Pacer::new(config.analysis_delay),
            market.clone(),
            store.clone(),
            parts.notifier,
        ));

        Ok(Arc::new(Self {
            fetcher: MarketSnapshotFetcher::new(parts.http.clone(), parts.endpoints.clone()),
            scanner: HotStockScanner::new(parts.http, parts.endpoints),
            calendar: Arc::new(parts.calendar),
            scheduler,
            market,
            store,
            watchlist: parts.watchlist,
            config,
            fast: CycleGuard::new(),
            slow: CycleGuard::new(),
            cancel: CancellationToken::new(),
            tracker: TaskTracker::new(),
        }))
    }

    pub fn market(&self) -> &Arc<MarketStore> {
        &self.market
    }

    pub fn store(&self) -> &Arc<RecommendationStore> {
        &self.store
    }

    pub fn scheduler(&self) -> &Arc<AnalysisScheduler> {
        &self.scheduler
    }

    pub fn calendar(&self) -> &TradingCalendar {
        &self.calendar
    }

    pub fn is_running(&self, kind: CycleKind) -> bool {
        self.guard(kind).is_running()
    }

    /// Fires both schedules once now, then every period. Ticks that land while the previous
    /// cycle is still running are dropped.
    pub fn start(self: &Arc<Self>) -> PipelineHandle {
        tracing::info!(
            fast_secs = self.config.fast_cycle.as_secs(),
            slow_secs = self.config.slow_cycle.as_secs(),
            analysis_delay_ms = self.config.analysis_delay.as_millis() as u64,
            "pipeline starting"
        );
        self.spawn_schedule(CycleKind::Fast, self.config.fast_cycle);
        self.spawn_schedule(CycleKind::Slow, self.config.slow_cycle);
        PipelineHandle {
            pipeline: Arc::clone(self),
        }
    }

    pub fn trigger(self: &Arc<Self>, kind: CycleKind) -> bool {
        if self.cancel.is_cancelled() {
            return false;
        }
        let Some(run) = self.guard(kind).try_start() else {
            tracing::info!(cycle = kind.as_str(), "cycle still running; trigger ignored");
            return false;
        };

        let this = Arc::clone(self);
        self.tracker.spawn(async move {
            let _run = run;
            match kind {
                CycleKind::Fast => {
                    this.run_fast_cycle().await;
                }
                CycleKind::Slow => {
                    this.run_slow_cycle().await;
                }
            }
        });
        true
    }

    pub fn force_recompute(&self, strategy: Strategy) -> Result<RecomputeHandle, RecomputeBusy> {
        self.scheduler.force_recompute(strategy, &self.tracker)
    }

    pub async fn shutdown(&self) {
        self.cancel.cancel();
        self.tracker.close();
        self.tracker.wait().await;
        tracing::info!("pipeline stopped");
    }

    pub async fn run_fast_cycle(&self) -> FastCycleReport {
        let t0 = Instant::now();
        let (indices, news) = tokio::join!(
            self.fetcher.fetch_indices(),
            self.fetcher.fetch_news(self.config.news_limit),
        );

        let indices_ok = match indices {
            Ok(list) => match self.market.commit_indices(list).await {
                Ok(()) => true,
                Err(err) => {
                    tracing::error!(
                        error = %format!("{err:#}"),
                        "index snapshot not stored; serving previous one"
                    );
                    false
                }
            },
            Err(err) => {
                tracing::warn!(
                    feed = err.feed(),
                    timeout = err.is_timeout(),
                    error = %err,
                    "index fetch failed; serving previous snapshot"
                );
                false
            }
        };
        let news_ok = match news {
            Ok(items) => match self.market.commit_news(items).await {
                Ok(()) => true,
                Err(err) => {
                    tracing::error!(
                        error = %format!("{err:#}"),
                        "news pool not stored; serving previous one"
                    );
                    false
                }
            },
            Err(err) => {
                tracing::warn!(
                    feed = err.feed(),
                    timeout = err.is_timeout(),
                    error = %err,
                    "news fetch failed; serving previous snapshot"
                );
                false
            }
        };

        let indices = self.market.indices();
        let hot = self.market.hot_stocks();
        let analysis_saved = if indices.is_empty() && hot.is_none() {
            false
        } else {
            let analysis = summarize_market(&indices, hot.as_deref(), Utc::now());
            match self.store.save_analysis(analysis).await {
                Ok(()) => true,
                Err(err) => {
                    tracing::error!(error = %format!("{err:#}"), "market analysis not saved");
                    false
                }
            }
        };

        let report = FastCycleReport {
            indices_ok,
            news_ok,
            analysis_saved,
            elapsed_ms: t0.elapsed().as_millis() as u64,
        };
        tracing::info!(
            indices_ok,
            news_ok,
            analysis_saved,
            elapsed_ms = report.elapsed_ms,
            "fast cycle finished"
        );
        report
    }

    pub async fn run_slow_cycle(&self) -> SlowCycleReport {
        let t0 = Instant::now();
        let today = exchange_today(Utc::now());
        self.calendar.warn_if_uncovered(today.year());

        let trade_date = match self.calendar.latest_trading_day(today) {
            Ok(d) => Some(trade_date_key(d)),
            Err(err) => {
                tracing::error!(error = %err, "no trading day resolved; skipping hot-stock scan");
                None
            }
        };

        let mut sources = Vec::new();
        if let Some(key) = &trade_date {
            let snapshot = self.scan_hot_stocks(key).await;
            sources = snapshot.diagnostics;
        }

        let watchlist = match self.watchlist.list().await {
            Ok(codes) => codes,
            Err(err) => {
                tracing::error!(error = %format!("{err:#}"), "failed to read watchlist");
                Vec::new()
            }
        };
        let analysis = if watchlist.is_empty() {
            tracing::info!("watchlist is empty; no instruments to analyse");
            CycleReport::default()
        } else {
            self.scheduler.run_slow_cycle(&watchlist, &self.cancel).await
        };

        SlowCycleReport {
            trade_date,
            sources,
            analysis,
            elapsed_ms: t0.elapsed().as_millis() as u64,
        }
    }

    pub async fn scan_hot_stocks(&self, trade_date: &str) -> HotStockSnapshot {
        let snapshot = self.scanner.scan(trade_date).await;
        if let Err(err) = self.market.commit_hot_stocks(snapshot.clone()).await {
            tracing::error!(
                trade_date,
                error = %format!("{err:#}"),
                "hot-stock snapshot not committed"
            );
        }
        snapshot
    }

    fn guard(&self, kind: CycleKind) -> &CycleGuard {
        match kind {
            CycleKind::Fast => &self.fast,
            CycleKind::Slow => &self.slow,
        }
    }

    fn spawn_schedule(self: &Arc<Self>, kind: CycleKind, period: Duration) {
        let this = Arc::clone(self);
        self.tracker.spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = this.cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        this.trigger(kind);
                    }
                }
            }
            tracing::debug!(cycle = kind.as_str(), "schedule stopped");
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collab::{StaticWatchlist, TracingNotifier};
    use crate::llm::{CompletionRequest, Provider};
    use crate::storage::MemoryKv;
    use crate::time::TradingDayTable;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct FixedLlm {
        latency: Duration,
        calls: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl LlmClient for FixedLlm {
        fn provider(&self) -> Provider {
            Provider::Anthropic
        }

        async fn complete(&self, _req: CompletionRequest) -> anyhow::Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.latency).await;
            Ok(json!({"category": "combined", "confidence": 66, "reasoning": "量价配合"}).to_string())
        }
    }

    async fn pipeline(
        server: &MockServer,
        llm: Arc<FixedLlm>,
        watchlist: &str,
    ) -> Arc<Pipeline> {
        let table =
            TradingDayTable::from_json_str(include_str!("../../../../config/trading_calendar.json"))
                .unwrap();
        let config = PipelineConfig {
            fast_cycle: Duration::from_secs(3600),
            slow_cycle: Duration::from_secs(3600),
            analysis_delay: Duration::from_millis(10),
            news_limit: 20,
        };
        let parts = PipelineParts {
            calendar: TradingCalendar::new(table),
            http: FeedHttp::new(Duration::from_secs(5)).unwrap(),
            endpoints: FeedEndpoints::all_at(&server.uri()),
            kv: Arc::new(MemoryKv::new()),
            watchlist: Arc::new(StaticWatchlist::parse(watchlist).unwrap()),
            llm,
            notifier: Arc::new(TracingNotifier),
        };
        Pipeline::build(config, parts).await.unwrap()
    }

    fn llm(latency_ms: u64) -> Arc<FixedLlm> {
        Arc::new(FixedLlm {
            latency: Duration::from_millis(latency_ms),
            calls: AtomicUsize::new(0),
        })
    }

    async fn wait_until(mut done: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(10);
        while !done() {
            assert!(Instant::now() < deadline, "condition not reached in time");
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }

    #[tokio::test]
    async fn failed_index_fetch_keeps_previous_snapshot() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/qt/ulist.np/get"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": {"diff": [{"f2": 3300.0, "f6": 4.0e11, "f12": "000001", "f14": "上证指数", "f18": 3250.0}]}
            })))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/qt/ulist.np/get"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let p = pipeline(&server, llm(0), "600519").await;

        let first = p.run_fast_cycle().await;
        assert!(first.indices_ok);
        assert!(!first.news_ok);
        assert!(first.analysis_saved);

        let second = p.run_fast_cycle().await;
        assert!(!second.indices_ok);
        let indices = p.market().indices();
        assert_eq!(indices.len(), 1);
        assert_eq!(indices[0].current, 3300.0);
        assert_eq!(p.store().analysis_history().len(), 2);
    }

    #[tokio::test]
    async fn overlapping_trigger_of_the_same_cycle_is_ignored() {
        let server = MockServer::start().await;
        let model = llm(300);
        let p = pipeline(&server, model.clone(), "600519").await;

        assert!(p.trigger(CycleKind::Slow));
        assert!(!p.trigger(CycleKind::Slow));
        assert!(p.trigger(CycleKind::Fast));

        wait_until(|| !p.is_running(CycleKind::Slow) && !p.is_running(CycleKind::Fast)).await;
        assert_eq!(model.calls.load(Ordering::SeqCst), 1);
        assert_eq!(p.store().history().len(), 1);

        assert!(p.trigger(CycleKind::Slow));
        p.shutdown().await;
    }

    #[tokio::test]
    async fn start_fires_immediately_and_shutdown_stops_triggers() {
        let server = MockServer::start().await;
        let model = llm(0);
        let p = pipeline(&server, model.clone(), "600519,000001").await;

        let handle = p.start();
        wait_until(|| p.store().history().len() == 2).await;
        handle.shutdown().await;

        assert_eq!(model.calls.load(Ordering::SeqCst), 2);
        assert!(!p.trigger(CycleKind::Fast));
        assert!(p.market().hot_stocks().is_some());
    }
}
