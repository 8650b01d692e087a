use crate::analysis::pacer::Pacer;
use crate::analysis::prompt::{self, Strategy};
use crate::classify::{related_news, DEFAULT_RELATED_NEWS};
use crate::collab::NotificationGate;
use crate::domain::contract::Expected;
use crate::domain::recommendation::Recommendation;
use crate::llm::error::is_auth_failure;
use crate::llm::json::parse_recommendation;
use crate::llm::{CompletionRequest, LlmClient};
use crate::storage::market::{AuthState, MarketStore};
use crate::storage::recommendations::RecommendationStore;
use chrono::Utc;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use uuid::Uuid;

// Finished tickets past this are forgotten; their recommendations stay in the store history.
const TICKET_RETENTION: usize = 64;
// Forced calls queued on the pacer at once; further requests are refused until one finishes.
pub const MAX_PENDING_RECOMPUTES: usize = 8;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AnalysisError {
    #[error("inference endpoint rejected credentials: {0}")]
    Auth(String),
    #[error("inference call failed: {0}")]
    Inference(String),
    #[error("unusable inference output: {0}")]
    Parse(String),
    #[error("failed to commit recommendation: {0}")]
    Persist(String),
}

impl AnalysisError {
    pub fn stage(&self) -> &'static str {
        match self {
            AnalysisError::Auth(_) => "auth",
            AnalysisError::Inference(_) => "inference",
            AnalysisError::Parse(_) => "parse",
            AnalysisError::Persist(_) => "persist",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{pending} forced recomputes already queued")]
pub struct RecomputeBusy {
    pub pending: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct InstrumentFailure {
    pub code: String,
    pub stage: &'static str,
    pub error: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CycleReport {
    pub attempted: usize,
    pub committed: usize,
    pub notified: usize,
    pub failures: Vec<InstrumentFailure>,
    pub auth_aborted: bool,
    pub cancelled: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TicketStatus {
    Pending,
    Completed { seq: u64, code: String },
    Failed { error: String },
}

#[derive(Debug)]
pub struct RecomputeHandle {
    pub ticket: Uuid,
    pub done: oneshot::Receiver<TicketStatus>,
}

pub struct AnalysisScheduler {
    llm: Arc<dyn LlmClient>,
    pacer: Pacer,
    market: Arc<MarketStore>,
    store: Arc<RecommendationStore>,
    notifier: Arc<dyn NotificationGate>,
    tickets: Mutex<TicketRegistry>,
}

impl AnalysisScheduler {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        pacer: Pacer,
        market: Arc<MarketStore>,
        store: Arc<RecommendationStore>,
        notifier: Arc<dyn NotificationGate>,
    ) -> Self {
        Self {
            llm,
            pacer,
            market,
            store,
            notifier,
            tickets: Mutex::new(TicketRegistry::default()),
        }
    }

    /// Analyses `watchlist` in order. Failures are per instrument except a credential
    /// rejection, which ends the cycle. Cancellation is honoured between instruments.
    pub async fn run_slow_cycle(
        &self,
        watchlist: &[String],
        cancel: &CancellationToken,
    ) -> CycleReport {
        let indices = self.market.indices();
        let news = self.market.news();
        let hot = self.market.hot_stocks();

        let mut report = CycleReport::default();
        for code in watchlist {
            if cancel.is_cancelled() {
                tracing::info!(
                    remaining = watchlist.len() - report.attempted,
                    "slow cycle cancelled"
                );
                report.cancelled = true;
                break;
            }
            report.attempted += 1;

            let name = hot
                .as_deref()
                .and_then(|h| h.name_of(code))
                .unwrap_or(code.as_str())
                .to_string();
            let related = related_news(code, &name, &news, DEFAULT_RELATED_NEWS);
            let req = CompletionRequest {
                system: prompt::system_prompt(),
                prompt: prompt::instrument_prompt(code, &name, &indices, hot.as_deref(), &related),
            };
            let expected = Expected {
                code: Some(code.as_str()),
                name: Some(name.as_str()),
                ticket: None,
            };

            match self.analyse(req, expected).await {
                Ok(rec) => {
                    report.committed += 1;
                    if self.maybe_notify(&rec).await {
                        report.notified += 1;
                    }
                }
                Err(err) => {
                    let abort = matches!(err, AnalysisError::Auth(_));
                    if abort {
                        tracing::error!(
                            %code,
                            stage = err.stage(),
                            error = %err,
                            "aborting slow cycle"
                        );
                    } else {
                        tracing::warn!(
                            %code,
                            stage = err.stage(),
                            error = %err,
                            "instrument analysis failed"
                        );
                    }
                    report.failures.push(InstrumentFailure {
                        code: code.clone(),
                        stage: err.stage(),
                        error: err.to_string(),
                    });
                    if abort {
                        report.auth_aborted = true;
                        break;
                    }
                }
            }
        }

        tracing::info!(
            attempted = report.attempted,
            committed = report.committed,
            failed = report.failures.len(),
            notified = report.notified,
            auth_aborted = report.auth_aborted,
            "slow cycle analysis finished"
        );
        report
    }

    /// Starts one market-wide call outside the cadence. It shares the pacer with the slow
    /// cycle, so it queues behind an in-flight call instead of overlapping it.
    pub fn force_recompute(
        self: &Arc<Self>,
        strategy: Strategy,
        tracker: &TaskTracker,
    ) -> Result<RecomputeHandle, RecomputeBusy> {
        let ticket = Uuid::new_v4();
        self.registry()?.open(ticket).inspect_err(|busy| {
            tracing::warn!(pending = busy.pending, "forced recompute refused; queue full");
        })?;
        tracing::info!(%ticket, strategy = strategy.as_str(), "forced recompute queued");

        let (tx, done) = oneshot::channel();
        let this = Arc::clone(self);
        tracker.spawn(async move {
            let status = match this.recompute(strategy, ticket).await {
                Ok(rec) => {
                    this.maybe_notify(&rec).await;
                    TicketStatus::Completed {
                        seq: rec.seq,
                        code: rec.code,
                    }
                }
                Err(err) => {
                    tracing::warn!(
                        %ticket,
                        stage = err.stage(),
                        error = %err,
                        "forced recompute failed"
                    );
                    TicketStatus::Failed {
                        error: err.to_string(),
                    }
                }
            };
            if let Ok(mut tickets) = this.registry() {
                tickets.finish(ticket, status.clone());
            }
            // The caller may have stopped waiting.
            let _ = tx.send(status);
        });

        Ok(RecomputeHandle { ticket, done })
    }

    pub fn ticket_status(&self, ticket: Uuid) -> Option<TicketStatus> {
        self.registry().ok()?.get(ticket)
    }

    async fn recompute(
        &self,
        strategy: Strategy,
        ticket: Uuid,
    ) -> Result<Recommendation, AnalysisError> {
        let indices = self.market.indices();
        let news = self.market.news();
        let hot = self.market.hot_stocks();
        let analysis = self.store.latest_analysis();

        // Market-wide: the highest-importance headlines rather than per-code matches.
        let mut top_news: Vec<_> = news.iter().cloned().collect();
        top_news.sort_by(|a, b| b.importance.cmp(&a.importance));
        top_news.truncate(DEFAULT_RELATED_NEWS);

        let req = CompletionRequest {
            system: prompt::system_prompt(),
            prompt: prompt::strategy_prompt(
                strategy,
                &indices,
                hot.as_deref(),
                &top_news,
                analysis.as_ref(),
            ),
        };
        let expected = Expected {
            ticket: Some(ticket),
            ..Expected::default()
        };
        self.analyse(req, expected).await
    }

    async fn analyse(
        &self,
        req: CompletionRequest,
        expected: Expected<'_>,
    ) -> Result<Recommendation, AnalysisError> {
        let text = {
            let _permit = self.pacer.acquire().await;
            self.llm.complete(req).await
        };

        let text = match text {
            Ok(text) => {
                self.market.set_auth_state(AuthState::Valid);
                text
            }
            Err(err) if is_auth_failure(&err) => {
                let detail = format!("{err:#}");
                self.market.set_auth_state(AuthState::Rejected {
                    since: Utc::now(),
                    detail: detail.clone(),
                });
                return Err(AnalysisError::Auth(detail));
            }
            Err(err) => return Err(AnalysisError::Inference(format!("{err:#}"))),
        };

        let mut rec = parse_recommendation(&text)
            .and_then(|r| r.validate_and_into_recommendation(expected))
            .map_err(|err| AnalysisError::Parse(format!("{err:#}")))?;

        if rec.name == rec.code {
            let hot = self.market.hot_stocks();
            if let Some(name) = hot.as_deref().and_then(|h| h.name_of(&rec.code)) {
                rec.name = name.to_string();
            }
        }

        self.store
            .save(rec)
            .await
            .map_err(|err| AnalysisError::Persist(format!("{err:#}")))
    }

    async fn maybe_notify(&self, rec: &Recommendation) -> bool {
        if !rec.is_notification_worthy() {
            return false;
        }
        self.notifier
            .notify(&rec.code, rec.confidence, rec.category)
            .await;
        true
    }

    fn registry(&self) -> Result<std::sync::MutexGuard<'_, TicketRegistry>, RecomputeBusy> {
        // A poisoned registry refuses new work rather than panicking the caller.
        self.tickets.lock().map_err(|_| {
            tracing::error!("ticket registry lock poisoned");
            RecomputeBusy { pending: 0 }
        })
    }
}

/// Forced-recompute tickets in issue order. Pending entries are never evicted.
#[derive(Debug, Default)]
struct TicketRegistry {
    entries: VecDeque<(Uuid, TicketStatus)>,
}

impl TicketRegistry {
    fn pending(&self) -> usize {
        self.entries
            .iter()
            .filter(|(_, s)| *s == TicketStatus::Pending)
            .count()
    }

    fn open(&mut self, ticket: Uuid) -> Result<(), RecomputeBusy> {
        let pending = self.pending();
        if pending >= MAX_PENDING_RECOMPUTES {
            return Err(RecomputeBusy { pending });
        }
        if self.entries.len() >= TICKET_RETENTION {
            if let Some(oldest) = self
                .entries
                .iter()
                .position(|(_, s)| *s != TicketStatus::Pending)
            {
                self.entries.remove(oldest);
            }
        }
        self.entries.push_back((ticket, TicketStatus::Pending));
        Ok(())
    }

    fn finish(&mut self, ticket: Uuid, status: TicketStatus) {
        match self.entries.iter_mut().find(|(t, _)| *t == ticket) {
            Some(entry) => entry.1 = status,
            None => tracing::warn!(%ticket, "finished ticket was not registered"),
        }
    }

    fn get(&self, ticket: Uuid) -> Option<TicketStatus> {
        self.entries
            .iter()
            .find(|(t, _)| *t == ticket)
            .map(|(_, s)| s.clone())
    }
}
