use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use hotpulse_core::analysis::{Strategy, TicketStatus};
use hotpulse_core::collab::{KvWatchlist, TracingNotifier};
use hotpulse_core::domain::hot_stock::{DragonTigerItem, HotStockSnapshot};
use hotpulse_core::domain::market::{MarketIndex, NewsItem};
use hotpulse_core::domain::recommendation::{MarketAnalysis, Recommendation};
use hotpulse_core::ingest::{FeedEndpoints, FeedHttp};
use hotpulse_core::pipeline::{Pipeline, PipelineConfig, PipelineParts};
use hotpulse_core::storage::{AuthState, KvStore, MemoryKv, PgKv};
use hotpulse_core::time::calendar::{exchange_today, trade_date_key};
use hotpulse_core::time::{TradingCalendar, TradingDayTable};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = hotpulse_core::config::Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer())
        .init();

    let pool: Option<PgPool> = match settings.require_database_url() {
        Ok(db_url) => match sqlx::postgres::PgPoolOptions::new()
            .max_connections(5)
            .connect(db_url)
            .await
        {
            Ok(pool) => match hotpulse_core::storage::migrate(&pool).await {
                Ok(()) => Some(pool),
                Err(e) => {
                    sentry_anyhow::capture_anyhow(&e);
                    tracing::error!(
                        error = %e,
                        "db migrations failed; state will not survive restarts"
                    );
                    None
                }
            },
            Err(e) => {
                let err = anyhow::Error::new(e);
                sentry_anyhow::capture_anyhow(&err);
                tracing::error!(error = %err, "db connect failed; state will not survive restarts");
                None
            }
        },
        Err(e) => {
            tracing::warn!(error = %e, "DATABASE_URL missing; keeping state in memory");
            None
        }
    };
    let persistent = pool.is_some();
    let kv: Arc<dyn KvStore> = match pool {
        Some(pool) => Arc::new(PgKv::new(pool)),
        None => Arc::new(MemoryKv::new()),
    };

    let table = TradingDayTable::from_path(&settings.trading_calendar_path)?;
    let calendar = TradingCalendar::new(table);

    let watchlist = Arc::new(KvWatchlist::new(kv.clone()));
    watchlist.seed_if_empty(&settings.watchlist_seed).await?;

    let parts = PipelineParts {
        calendar,
        http: FeedHttp::from_env()?,
        endpoints: FeedEndpoints::from_env(),
        kv,
        watchlist: watchlist.clone(),
        llm: hotpulse_core::llm::client_from_settings(&settings)?,
        notifier: Arc::new(TracingNotifier),
    };
    let pipeline = Pipeline::build(PipelineConfig::from_settings(&settings), parts).await?;
    let schedules = pipeline.start();

    let state = AppState {
        pipeline,
        watchlist,
        persistent,
    };

    let app = Router::new()
        .route("/healthz", get(healthz))
        .route("/status", get(get_status))
        .route("/market/indices", get(get_indices))
        .route("/market/news", get(get_news))
        .route("/market/analysis", get(get_analysis))
        .route("/market/analysis/history", get(get_analysis_history))
        .route("/hot-stocks", get(get_hot_stocks))
        .route("/hot-stocks/dragon-tiger", get(get_dragon_tiger))
        .route("/recommendations/latest", get(get_latest_recommendation))
        .route("/recommendations/history", get(get_recommendation_history))
        .route("/watchlist", get(get_watchlist))
        .route("/watchlist/:code", put(add_watchlist_code).delete(remove_watchlist_code))
        .route("/recompute", post(post_recompute))
        .route("/recompute/:ticket", get(get_recompute))
        .route("/calendar/:date", get(get_calendar_day))
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(3000);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));

    tracing::info!(%addr, "api listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    schedules.shutdown().await;
    Ok(())
}

async fn healthz() -> &'static str {
    "ok"
}

#[derive(Clone)]
struct AppState {
    pipeline: Arc<Pipeline>,
    watchlist: Arc<KvWatchlist>,
    persistent: bool,
}

#[derive(Debug, Serialize)]
struct ApiStatus {
    persistent: bool,
    auth: AuthState,
    trade_date: Option<String>,
    fast_running: bool,
    slow_running: bool,
}

async fn get_status(State(state): State<AppState>) -> Json<ApiStatus> {
    use hotpulse_core::pipeline::CycleKind;

    let p = &state.pipeline;
    Json(ApiStatus {
        persistent: state.persistent,
        auth: p.market().auth_state(),
        trade_date: p.market().hot_stocks().map(|s| s.trade_date.clone()),
        fast_running: p.is_running(CycleKind::Fast),
        slow_running: p.is_running(CycleKind::Slow),
    })
}

#[derive(Debug, Serialize)]
struct ApiIndex {
    #[serde(flatten)]
    index: MarketIndex,
    amount_change: Option<f64>,
}

async fn get_indices(State(state): State<AppState>) -> Json<Vec<ApiIndex>> {
    let indices = state.pipeline.market().indices();
    Json(
        indices
            .iter()
            .map(|i| ApiIndex {
                amount_change: i.amount_change(),
                index: i.clone(),
            })
            .collect(),
    )
}

#[derive(Debug, Deserialize)]
struct NewsQuery {
    code: Option<String>,
    limit: Option<usize>,
}

async fn get_news(
    State(state): State<AppState>,
    Query(q): Query<NewsQuery>,
) -> Json<Vec<NewsItem>> {
    let news = state.pipeline.market().news();
    let limit = q.limit.unwrap_or(news.len());
    let items = match q.code.as_deref() {
        Some(code) => {
            let name = state
                .pipeline
                .market()
                .hot_stocks()
                .and_then(|h| h.name_of(code).map(str::to_string))
                .unwrap_or_default();
            hotpulse_core::classify::related_news(code, &name, &news, limit)
        }
        None => news.iter().take(limit).cloned().collect(),
    };
    Json(items)
}

async fn get_analysis(State(state): State<AppState>) -> Result<Json<MarketAnalysis>, StatusCode> {
    state
        .pipeline
        .store()
        .latest_analysis()
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

async fn get_analysis_history(State(state): State<AppState>) -> Json<Vec<MarketAnalysis>> {
    Json(state.pipeline.store().analysis_history().to_vec())
}

async fn get_hot_stocks(
    State(state): State<AppState>,
) -> Result<Json<HotStockSnapshot>, StatusCode> {
    let snapshot = state
        .pipeline
        .market()
        .hot_stocks()
        .ok_or(StatusCode::NOT_FOUND)?;
    Ok(Json(snapshot.as_ref().clone()))
}

async fn get_dragon_tiger(State(state): State<AppState>) -> Json<Vec<DragonTigerItem>> {
    Json(state.pipeline.market().dragon_tiger_by_net_buy())
}

async fn get_latest_recommendation(
    State(state): State<AppState>,
) -> Result<Json<Recommendation>, StatusCode> {
    state
        .pipeline
        .store()
        .latest()
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

async fn get_recommendation_history(State(state): State<AppState>) -> Json<Vec<Recommendation>> {
    Json(state.pipeline.store().history().to_vec())
}

async fn get_watchlist(State(state): State<AppState>) -> Result<Json<Vec<String>>, StatusCode> {
    use hotpulse_core::collab::Watchlist;

    state.watchlist.list().await.map(Json).map_err(|e| {
        sentry_anyhow::capture_anyhow(&e);
        StatusCode::INTERNAL_SERVER_ERROR
    })
}

async fn add_watchlist_code(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<Json<Vec<String>>, StatusCode> {
    hotpulse_core::collab::validate_code(&code).map_err(|_| StatusCode::BAD_REQUEST)?;
    state.watchlist.add(&code).await.map(Json).map_err(|e| {
        sentry_anyhow::capture_anyhow(&e);
        StatusCode::INTERNAL_SERVER_ERROR
    })
}

async fn remove_watchlist_code(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<Json<Vec<String>>, StatusCode> {
    hotpulse_core::collab::validate_code(&code).map_err(|_| StatusCode::BAD_REQUEST)?;
    state.watchlist.remove(&code).await.map(Json).map_err(|e| {
        sentry_anyhow::capture_anyhow(&e);
        StatusCode::INTERNAL_SERVER_ERROR
    })
}

#[derive(Debug, Deserialize)]
struct RecomputeRequest {
    #[serde(default)]
    strategy: Option<String>,
}

#[derive(Debug, Serialize)]
struct RecomputeAccepted {
    ticket: Uuid,
    status: TicketStatus,
}

async fn post_recompute(
    State(state): State<AppState>,
    body: Option<Json<RecomputeRequest>>,
) -> Result<(StatusCode, Json<RecomputeAccepted>), StatusCode> {
    let strategy = match body.and_then(|Json(b)| b.strategy) {
        Some(s) => Strategy::parse(&s).ok_or(StatusCode::BAD_REQUEST)?,
        None => Strategy::Combined,
    };
    // Clients poll the ticket; the completion handle is not needed here.
    let handle = state
        .pipeline
        .force_recompute(strategy)
        .map_err(|_| StatusCode::TOO_MANY_REQUESTS)?;
    Ok((
        StatusCode::ACCEPTED,
        Json(RecomputeAccepted {
            ticket: handle.ticket,
            status: TicketStatus::Pending,
        }),
    ))
}

#[derive(Debug, Serialize)]
struct RecomputeResult {
    ticket: Uuid,
    status: TicketStatus,
    recommendation: Option<Recommendation>,
}

async fn get_recompute(
    State(state): State<AppState>,
    Path(ticket): Path<Uuid>,
) -> Result<Json<RecomputeResult>, StatusCode> {
    let status = state
        .pipeline
        .scheduler()
        .ticket_status(ticket)
        .ok_or(StatusCode::NOT_FOUND)?;
    let recommendation = match status {
        TicketStatus::Completed { .. } => state.pipeline.store().find_by_ticket(ticket),
        _ => None,
    };
    Ok(Json(RecomputeResult {
        ticket,
        status,
        recommendation,
    }))
}

#[derive(Debug, Serialize)]
struct ApiCalendarDay {
    date: NaiveDate,
    is_trading_day: bool,
    latest_trading_day: String,
}

async fn get_calendar_day(
    State(state): State<AppState>,
    Path(date): Path<String>,
) -> Result<Json<ApiCalendarDay>, StatusCode> {
    let date = if date == "today" {
        exchange_today(chrono::Utc::now())
    } else {
        NaiveDate::parse_from_str(&date, "%Y-%m-%d").map_err(|_| StatusCode::BAD_REQUEST)?
    };
    let calendar = state.pipeline.calendar();
    let latest = calendar.latest_trading_day(date).map_err(|e| {
        tracing::warn!(error = %e, %date, "calendar lookup out of range");
        StatusCode::UNPROCESSABLE_ENTITY
    })?;
    Ok(Json(ApiCalendarDay {
        date,
        is_trading_day: calendar.is_trading_day(date),
        latest_trading_day: trade_date_key(latest),
    }))
}

fn init_sentry(settings: &hotpulse_core::config::Settings) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received; stopping schedules");
}
