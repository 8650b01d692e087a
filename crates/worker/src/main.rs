use anyhow::Context;
use clap::{Parser, Subcommand};
use hotpulse_core::collab::{KvWatchlist, StaticWatchlist, TracingNotifier, Watchlist};
use hotpulse_core::config::Settings;
use hotpulse_core::ingest::{FeedEndpoints, FeedHttp};
use hotpulse_core::llm::{LlmClient, UnconfiguredLlm};
use hotpulse_core::pipeline::{CycleKind, Pipeline, PipelineConfig, PipelineParts};
use hotpulse_core::storage::lock::try_acquire_cycle_lock;
use hotpulse_core::storage::{KvStore, MemoryKv, PgKv};
use hotpulse_core::time::calendar::{exchange_today, parse_trade_date_key, trade_date_key};
use hotpulse_core::time::{TradingCalendar, TradingDayTable};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "hotpulse_worker", about = "Run one pipeline cycle and exit")]
struct Args {
    /// Keep all state in memory instead of Postgres.
    #[arg(long, global = true)]
    dry_run: bool,

    /// Comma separated codes to analyse instead of the stored watchlist.
    #[arg(long, global = true)]
    watchlist: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Index quotes, news and the local market read.
    Fast,
    /// Hot-stock scan for the latest trading day, then per-instrument analysis.
    Slow,
    /// Hot-stock scan only.
    Scan {
        /// Trade date (YYYY-MM-DD or YYYYMMDD). Defaults to the latest trading day.
        #[arg(long)]
        date: Option<String>,
    },
    /// Trading-calendar lookup.
    Calendar {
        /// Date to check (YYYY-MM-DD or YYYYMMDD). Defaults to today in exchange time.
        #[arg(long)]
        date: Option<String>,
    },
}

impl Command {
    fn lock_name(&self) -> &'static str {
        match self {
            Command::Fast => CycleKind::Fast.as_str(),
            Command::Slow => CycleKind::Slow.as_str(),
            Command::Scan { .. } => "scan",
            Command::Calendar { .. } => "calendar",
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer())
        .init();

    let args = Args::parse();

    let table = TradingDayTable::from_path(&settings.trading_calendar_path)?;
    let calendar = TradingCalendar::new(table);

    if let Command::Calendar { date } = &args.command {
        return print_calendar(&calendar, date.as_deref());
    }

    let pool = if args.dry_run {
        None
    } else {
        let db_url = settings.require_database_url()?;
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(5)
            .connect(db_url)
            .await
            .context("connect DATABASE_URL failed")?;
        hotpulse_core::storage::migrate(&pool).await?;
        Some(pool)
    };

    let lock_name = args.command.lock_name();
    let lock = match &pool {
        Some(pool) => match try_acquire_cycle_lock(pool, lock_name).await? {
            Some(lock) => Some(lock),
            None => {
                tracing::warn!(
                    cycle = lock_name,
                    "cycle lock not acquired; another run in progress"
                );
                return Ok(());
            }
        },
        None => None,
    };

    let result = run(&args, &settings, calendar, pool.clone()).await;
    if let Err(err) = &result {
        sentry_anyhow::capture_anyhow(err);
        tracing::error!(cycle = lock_name, error = %format!("{err:#}"), "worker run failed");
    }

    if let Some(lock) = lock {
        match lock.release().await {
            Ok(true) => {}
            Ok(false) => tracing::warn!(cycle = lock_name, "cycle lock was not held at release"),
            Err(err) => tracing::error!(
                cycle = lock_name,
                error = %format!("{err:#}"),
                "cycle lock release failed"
            ),
        }
    }
    result
}

async fn run(
    args: &Args,
    settings: &Settings,
    calendar: TradingCalendar,
    pool: Option<sqlx::PgPool>,
) -> anyhow::Result<()> {
    let kv: Arc<dyn KvStore> = match pool {
        Some(pool) => Arc::new(PgKv::new(pool)),
        None => Arc::new(MemoryKv::new()),
    };

    let watchlist: Arc<dyn Watchlist> = match args.watchlist.as_deref() {
        Some(list) => Arc::new(StaticWatchlist::parse(list)?),
        None => {
            let stored = KvWatchlist::new(kv.clone());
            stored.seed_if_empty(&settings.watchlist_seed).await?;
            Arc::new(stored)
        }
    };

    // Only the slow cycle calls the inference endpoint.
    let llm: Arc<dyn LlmClient> = match &args.command {
        Command::Slow => hotpulse_core::llm::client_from_settings(settings)?,
        _ => Arc::new(UnconfiguredLlm),
    };

    let parts = PipelineParts {
        calendar,
        http: FeedHttp::from_env()?,
        endpoints: FeedEndpoints::from_env(),
        kv,
        watchlist,
        llm,
        notifier: Arc::new(TracingNotifier),
    };
    let pipeline = Pipeline::build(PipelineConfig::from_settings(settings), parts).await?;

    match &args.command {
        Command::Fast => {
            let report = pipeline.run_fast_cycle().await;
            print_json(&report)?;
            if let Some(analysis) = pipeline.store().latest_analysis() {
                tracing::info!(
                    temperature = analysis.temperature,
                    sentiment = %analysis.sentiment,
                    "{}",
                    analysis.headline
                );
            }
        }
        Command::Slow => {
            let report = pipeline.run_slow_cycle().await;
            print_json(&report)?;
            anyhow::ensure!(
                !report.analysis.auth_aborted,
                "inference endpoint rejected credentials"
            );
        }
        Command::Scan { date } => {
            let day = match date.as_deref() {
                Some(s) => parse_date_arg(s)?,
                None => pipeline
                    .calendar()
                    .latest_trading_day(exchange_today(chrono::Utc::now()))?,
            };
            let snapshot = pipeline.scan_hot_stocks(&trade_date_key(day)).await;
            print_json(&snapshot)?;
        }
        Command::Calendar { date } => print_calendar(pipeline.calendar(), date.as_deref())?,
    }
    Ok(())
}

fn print_calendar(calendar: &TradingCalendar, date: Option<&str>) -> anyhow::Result<()> {
    let day = match date {
        Some(s) => parse_date_arg(s)?,
        None => exchange_today(chrono::Utc::now()),
    };
    calendar.warn_if_uncovered(chrono::Datelike::year(&day));
    let latest = calendar.latest_trading_day(day)?;
    print_json(&serde_json::json!({
        "date": day.to_string(),
        "is_trading_day": calendar.is_trading_day(day),
        "latest_trading_day": latest.to_string(),
        "previous_trading_day": calendar.previous_trading_day(day)?.to_string(),
    }))
}

fn parse_date_arg(s: &str) -> anyhow::Result<chrono::NaiveDate> {
    chrono::NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
        .or_else(|_| parse_trade_date_key(s))
        .with_context(|| format!("invalid date {s:?}"))
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    let out = serde_json::to_string_pretty(value).context("failed to serialize report")?;
    println!("{out}");
    Ok(())
}

fn init_sentry(settings: &Settings) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}
