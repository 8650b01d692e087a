pub mod analysis;
pub mod classify;
pub mod collab;
pub mod domain;
pub mod ingest;
pub mod llm;
pub mod pipeline;
pub mod storage;
pub mod time;

pub mod config {
    use anyhow::Context;
    use std::time::Duration;

    const DEFAULT_FAST_CYCLE_SECS: u64 = 30;
    const DEFAULT_SLOW_CYCLE_SECS: u64 = 300;
    const DEFAULT_ANALYSIS_DELAY_MS: u64 = 1000;
    const DEFAULT_TRADING_CALENDAR_PATH: &str = "config/trading_calendar.json";

    #[derive(Debug, Clone)]
    pub struct Settings {
        pub database_url: Option<String>,
        pub anthropic_api_key: Option<String>,
        pub sentry_dsn: Option<String>,
        pub trading_calendar_path: String,
        pub fast_cycle: Duration,
        pub slow_cycle: Duration,
        pub analysis_delay: Duration,
        /// Initial watchlist, comma separated 6-digit codes. Only used to seed an empty store.
        pub watchlist_seed: Vec<String>,
    }

    impl Settings {
        pub fn from_env() -> anyhow::Result<Self> {
            Ok(Self {
                database_url: std::env::var("DATABASE_URL").ok(),
                anthropic_api_key: std::env::var("ANTHROPIC_API_KEY").ok(),
                sentry_dsn: std::env::var("SENTRY_DSN").ok(),
                trading_calendar_path: std::env::var("TRADING_CALENDAR_PATH")
                    .ok()
                    .filter(|s| !s.trim().is_empty())
                    .unwrap_or_else(|| DEFAULT_TRADING_CALENDAR_PATH.to_string()),
                fast_cycle: Duration::from_secs(env_u64(
                    "FAST_CYCLE_SECS",
                    DEFAULT_FAST_CYCLE_SECS,
                )?),
                slow_cycle: Duration::from_secs(env_u64(
                    "SLOW_CYCLE_SECS",
                    DEFAULT_SLOW_CYCLE_SECS,
                )?),
                analysis_delay: Duration::from_millis(env_u64(
                    "ANALYSIS_DELAY_MS",
                    DEFAULT_ANALYSIS_DELAY_MS,
                )?),
                watchlist_seed: std::env::var("WATCHLIST")
                    .map(|s| parse_code_list(&s))
                    .unwrap_or_default(),
            })
        }

        pub fn require_database_url(&self) -> anyhow::Result<&str> {
            self.database_url
                .as_deref()
                .context("DATABASE_URL is required")
        }

        pub fn require_anthropic_api_key(&self) -> anyhow::Result<&str> {
            self.anthropic_api_key
                .as_deref()
                .context("ANTHROPIC_API_KEY is required")
        }
    }

    pub fn env_u64(key: &str, default: u64) -> anyhow::Result<u64> {
        positive_u64(key, std::env::var(key).ok().as_deref(), default)
    }

    fn positive_u64(key: &str, raw: Option<&str>, default: u64) -> anyhow::Result<u64> {
        match raw.map(str::trim) {
            Some(s) if !s.is_empty() => {
                let v = s
                    .parse::<u64>()
                    .with_context(|| format!("{key} must be an unsigned integer (got {s:?})"))?;
                anyhow::ensure!(v >= 1, "{key} must be >= 1");
                Ok(v)
            }
            _ => Ok(default),
        }
    }

    pub fn parse_code_list(s: &str) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for part in s.split(',') {
            let code = part.trim();
            if code.is_empty() || out.iter().any(|c| c == code) {
                continue;
            }
            out.push(code.to_string());
        }
        out
    }

}
