use crate::config::env_u64;
use crate::ingest::error::FetchError;
use anyhow::Context;
use reqwest::header::{HeaderMap, HeaderValue};
use serde_json::Value;
use std::time::Duration;

const DEFAULT_TIMEOUT_SECS: u64 = 15;

const DEFAULT_QUOTE_BASE_URL: &str = "https://push2.eastmoney.com";
const DEFAULT_DATACENTER_BASE_URL: &str = "https://datacenter-web.eastmoney.com";
const DEFAULT_POOL_BASE_URL: &str = "https://push2ex.eastmoney.com";
const DEFAULT_NEWS_BASE_URL: &str = "https://np-listapi.eastmoney.com";

const USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36";
const REFERER: &str = "https://quote.eastmoney.com/";

#[derive(Debug, Clone)]
pub struct FeedEndpoints {
    pub quote_base_url: String,
    pub datacenter_base_url: String,
    pub pool_base_url: String,
    pub news_base_url: String,
}

impl Default for FeedEndpoints {
    fn default() -> Self {
        Self {
            quote_base_url: DEFAULT_QUOTE_BASE_URL.to_string(),
            datacenter_base_url: DEFAULT_DATACENTER_BASE_URL.to_string(),
            pool_base_url: DEFAULT_POOL_BASE_URL.to_string(),
            news_base_url: DEFAULT_NEWS_BASE_URL.to_string(),
        }
    }
}

impl FeedEndpoints {
    pub fn from_env() -> Self {
        let pick = |key: &str, default: &str| {
            std::env::var(key)
                .ok()
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| default.to_string())
        };
        Self {
            quote_base_url: pick("EASTMONEY_QUOTE_BASE_URL", DEFAULT_QUOTE_BASE_URL),
            datacenter_base_url: pick("EASTMONEY_DATACENTER_BASE_URL", DEFAULT_DATACENTER_BASE_URL),
            pool_base_url: pick("EASTMONEY_POOL_BASE_URL", DEFAULT_POOL_BASE_URL),
            news_base_url: pick("EASTMONEY_NEWS_BASE_URL", DEFAULT_NEWS_BASE_URL),
        }
    }

    pub fn all_at(base_url: &str) -> Self {
        Self {
            quote_base_url: base_url.to_string(),
            datacenter_base_url: base_url.to_string(),
            pool_base_url: base_url.to_string(),
            news_base_url: base_url.to_string(),
        }
    }

    pub(crate) fn url(base: &str, path: &str) -> String {
        format!("{}{}", base.trim_end_matches('/'), path)
    }
}

#[derive(Debug, Clone)]
pub struct FeedHttp {
    http: reqwest::Client,
}

impl FeedHttp {
    pub fn new(timeout: Duration) -> anyhow::Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert("Referer", HeaderValue::from_static(REFERER));

        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .build()
            .context("failed to build feed http client")?;
        Ok(Self { http })
    }

    pub fn from_env() -> anyhow::Result<Self> {
        let timeout_secs = env_u64("FEED_TIMEOUT_SECS", DEFAULT_TIMEOUT_SECS)?;
        Self::new(Duration::from_secs(timeout_secs))
    }

    pub async fn get_json(
        &self,
        feed: &'static str,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<Value, FetchError> {
        let t0 = std::time::Instant::now();
        let res = self
            .http
            .get(url)
            .query(query)
            .send()
            .await
            .map_err(|error| FetchError::Transport { feed, error })?;

        let status = res.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                feed,
                status: status.as_u16(),
            });
        }

        let text = res
            .text()
            .await
            .map_err(|error| FetchError::Transport { feed, error })?;

        tracing::debug!(
            feed,
            bytes = text.len(),
            elapsed_ms = t0.elapsed().as_millis() as u64,
            "feed response"
        );

        serde_json::from_str::<Value>(&text)
            .map_err(|err| FetchError::decode(feed, format!("body is not JSON: {err}")))
    }
}

/// Numbers arrive either as JSON numbers or numeric strings; `"-"` marks a missing value.
pub(crate) fn num(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64().filter(|f| f.is_finite()),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|f| f.is_finite()),
        _ => None,
    }
}

pub(crate) fn text(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.trim().to_string()).filter(|s| !s.is_empty() && s != "-"),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn num_accepts_numbers_and_numeric_strings() {
        assert_eq!(num(&json!(12.5)), Some(12.5));
        assert_eq!(num(&json!(" 7 ")), Some(7.0));
        assert_eq!(num(&json!("-")), None);
        assert_eq!(num(&json!(null)), None);
    }

    #[test]
    fn text_treats_dash_as_missing() {
        assert_eq!(text(&json!("600519")), Some("600519".to_string()));
        assert_eq!(text(&json!("-")), None);
        assert_eq!(text(&json!("")), None);
    }

    #[test]
    fn url_joins_without_double_slash() {
        assert_eq!(
            FeedEndpoints::url("http://localhost:1234/", "/api/qt/clist/get"),
            "http://localhost:1234/api/qt/clist/get"
        );
    }
}
