use crate::classify::label_news;
use crate::domain::contract::normalize_code;
use crate::domain::market::{MarketIndex, NewsItem};
use crate::ingest::error::FetchError;
use crate::ingest::http::{num, text, FeedEndpoints, FeedHttp};
use chrono::Utc;
use serde_json::Value;

const FEED_INDICES: &str = "eastmoney_indices";
const FEED_NEWS: &str = "eastmoney_724";

const EM_UT: &str = "fa5fd1943c7b386f172d6893dbfba10b";
const INDEX_FIELDS: &str = "f2,f5,f6,f12,f14,f15,f16,f17,f18";

/// 上证指数, 深证成指, 创业板指, 沪深300.
pub const DEFAULT_INDEX_SECIDS: &[&str] = &["1.000001", "0.399001", "0.399006", "1.000300"];

#[derive(Debug, Clone)]
pub struct MarketSnapshotFetcher {
    http: FeedHttp,
    endpoints: FeedEndpoints,
    index_secids: Vec<String>,
}

impl MarketSnapshotFetcher {
    pub fn new(http: FeedHttp, endpoints: FeedEndpoints) -> Self {
        Self {
            http,
            endpoints,
            index_secids: DEFAULT_INDEX_SECIDS.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn with_index_secids(mut self, secids: Vec<String>) -> Self {
        if !secids.is_empty() {
            self.index_secids = secids;
        }
        self
    }

    pub async fn fetch_indices(&self) -> Result<Vec<MarketIndex>, FetchError> {
        let url = FeedEndpoints::url(&self.endpoints.quote_base_url, "/api/qt/ulist.np/get");
        let query = [
            ("fltt", "2".to_string()),
            ("invt", "2".to_string()),
            ("ut", EM_UT.to_string()),
            ("fields", INDEX_FIELDS.to_string()),
            ("secids", self.index_secids.join(",")),
        ];
        let body = self.http.get_json(FEED_INDICES, &url, &query).await?;
        parse_indices(&body)
    }

    pub async fn fetch_news(&self, limit: usize) -> Result<Vec<NewsItem>, FetchError> {
        let url = FeedEndpoints::url(&self.endpoints.news_base_url, "/comm/web/getFastNewsList");
        let query = [
            ("client", "web".to_string()),
            ("biz", "web_724".to_string()),
            ("fastColumn", "102".to_string()),
            ("sortEnd", String::new()),
            ("pageSize", limit.max(1).to_string()),
            ("req_trace", Utc::now().timestamp_millis().to_string()),
        ];
        let body = self.http.get_json(FEED_NEWS, &url, &query).await?;
        let mut items = parse_news(&body)?;
        items.truncate(limit);
        Ok(items)
    }
}

fn parse_indices(body: &Value) -> Result<Vec<MarketIndex>, FetchError> {
    let rows = body
        .pointer("/data/diff")
        .and_then(Value::as_array)
        .ok_or_else(|| FetchError::decode(FEED_INDICES, "missing data.diff"))?;

    let now = Utc::now();
    let mut out = Vec::with_capacity(rows.len());
    for row in rows {
        let (Some(code), Some(name), Some(current)) =
            (text(&row["f12"]), text(&row["f14"]), num(&row["f2"]))
        else {
            tracing::debug!(feed = FEED_INDICES, ?row, "dropping malformed index row");
            continue;
        };

        let mut idx = MarketIndex {
            code,
            name,
            open: num(&row["f17"]).unwrap_or(0.0),
            high: num(&row["f15"]).unwrap_or(0.0),
            low: num(&row["f16"]).unwrap_or(0.0),
            current,
            pre_close: num(&row["f18"]).unwrap_or(0.0),
            change_point: 0.0,
            change_percent: 0.0,
            amount: num(&row["f6"]).unwrap_or(0.0),
            prev_amount: None,
            volume: num(&row["f5"]).unwrap_or(0.0),
            timestamp: now,
        };
        // Upstream f3/f4 are ignored; their scaling differs between endpoints.
        idx.recompute_change();
        out.push(idx);
    }

    if out.is_empty() {
        return Err(FetchError::decode(FEED_INDICES, "no usable index rows"));
    }
    Ok(out)
}

fn parse_news(body: &Value) -> Result<Vec<NewsItem>, FetchError> {
    let rows = body
        .pointer("/data/fastNewsList")
        .and_then(Value::as_array)
        .ok_or_else(|| FetchError::decode(FEED_NEWS, "missing data.fastNewsList"))?;

    let mut out = Vec::with_capacity(rows.len());
    for row in rows {
        let Some(id) = text(&row["code"]) else {
            continue;
        };
        let summary = text(&row["summary"]).unwrap_or_default();
        let title = text(&row["title"])
            .or_else(|| bracketed_title(&summary))
            .unwrap_or_default();
        if title.is_empty() && summary.is_empty() {
            continue;
        }

        let related_codes: Vec<String> = row["stockList"]
            .as_array()
            .map(|list| {
                list.iter()
                    .filter_map(text)
                    .map(|s| normalize_code(&s))
                    .filter(|c| c.len() == 6 && c.bytes().all(|b| b.is_ascii_digit()))
                    .collect()
            })
            .unwrap_or_default();

        let labels = label_news(&title, &summary, related_codes.len());
        out.push(NewsItem {
            id,
            title,
            summary,
            source: FEED_NEWS.to_string(),
            publish_time: text(&row["showTime"]).unwrap_or_default(),
            related_codes,
            importance: labels.importance,
            sentiment: labels.sentiment,
            impact: labels.impact,
        });
    }
    Ok(out)
}

/// Flash items often carry no title and lead with `【headline】body`.
fn bracketed_title(summary: &str) -> Option<String> {
    let rest = summary.strip_prefix('【')?;
    let end = rest.find('】')?;
    Some(rest[..end].trim().to_string()).filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fetcher(base: &str) -> MarketSnapshotFetcher {
        MarketSnapshotFetcher::new(
            FeedHttp::new(std::time::Duration::from_secs(5)).unwrap(),
            FeedEndpoints::all_at(base),
        )
    }

    #[test]
    fn index_change_is_recomputed_locally() {
        let body = json!({
            "data": {"diff": [
                {"f2": 3300.0, "f3": 999.0, "f4": 999.0, "f5": 4.1e8, "f6": 5.2e11,
                 "f12": "000001", "f14": "上证指数", "f15": 3310.0, "f16": 3280.0,
                 "f17": 3290.0, "f18": 3000.0},
                {"f2": "-", "f12": "399001", "f14": "深证成指"}
            ]}
        });
        let out = parse_indices(&body).unwrap();
        assert_eq!(out.len(), 1);
        assert!((out[0].change_percent - 10.0).abs() < 1e-9);
        assert!((out[0].change_point - 300.0).abs() < 1e-9);
        assert_eq!(out[0].prev_amount, None);
    }

    #[test]
    fn empty_index_payload_is_an_error() {
        assert!(parse_indices(&json!({"data": {"diff": []}})).is_err());
        assert!(parse_indices(&json!({"data": null})).is_err());
    }

    #[test]
    fn news_rows_are_normalized_and_labelled() {
        let body = json!({
            "data": {"fastNewsList": [
                {"code": "202603101", "title": "", "summary": "【贵州茅台回购股份】公司拟回购不超过30亿元",
                 "showTime": "2026-03-10 09:31:00", "stockList": ["1.600519", "105.AAPL"]},
                {"code": "202603102", "title": "", "summary": ""}
            ]}
        });
        let out = parse_news(&body).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].title, "贵州茅台回购股份");
        assert_eq!(out[0].related_codes, vec!["600519"]);
        assert_eq!(out[0].sentiment, crate::domain::market::Sentiment::Positive);
    }

    #[tokio::test]
    async fn fetch_indices_over_http() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/qt/ulist.np/get"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": {"diff": [{"f2": 10.0, "f12": "000300", "f14": "沪深300", "f18": 8.0}]}
            })))
            .mount(&server)
            .await;

        let out = fetcher(&server.uri()).fetch_indices().await.unwrap();
        assert_eq!(out[0].code, "000300");
        assert!((out[0].change_percent - 25.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn non_success_status_is_a_fetch_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/comm/web/getFastNewsList"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let err = fetcher(&server.uri()).fetch_news(20).await.unwrap_err();
        assert!(matches!(err, FetchError::Status { status: 503, .. }));
        assert_eq!(err.feed(), FEED_NEWS);
    }
}
