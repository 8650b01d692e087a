use crate::classify::board::{
    from_hundredths, is_dragon_tiger_eligible, is_main_board, is_top_gainer_eligible,
    yuan_to_wan, yuan_to_yi,
};
use crate::classify::classify_limit_up;
use crate::domain::hot_stock::{
    ContinuousLimitItem, DragonTigerItem, HotSource, HotStockSnapshot, LimitUpItem,
    SourceDiagnostic, TopGainerItem,
};
use crate::ingest::error::FetchError;
use crate::ingest::http::{num, text, FeedEndpoints, FeedHttp};
use crate::time::calendar::parse_trade_date_key;
use chrono::Utc;
use serde_json::Value;
use std::collections::HashSet;
use std::future::Future;
use std::time::Instant;

const FEED_DRAGON_TIGER: &str = "eastmoney_billboard";
const FEED_LIMIT_UP: &str = "eastmoney_zt_pool";
const FEED_CONTINUOUS: &str = "eastmoney_zt_pool_lbc";
const FEED_TOP_GAINERS: &str = "eastmoney_clist";

const POOL_UT: &str = "7eea3edcaed734bea9cbfc24409ed989";
const CLIST_UT: &str = "bd1d9ddb04089700cf9c27f6f7426281";
// 沪深 A 股 (main + SME + ChiNext + STAR); board filtering happens locally.
const CLIST_FS: &str = "m:0+t:6,m:0+t:80,m:1+t:2,m:1+t:23";
const TOP_GAINERS_PAGE_SIZE: usize = 100;

// datacenter answers "no data" with a null result and this code.
const DATACENTER_EMPTY_CODE: i64 = 9201;

const MIN_CONTINUOUS_DAYS: u32 = 2;

#[derive(Debug)]
struct SourceBatch<T> {
    items: Vec<T>,
    dropped: usize,
}

impl<T> SourceBatch<T> {
    fn new() -> Self {
        Self {
            items: Vec::new(),
            dropped: 0,
        }
    }
}

/// Scrapes the four hot-money lists. Each source is isolated: one failing never empties the
/// others, and `scan` itself never fails.
#[derive(Debug, Clone)]
pub struct HotStockScanner {
    http: FeedHttp,
    endpoints: FeedEndpoints,
}

impl HotStockScanner {
    pub fn new(http: FeedHttp, endpoints: FeedEndpoints) -> Self {
        Self { http, endpoints }
    }

    pub async fn scan(&self, trade_date: &str) -> HotStockSnapshot {
        let (dragon_tiger, limit_up, continuous, top_gainers) = tokio::join!(
            timed(self.fetch_dragon_tiger(trade_date)),
            timed(self.fetch_limit_up(trade_date)),
            timed(self.fetch_continuous_limit(trade_date)),
            timed(self.fetch_top_gainers()),
        );

        let mut diagnostics = Vec::with_capacity(HotSource::ALL.len());
        let snapshot = HotStockSnapshot {
            trade_date: trade_date.to_string(),
            scanned_at: Utc::now(),
            dragon_tiger: settle(
                HotSource::DragonTiger,
                trade_date,
                dragon_tiger,
                &mut diagnostics,
            ),
            limit_up: settle(HotSource::LimitUp, trade_date, limit_up, &mut diagnostics),
            continuous_limit: settle(
                HotSource::ContinuousLimit,
                trade_date,
                continuous,
                &mut diagnostics,
            ),
            top_gainers: settle(HotSource::TopGainers, trade_date, top_gainers, &mut diagnostics),
            diagnostics,
        };

        tracing::info!(
            trade_date,
            dragon_tiger = snapshot.dragon_tiger.len(),
            limit_up = snapshot.limit_up.len(),
            continuous_limit = snapshot.continuous_limit.len(),
            top_gainers = snapshot.top_gainers.len(),
            failed = ?snapshot.failed_sources(),
            "hot stock scan finished"
        );
        snapshot
    }

    async fn fetch_dragon_tiger(
        &self,
        trade_date: &str,
    ) -> Result<SourceBatch<DragonTigerItem>, FetchError> {
        let date = parse_trade_date_key(trade_date)
            .map_err(|err| FetchError::decode(FEED_DRAGON_TIGER, err.to_string()))?
            .format("%Y-%m-%d")
            .to_string();

        let url = FeedEndpoints::url(&self.endpoints.datacenter_base_url, "/api/data/v1/get");
        let query = [
            ("reportName", "RPT_DAILYBILLBOARD_DETAILSNEW".to_string()),
            ("columns", "ALL".to_string()),
            ("source", "WEB".to_string()),
            ("client", "WEB".to_string()),
            ("pageNumber", "1".to_string()),
            ("pageSize", "500".to_string()),
            ("sortColumns", "BILLBOARD_NET_AMT".to_string()),
            ("sortTypes", "-1".to_string()),
            ("filter", format!("(TRADE_DATE<='{date}')(TRADE_DATE>='{date}')")),
        ];
        let body = self.http.get_json(FEED_DRAGON_TIGER, &url, &query).await?;
        parse_dragon_tiger(&body)
    }

    async fn fetch_limit_up(
        &self,
        trade_date: &str,
    ) -> Result<SourceBatch<LimitUpItem>, FetchError> {
        let body = self.fetch_zt_pool(FEED_LIMIT_UP, trade_date, "fbt:asc").await?;
        parse_limit_up(&body)
    }

    async fn fetch_continuous_limit(
        &self,
        trade_date: &str,
    ) -> Result<SourceBatch<ContinuousLimitItem>, FetchError> {
        let body = self.fetch_zt_pool(FEED_CONTINUOUS, trade_date, "lbc:desc").await?;
        parse_continuous_limit(&body)
    }

    async fn fetch_zt_pool(
        &self,
        feed: &'static str,
        trade_date: &str,
        sort: &str,
    ) -> Result<Value, FetchError> {
        let url = FeedEndpoints::url(&self.endpoints.pool_base_url, "/getTopicZTPool");
        let query = [
            ("ut", POOL_UT.to_string()),
            ("dpt", "wz.ztzt".to_string()),
            ("Pageindex", "0".to_string()),
            ("pagesize", "320".to_string()),
            ("sort", sort.to_string()),
            ("date", trade_date.to_string()),
        ];
        self.http.get_json(feed, &url, &query).await
    }

    async fn fetch_top_gainers(&self) -> Result<SourceBatch<TopGainerItem>, FetchError> {
        let url = FeedEndpoints::url(&self.endpoints.quote_base_url, "/api/qt/clist/get");
        let query = [
            ("pn", "1".to_string()),
            ("pz", TOP_GAINERS_PAGE_SIZE.to_string()),
            ("po", "1".to_string()),
            ("np", "1".to_string()),
            ("ut", CLIST_UT.to_string()),
            ("fid", "f3".to_string()),
            ("fs", CLIST_FS.to_string()),
            ("fields", "f2,f3,f6,f8,f10,f12,f14".to_string()),
        ];
        let body = self.http.get_json(FEED_TOP_GAINERS, &url, &query).await?;
        parse_top_gainers(&body)
    }
}

async fn timed<T>(fut: impl Future<Output = T>) -> (T, u64) {
    let t0 = Instant::now();
    let out = fut.await;
    (out, t0.elapsed().as_millis() as u64)
}

fn settle<T>(
    source: HotSource,
    trade_date: &str,
    (result, elapsed_ms): (Result<SourceBatch<T>, FetchError>, u64),
    diagnostics: &mut Vec<SourceDiagnostic>,
) -> Vec<T> {
    match result {
        Ok(batch) => {
            tracing::debug!(
                source = source.as_str(),
                trade_date,
                items = batch.items.len(),
                dropped = batch.dropped,
                elapsed_ms,
                "hot stock source ok"
            );
            diagnostics.push(SourceDiagnostic {
                source,
                ok: true,
                items: batch.items.len(),
                dropped: batch.dropped,
                elapsed_ms,
                error: None,
            });
            batch.items
        }
        Err(err) => {
            tracing::warn!(
                source = source.as_str(),
                trade_date,
                elapsed_ms,
                timeout = err.is_timeout(),
                error = %err,
                "hot stock source failed; continuing with the other sources"
            );
            diagnostics.push(SourceDiagnostic {
                source,
                ok: false,
                items: 0,
                dropped: 0,
                elapsed_ms,
                error: Some(err.to_string()),
            });
            Vec::new()
        }
    }
}

fn parse_dragon_tiger(body: &Value) -> Result<SourceBatch<DragonTigerItem>, FetchError> {
    let rows = match body.pointer("/result/data").and_then(Value::as_array) {
        Some(rows) => rows,
        None if body["code"].as_i64() == Some(DATACENTER_EMPTY_CODE) => {
            return Ok(SourceBatch::new());
        }
        None => {
            let message =
                text(&body["message"]).unwrap_or_else(|| "missing result.data".to_string());
            return Err(FetchError::decode(FEED_DRAGON_TIGER, message));
        }
    };

    let mut out = SourceBatch::new();
    let mut seen = HashSet::new();
    for row in rows {
        let (Some(code), Some(name), Some(change_percent), Some(net)) = (
            text(&row["SECURITY_CODE"]),
            text(&row["SECURITY_NAME_ABBR"]),
            num(&row["CHANGE_RATE"]),
            num(&row["BILLBOARD_NET_AMT"]),
        ) else {
            out.dropped += 1;
            continue;
        };

        // One stock can be listed several times a day under different reasons.
        if !is_dragon_tiger_eligible(&code, change_percent) || !seen.insert(code.clone()) {
            out.dropped += 1;
            continue;
        }

        out.items.push(DragonTigerItem {
            code,
            name,
            close_price: num(&row["CLOSE_PRICE"]).unwrap_or(0.0),
            change_percent,
            net_buy: yuan_to_wan(net),
            buy_amount: yuan_to_wan(num(&row["BILLBOARD_BUY_AMT"]).unwrap_or(0.0)),
            sell_amount: yuan_to_wan(num(&row["BILLBOARD_SELL_AMT"]).unwrap_or(0.0)),
            turnover_rate: num(&row["TURNOVERRATE"]).unwrap_or(0.0),
            float_market_cap: yuan_to_yi(num(&row["FREE_MARKET_CAP"]).unwrap_or(0.0)),
            reason: text(&row["EXPLANATION"]).unwrap_or_default(),
        });
    }
    Ok(out)
}

#[derive(Debug)]
struct PoolRow {
    code: String,
    name: String,
    price: f64,
    change_percent: f64,
    amount: f64,
    float_market_cap: f64,
    turnover_rate: f64,
    seal_fund: f64,
    first_seal_time: String,
    last_seal_time: String,
    open_count: u32,
    continuous_days: u32,
    industry: String,
}

fn pool_rows(feed: &'static str, body: &Value) -> Result<Vec<Option<PoolRow>>, FetchError> {
    // The pool is null on days without any limit-up (and on closed days).
    let data = &body["data"];
    if data.is_null() {
        return Ok(Vec::new());
    }
    let rows = data["pool"]
        .as_array()
        .ok_or_else(|| FetchError::decode(feed, "missing data.pool"))?;

    Ok(rows.iter().map(pool_row).collect())
}

fn pool_row(row: &Value) -> Option<PoolRow> {
    let code = text(&row["c"])?;
    let name = text(&row["n"])?;
    // Price arrives in thousandths of a yuan.
    let price = num(&row["p"])? / 1000.0;
    let turnover_rate = num(&row["hs"])?;
    Some(PoolRow {
        code,
        name,
        price,
        change_percent: num(&row["zdp"]).unwrap_or(0.0),
        amount: yuan_to_wan(num(&row["amount"]).unwrap_or(0.0)),
        float_market_cap: yuan_to_yi(num(&row["ltsz"]).unwrap_or(0.0)),
        turnover_rate,
        seal_fund: yuan_to_wan(num(&row["fund"]).unwrap_or(0.0)),
        first_seal_time: hhmmss(&row["fbt"]),
        last_seal_time: hhmmss(&row["lbt"]),
        open_count: num(&row["zbc"]).map(|v| v.max(0.0) as u32).unwrap_or(0),
        continuous_days: num(&row["lbc"]).map(|v| v.max(1.0) as u32).unwrap_or(1),
        industry: text(&row["hybk"]).unwrap_or_default(),
    })
}

fn parse_limit_up(body: &Value) -> Result<SourceBatch<LimitUpItem>, FetchError> {
    let mut out = SourceBatch::new();
    let mut seen = HashSet::new();
    for row in pool_rows(FEED_LIMIT_UP, body)? {
        let Some(row) = row.filter(|r| is_main_board(&r.code) && seen.insert(r.code.clone()))
        else {
            out.dropped += 1;
            continue;
        };
        out.items.push(LimitUpItem {
            limit_type: classify_limit_up(row.turnover_rate, row.open_count),
            code: row.code,
            name: row.name,
            price: row.price,
            change_percent: row.change_percent,
            amount: row.amount,
            float_market_cap: row.float_market_cap,
            turnover_rate: row.turnover_rate,
            seal_fund: row.seal_fund,
            first_seal_time: row.first_seal_time,
            last_seal_time: row.last_seal_time,
            open_count: row.open_count,
            continuous_days: row.continuous_days,
            industry: row.industry,
        });
    }
    Ok(out)
}

fn parse_continuous_limit(body: &Value) -> Result<SourceBatch<ContinuousLimitItem>, FetchError> {
    let mut out = SourceBatch::new();
    let mut seen = HashSet::new();
    for row in pool_rows(FEED_CONTINUOUS, body)? {
        let Some(row) = row.filter(|r| {
            is_main_board(&r.code)
                && r.continuous_days >= MIN_CONTINUOUS_DAYS
                && seen.insert(r.code.clone())
        }) else {
            out.dropped += 1;
            continue;
        };
        out.items.push(ContinuousLimitItem {
            limit_type: classify_limit_up(row.turnover_rate, row.open_count),
            code: row.code,
            name: row.name,
            price: row.price,
            change_percent: row.change_percent,
            continuous_days: row.continuous_days,
            open_count: row.open_count,
            turnover_rate: row.turnover_rate,
            industry: row.industry,
        });
    }
    Ok(out)
}

fn parse_top_gainers(body: &Value) -> Result<SourceBatch<TopGainerItem>, FetchError> {
    let diff = &body["data"]["diff"];
    // np=1 yields an array; older deployments return an index-keyed object.
    let rows: Vec<&Value> = match diff {
        Value::Array(rows) => rows.iter().collect(),
        Value::Object(map) => map.values().collect(),
        _ => return Err(FetchError::decode(FEED_TOP_GAINERS, "missing data.diff")),
    };

    let mut out = SourceBatch::new();
    let mut seen = HashSet::new();
    for row in rows {
        // clist without fltt sends price, percentages and ratios multiplied by 100.
        let (Some(code), Some(name), Some(price), Some(change)) = (
            text(&row["f12"]),
            text(&row["f14"]),
            num(&row["f2"]),
            num(&row["f3"]),
        ) else {
            out.dropped += 1;
            continue;
        };
        if !is_top_gainer_eligible(&code, &name) || !seen.insert(code.clone()) {
            out.dropped += 1;
            continue;
        }
        out.items.push(TopGainerItem {
            code,
            name,
            price: from_hundredths(price),
            change_percent: from_hundredths(change),
            turnover_rate: from_hundredths(num(&row["f8"]).unwrap_or(0.0)),
            amount: yuan_to_yi(num(&row["f6"]).unwrap_or(0.0)),
            volume_ratio: from_hundredths(num(&row["f10"]).unwrap_or(0.0)),
        });
    }
    Ok(out)
}

/// `93000` → `"09:30:00"`.
fn hhmmss(v: &Value) -> String {
    match num(v) {
        Some(n) if n >= 0.0 => {
            let n = n as u32;
            format!("{:02}:{:02}:{:02}", n / 10_000, (n / 100) % 100, n % 100)
        }
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::hot_stock::LimitUpType;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn billboard_body() -> Value {
        json!({
            "result": {"pages": 1, "count": 4, "data": [
                {"SECURITY_CODE": "600519", "SECURITY_NAME_ABBR": "贵州茅台", "CLOSE_PRICE": 1650.0,
                 "CHANGE_RATE": 5.0, "BILLBOARD_NET_AMT": 123_450_000.0, "BILLBOARD_BUY_AMT": 300_000_000.0,
                 "BILLBOARD_SELL_AMT": 176_550_000.0, "TURNOVERRATE": 0.8, "FREE_MARKET_CAP": 2.07e12,
                 "EXPLANATION": "日涨幅偏离值达到7%"},
                {"SECURITY_CODE": "600519", "SECURITY_NAME_ABBR": "贵州茅台", "CHANGE_RATE": 5.0,
                 "BILLBOARD_NET_AMT": 1.0, "EXPLANATION": "连续三个交易日"},
                {"SECURITY_CODE": "300750", "SECURITY_NAME_ABBR": "宁德时代", "CHANGE_RATE": 3.0,
                 "BILLBOARD_NET_AMT": 9.9e8},
                {"SECURITY_CODE": "000001", "SECURITY_NAME_ABBR": "平安银行", "CHANGE_RATE": 9.5,
                 "BILLBOARD_NET_AMT": 5.0e7}
            ]},
            "success": true,
            "code": 0
        })
    }

    fn pool_body() -> Value {
        json!({
            "rc": 0,
            "data": {"tc": 4, "pool": [
                {"c": "600000", "n": "浦发银行", "p": 10230, "zdp": 10.02, "amount": 1.2e9,
                 "ltsz": 3.0e10, "hs": 0.99, "lbc": 3, "fbt": 93000, "lbt": 93000, "fund": 5.0e8,
                 "zbc": 0, "hybk": "银行"},
                {"c": "002594", "n": "比亚迪", "p": 250000, "zdp": 10.0, "amount": 8.0e9,
                 "ltsz": 7.0e11, "hs": 1.0, "lbc": 1, "fbt": 101502, "lbt": 101502, "fund": 1.0e8,
                 "zbc": 0, "hybk": "汽车整车"},
                {"c": "300750", "n": "宁德时代", "p": 200000, "zdp": 20.0, "hs": 5.0, "lbc": 2},
                {"c": "603259", "n": "药明康德", "p": 60000, "zdp": 10.0, "hs": 6.5, "lbc": 2,
                 "zbc": 3, "hybk": "医疗服务"},
                {"c": "601318", "n": "中国平安"}
            ]}
        })
    }

    fn clist_body() -> Value {
        json!({
            "rc": 0,
            "data": {"total": 4, "diff": [
                {"f2": 1023, "f3": 1002, "f6": 2.5e9, "f8": 523, "f10": 150, "f12": "600000", "f14": "浦发银行"},
                {"f2": 512, "f3": 998, "f6": 1.0e8, "f8": 100, "f10": 90, "f12": "600777", "f14": "*ST新潮"},
                {"f2": 4410, "f3": 1000, "f6": 3.0e8, "f8": 200, "f10": 110, "f12": "002594", "f14": "比亚迪"},
                {"f2": "-", "f3": "-", "f12": "600001", "f14": "停牌股"}
            ]}
        })
    }

    #[test]
    fn dragon_tiger_filters_board_limit_and_duplicates() {
        let batch = parse_dragon_tiger(&billboard_body()).unwrap();
        assert_eq!(batch.items.len(), 1);
        assert_eq!(batch.dropped, 3);
        let item = &batch.items[0];
        assert_eq!(item.code, "600519");
        assert_eq!(item.net_buy, 12_345.0);
        assert_eq!(item.buy_amount, 30_000.0);
        assert_eq!(item.float_market_cap, 20_700.0);
        assert_eq!(item.reason, "日涨幅偏离值达到7%");
    }

    #[test]
    fn dragon_tiger_empty_day_is_not_an_error() {
        let body = json!({"result": null, "success": false, "message": "返回数据为空", "code": 9201});
        assert!(parse_dragon_tiger(&body).unwrap().items.is_empty());

        let body = json!({"result": null, "success": false, "message": "参数错误", "code": 9501});
        assert!(parse_dragon_tiger(&body).is_err());
    }

    #[test]
    fn limit_up_pool_is_typed_and_converted() {
        let batch = parse_limit_up(&pool_body()).unwrap();
        let codes: Vec<_> = batch.items.iter().map(|i| i.code.as_str()).collect();
        assert_eq!(codes, vec!["600000", "002594", "603259"]);
        assert_eq!(batch.dropped, 2);

        let spdb = &batch.items[0];
        assert_eq!(spdb.limit_type, LimitUpType::OneWord);
        assert!((spdb.price - 10.23).abs() < 1e-9);
        assert_eq!(spdb.amount, 120_000.0);
        assert_eq!(spdb.float_market_cap, 300.0);
        assert_eq!(spdb.seal_fund, 50_000.0);
        assert_eq!(spdb.first_seal_time, "09:30:00");
        assert_eq!(batch.items[1].limit_type, LimitUpType::TShape);
        assert_eq!(batch.items[2].limit_type, LimitUpType::Turnover);
    }

    #[test]
    fn continuous_limit_requires_two_days() {
        let batch = parse_continuous_limit(&pool_body()).unwrap();
        let codes: Vec<_> = batch.items.iter().map(|i| i.code.as_str()).collect();
        assert_eq!(codes, vec!["600000", "603259"]);
        assert_eq!(batch.items[0].continuous_days, 3);
    }

    #[test]
    fn null_pool_is_empty() {
        assert!(parse_limit_up(&json!({"rc": 0, "data": null})).unwrap().items.is_empty());
        assert!(parse_limit_up(&json!({"rc": 0, "data": {}})).is_err());
    }

    #[test]
    fn top_gainers_use_narrow_board_list_and_hundredths() {
        let batch = parse_top_gainers(&clist_body()).unwrap();
        assert_eq!(batch.items.len(), 1);
        assert_eq!(batch.dropped, 3);
        let item = &batch.items[0];
        assert_eq!(item.code, "600000");
        assert_eq!(item.change_percent, 10.02);
        assert_eq!(item.price, 10.23);
        assert_eq!(item.turnover_rate, 5.23);
        assert_eq!(item.amount, 25.0);
        assert_eq!(item.volume_ratio, 1.5);
    }

    #[test]
    fn seal_time_formatting() {
        assert_eq!(hhmmss(&json!(93000)), "09:30:00");
        assert_eq!(hhmmss(&json!(145701)), "14:57:01");
        assert_eq!(hhmmss(&json!(null)), "");
    }

    async fn mount_all_but_limit_up(server: &MockServer) {
        Mock::given(method("GET"))
            .and(path("/api/data/v1/get"))
            .respond_with(ResponseTemplate::new(200).set_body_json(billboard_body()))
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path("/getTopicZTPool"))
            .and(query_param("sort", "lbc:desc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(pool_body()))
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/qt/clist/get"))
            .respond_with(ResponseTemplate::new(200).set_body_json(clist_body()))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn limit_up_failure_is_isolated() {
        let server = MockServer::start().await;
        mount_all_but_limit_up(&server).await;
        Mock::given(method("GET"))
            .and(path("/getTopicZTPool"))
            .and(query_param("sort", "fbt:asc"))
            .respond_with(ResponseTemplate::new(502))
            .mount(&server)
            .await;

        let scanner = HotStockScanner::new(
            FeedHttp::new(std::time::Duration::from_secs(5)).unwrap(),
            FeedEndpoints::all_at(&server.uri()),
        );
        let snapshot = scanner.scan("20260310").await;

        assert!(snapshot.limit_up.is_empty());
        assert!(!snapshot.dragon_tiger.is_empty());
        assert!(!snapshot.continuous_limit.is_empty());
        assert!(!snapshot.top_gainers.is_empty());
        assert_eq!(snapshot.failed_sources(), vec![HotSource::LimitUp]);

        let diag = snapshot
            .diagnostics
            .iter()
            .find(|d| d.source == HotSource::LimitUp)
            .unwrap();
        assert!(diag.error.as_deref().unwrap().contains("502"));
    }

    #[tokio::test]
    async fn transport_failure_is_isolated() {
        let server = MockServer::start().await;
        mount_all_but_limit_up(&server).await;
        Mock::given(method("GET"))
            .and(path("/getTopicZTPool"))
            .and(query_param("sort", "fbt:asc"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(pool_body())
                    .set_delay(std::time::Duration::from_secs(3)),
            )
            .mount(&server)
            .await;

        let scanner = HotStockScanner::new(
            FeedHttp::new(std::time::Duration::from_millis(500)).unwrap(),
            FeedEndpoints::all_at(&server.uri()),
        );
        let snapshot = scanner.scan("20260310").await;

        assert!(snapshot.limit_up.is_empty());
        assert_eq!(snapshot.continuous_limit.len(), 2);
        assert_eq!(snapshot.failed_sources(), vec![HotSource::LimitUp]);
    }

    #[tokio::test]
    async fn malformed_trade_date_fails_only_dragon_tiger() {
        let server = MockServer::start().await;
        mount_all_but_limit_up(&server).await;
        Mock::given(method("GET"))
            .and(path("/getTopicZTPool"))
            .and(query_param("sort", "fbt:asc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(pool_body()))
            .mount(&server)
            .await;

        let scanner = HotStockScanner::new(
            FeedHttp::new(std::time::Duration::from_secs(5)).unwrap(),
            FeedEndpoints::all_at(&server.uri()),
        );
        let snapshot = scanner.scan("2026-03-10").await;
        assert!(snapshot.dragon_tiger.is_empty());
        assert_eq!(snapshot.failed_sources(), vec![HotSource::DragonTiger]);
        assert_eq!(snapshot.limit_up.len(), 3);
    }
}
