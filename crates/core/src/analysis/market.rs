use crate::domain::hot_stock::{HotStockSnapshot, LimitUpType};
use crate::domain::market::MarketIndex;
use crate::domain::recommendation::MarketAnalysis;
use chrono::{DateTime, Utc};

/// Rule-based market temperature from the latest indices and hot-stock lists.
pub fn summarize_market(
    indices: &[MarketIndex],
    hot: Option<&HotStockSnapshot>,
    now: DateTime<Utc>,
) -> MarketAnalysis {
    let indices_up = indices.iter().filter(|i| i.change_percent > 0.0).count();
    let indices_down = indices.iter().filter(|i| i.change_percent < 0.0).count();
    let average_index_change = if indices.is_empty() {
        0.0
    } else {
        indices.iter().map(|i| i.change_percent).sum::<f64>() / indices.len() as f64
    };

    let (limit_up_count, one_word_count, max_continuous_days, dragon_tiger_net_flow) = match hot {
        Some(h) => (
            h.limit_up.len(),
            h.limit_up
                .iter()
                .filter(|i| i.limit_type == LimitUpType::OneWord)
                .count(),
            h.continuous_limit
                .iter()
                .map(|i| i.continuous_days)
                .chain(h.limit_up.iter().map(|i| i.continuous_days))
                .max()
                .unwrap_or(0),
            h.dragon_tiger.iter().map(|i| i.net_buy).sum::<f64>(),
        ),
        None => (0, 0, 0, 0.0),
    };

    let breadth = if indices.is_empty() {
        0.0
    } else {
        (indices_up as f64 - indices_down as f64) / indices.len() as f64 * 15.0
    };
    let trend = (average_index_change * 8.0).clamp(-20.0, 20.0);
    let limit_up = limit_up_count.min(100) as f64 * 0.15;
    let ladder = max_continuous_days.min(6) as f64 * 1.5;
    // 万 -> 亿, a few 亿 of net flow either way is already a strong read.
    let flow = (dragon_tiger_net_flow / 10_000.0).clamp(-5.0, 5.0);

    let temperature = (50.0 + breadth + trend + limit_up + ladder + flow).clamp(0.0, 100.0);
    let sentiment = sentiment_label(temperature).to_string();
    let headline = format!(
        "{sentiment}：指数{indices_up}涨{indices_down}跌，涨停{limit_up_count}家（一字{one_word_count}），最高{max_continuous_days}连板"
    );

    MarketAnalysis {
        trade_date: hot.map(|h| h.trade_date.clone()),
        generated_at: now,
        indices_up,
        indices_down,
        average_index_change,
        limit_up_count,
        one_word_count,
        max_continuous_days,
        dragon_tiger_net_flow,
        temperature,
        sentiment,
        headline,
    }
}

fn sentiment_label(temperature: f64) -> &'static str {
    match temperature {
        t if t >= 75.0 => "过热",
        t if t >= 60.0 => "活跃",
        t if t >= 40.0 => "平稳",
        t if t >= 25.0 => "低迷",
        _ => "冰点",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::hot_stock::{ContinuousLimitItem, LimitUpItem};

    fn index(change_percent: f64) -> MarketIndex {
        MarketIndex {
            code: "000001".to_string(),
            name: "上证指数".to_string(),
            open: 0.0,
            high: 0.0,
            low: 0.0,
            current: 0.0,
            pre_close: 0.0,
            change_point: 0.0,
            change_percent,
            amount: 0.0,
            prev_amount: None,
            volume: 0.0,
            timestamp: Utc::now(),
        }
    }

    fn limit_up(code: &str, limit_type: LimitUpType, continuous_days: u32) -> LimitUpItem {
        LimitUpItem {
            code: code.to_string(),
            name: code.to_string(),
            price: 10.0,
            change_percent: 10.0,
            amount: 0.0,
            float_market_cap: 0.0,
            turnover_rate: 0.5,
            seal_fund: 0.0,
            first_seal_time: "09:30:00".to_string(),
            last_seal_time: "09:30:00".to_string(),
            open_count: 0,
            continuous_days,
            industry: String::new(),
            limit_type,
        }
    }

    #[test]
    fn empty_inputs_are_neutral() {
        let a = summarize_market(&[], None, Utc::now());
        assert_eq!(a.temperature, 50.0);
        assert_eq!(a.sentiment, "平稳");
        assert_eq!(a.trade_date, None);
    }

    #[test]
    fn counts_come_from_the_hot_lists() {
        let hot = HotStockSnapshot {
            trade_date: "20260310".to_string(),
            scanned_at: Utc::now(),
            dragon_tiger: Vec::new(),
            limit_up: vec![
                limit_up("600001", LimitUpType::OneWord, 1),
                limit_up("600002", LimitUpType::Turnover, 2),
            ],
            continuous_limit: vec![ContinuousLimitItem {
                code: "600003".to_string(),
                name: "600003".to_string(),
                price: 10.0,
                change_percent: 10.0,
                continuous_days: 5,
                open_count: 0,
                turnover_rate: 2.0,
                industry: String::new(),
                limit_type: LimitUpType::TShape,
            }],
            top_gainers: Vec::new(),
            diagnostics: Vec::new(),
        };
        let a = summarize_market(&[index(1.2), index(-0.3), index(0.8)], Some(&hot), Utc::now());
        assert_eq!((a.indices_up, a.indices_down), (2, 1));
        assert_eq!(a.limit_up_count, 2);
        assert_eq!(a.one_word_count, 1);
        assert_eq!(a.max_continuous_days, 5);
        assert_eq!(a.trade_date.as_deref(), Some("20260310"));
        assert!(a.temperature > 50.0);
    }

    #[test]
    fn broad_selloff_reads_cold() {
        let a = summarize_market(&[index(-3.0), index(-2.5), index(-4.0)], None, Utc::now());
        assert!(a.temperature < 25.0);
        assert_eq!(a.sentiment, "冰点");
    }
}
