use crate::domain::hot_stock::HotStockSnapshot;
use crate::domain::market::{MarketIndex, NewsItem};
use crate::domain::recommendation::MarketAnalysis;
use serde::{Deserialize, Serialize};
use std::fmt::Write;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    Quant,
    Momentum,
    Combined,
}

impl Strategy {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "quant" | "quantitative" => Some(Self::Quant),
            "momentum" | "hot_money" => Some(Self::Momentum),
            "combined" | "mixed" => Some(Self::Combined),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Strategy::Quant => "quant",
            Strategy::Momentum => "momentum",
            Strategy::Combined => "combined",
        }
    }

    fn brief(self) -> &'static str {
        match self {
            Strategy::Quant => "量化选股：偏重基本面、估值与量价因子，category 用 quantitative。",
            Strategy::Momentum => {
                "游资短线：偏重涨停封板质量、连板高度与龙虎榜资金，category 用 momentum。"
            }
            Strategy::Combined => "综合：同时考虑量化因子与游资动向，category 用 combined。",
        }
    }
}

pub fn system_prompt() -> String {
    [
        "你是一名 A 股短线与量化分析助手，只做分析，不构成投资建议。",
        "Return ONLY one JSON object. No markdown, no prose before or after it.",
        "Output schema:",
        "{",
        "  \"code\": \"600519\",",
        "  \"name\": \"贵州茅台\",",
        "  \"category\": \"quantitative | momentum | combined\",",
        "  \"confidence\": 0,",
        "  \"target_price\": null,",
        "  \"entry_price\": null,",
        "  \"stop_loss\": null,",
        "  \"holding_period\": \"intraday | short | swing | medium\",",
        "  \"reasoning\": \"2-4 句中文理由\",",
        "  \"quant_signal\": {\"score\": 0, \"factors\": [], \"valuation\": null},",
        "  \"momentum_signal\": {\"limit_up_type\": null, \"continuous_days\": null, \"dragon_tiger_net_buy\": null, \"sentiment\": null}",
        "}",
        "Rules:",
        "- confidence and quant_signal.score are in [0, 100]",
        "- prices are in yuan and positive, or null when unknown",
        "- quant_signal / momentum_signal may be null when not applicable",
        "- Use only the data provided; do not invent quotes",
    ]
    .join("\n")
}

pub fn instrument_prompt(
    code: &str,
    name: &str,
    indices: &[MarketIndex],
    hot: Option<&HotStockSnapshot>,
    news: &[NewsItem],
) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Task: 分析 {name}（{code}）的短线机会并给出一条建议。");
    let _ = writeln!(out, "返回的 code 必须是 \"{code}\"。\n");
    push_indices(&mut out, indices);
    push_instrument_hot_context(&mut out, code, hot);
    push_news(&mut out, news);
    out
}

pub fn strategy_prompt(
    strategy: Strategy,
    indices: &[MarketIndex],
    hot: Option<&HotStockSnapshot>,
    news: &[NewsItem],
    analysis: Option<&MarketAnalysis>,
) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Task: 从下列热门股中挑选一只最值得关注的主板股票并给出建议。");
    let _ = writeln!(out, "策略：{}\n", strategy.brief());
    if let Some(a) = analysis {
        let _ = writeln!(
            out,
            "市场温度：{:.0}（{}）。{}\n",
            a.temperature, a.sentiment, a.headline
        );
    }
    push_indices(&mut out, indices);
    push_market_hot_context(&mut out, hot);
    push_news(&mut out, news);
    out
}

fn push_indices(out: &mut String, indices: &[MarketIndex]) {
    let _ = writeln!(out, "指数：");
    if indices.is_empty() {
        let _ = writeln!(out, "- 暂无数据");
    }
    for i in indices {
        let _ = write!(
            out,
            "- {} {:.2} ({:+.2}%, {:+.2}点) 成交额 {:.0} 亿",
            i.name,
            i.current,
            i.change_percent,
            i.change_point,
            i.amount / 100_000_000.0
        );
        if let Some(delta) = i.amount_change() {
            let _ = write!(out, "，较上次 {:+.1} 亿", delta / 100_000_000.0);
        }
        out.push('\n');
    }
    out.push('\n');
}

fn push_instrument_hot_context(out: &mut String, code: &str, hot: Option<&HotStockSnapshot>) {
    let _ = writeln!(out, "热门榜单：");
    let Some(hot) = hot else {
        let _ = writeln!(out, "- 暂无榜单数据\n");
        return;
    };

    let mut listed = false;
    if let Some(i) = hot.limit_up.iter().find(|i| i.code == code) {
        listed = true;
        let _ = writeln!(
            out,
            "- 涨停池：{}，{}连板，封单 {:.0} 万，首封 {}，开板 {} 次，换手 {:.2}%，行业 {}",
            i.limit_type.label(),
            i.continuous_days,
            i.seal_fund,
            i.first_seal_time,
            i.open_count,
            i.turnover_rate,
            i.industry
        );
    }
    if let Some(i) = hot.continuous_limit.iter().find(|i| i.code == code) {
        listed = true;
        let _ = writeln!(
            out,
            "- 连板池：{} 连板，{}",
            i.continuous_days,
            i.limit_type.label()
        );
    }
    if let Some(i) = hot.dragon_tiger.iter().find(|i| i.code == code) {
        listed = true;
        let _ = writeln!(
            out,
            "- 龙虎榜：净买入 {:.0} 万（买 {:.0} / 卖 {:.0}），涨幅 {:.2}%，原因：{}",
            i.net_buy, i.buy_amount, i.sell_amount, i.change_percent, i.reason
        );
    }
    if let Some(i) = hot.top_gainers.iter().find(|i| i.code == code) {
        listed = true;
        let _ = writeln!(
            out,
            "- 涨幅榜：{:+.2}%，成交额 {:.2} 亿，量比 {:.2}",
            i.change_percent, i.amount, i.volume_ratio
        );
    }
    if !listed {
        let _ = writeln!(out, "- 今日未上榜（{}）", hot.trade_date);
    }
    out.push('\n');
}

// Keeps the market-wide prompt bounded.
const MAX_LIST_ROWS: usize = 10;

fn push_market_hot_context(out: &mut String, hot: Option<&HotStockSnapshot>) {
    let Some(hot) = hot else {
        let _ = writeln!(out, "热门榜单：暂无数据\n");
        return;
    };
    let _ = writeln!(out, "热门榜单（{}）：", hot.trade_date);

    let _ = writeln!(out, "涨停池：");
    for i in hot.limit_up.iter().take(MAX_LIST_ROWS) {
        let _ = writeln!(
            out,
            "- {} {} {} {}连板 封单{:.0}万",
            i.code,
            i.name,
            i.limit_type.label(),
            i.continuous_days,
            i.seal_fund
        );
    }
    let _ = writeln!(out, "连板池：");
    for i in hot.continuous_limit.iter().take(MAX_LIST_ROWS) {
        let _ = writeln!(out, "- {} {} {}连板", i.code, i.name, i.continuous_days);
    }
    let _ = writeln!(out, "龙虎榜（按净买入）：");
    for i in hot.dragon_tiger_by_net_buy().iter().take(MAX_LIST_ROWS) {
        let _ = writeln!(out, "- {} {} 净买入{:.0}万 {}", i.code, i.name, i.net_buy, i.reason);
    }
    let _ = writeln!(out, "涨幅榜：");
    for i in hot.top_gainers.iter().take(MAX_LIST_ROWS) {
        let _ = writeln!(
            out,
            "- {} {} {:+.2}% 量比{:.2}",
            i.code, i.name, i.change_percent, i.volume_ratio
        );
    }
    out.push('\n');
}

fn push_news(out: &mut String, news: &[NewsItem]) {
    let _ = writeln!(out, "相关资讯：");
    if news.is_empty() {
        let _ = writeln!(out, "- 无");
    }
    for n in news {
        let _ = writeln!(
            out,
            "- [{}] {}（重要性 {}）",
            n.publish_time, n.title, n.importance
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::hot_stock::{DragonTigerItem, LimitUpItem, LimitUpType};
    use chrono::Utc;

    fn snapshot() -> HotStockSnapshot {
        HotStockSnapshot {
            trade_date: "20260310".to_string(),
            scanned_at: Utc::now(),
            dragon_tiger: vec![DragonTigerItem {
                code: "600111".to_string(),
                name: "北方稀土".to_string(),
                close_price: 30.0,
                change_percent: 6.5,
                net_buy: 12_000.0,
                buy_amount: 30_000.0,
                sell_amount: 18_000.0,
                turnover_rate: 5.0,
                float_market_cap: 1000.0,
                reason: "日涨幅偏离值达7%".to_string(),
            }],
            limit_up: vec![LimitUpItem {
                code: "002594".to_string(),
                name: "比亚迪".to_string(),
                price: 300.0,
                change_percent: 10.0,
                amount: 500_000.0,
                float_market_cap: 3000.0,
                turnover_rate: 2.1,
                seal_fund: 80_000.0,
                first_seal_time: "09:42:10".to_string(),
                last_seal_time: "10:01:00".to_string(),
                open_count: 0,
                continuous_days: 2,
                industry: "汽车整车".to_string(),
                limit_type: LimitUpType::TShape,
            }],
            continuous_limit: Vec::new(),
            top_gainers: Vec::new(),
            diagnostics: Vec::new(),
        }
    }

    #[test]
    fn instrument_prompt_carries_hot_context_for_that_code_only() {
        let p = instrument_prompt("002594", "比亚迪", &[], Some(&snapshot()), &[]);
        assert!(p.contains("T字板"));
        assert!(p.contains("2连板"));
        assert!(!p.contains("北方稀土"));
        assert!(p.contains("\"002594\""));
    }

    #[test]
    fn unlisted_instrument_says_so() {
        let p = instrument_prompt("600519", "贵州茅台", &[], Some(&snapshot()), &[]);
        assert!(p.contains("今日未上榜"));
    }

    #[test]
    fn strategy_prompt_lists_the_market() {
        let p = strategy_prompt(Strategy::Momentum, &[], Some(&snapshot()), &[], None);
        assert!(p.contains("游资短线"));
        assert!(p.contains("600111 北方稀土"));
        assert!(p.contains("002594 比亚迪"));
    }

    #[test]
    fn strategy_parse_accepts_aliases() {
        assert_eq!(Strategy::parse("Quantitative"), Some(Strategy::Quant));
        assert_eq!(Strategy::parse("hot_money"), Some(Strategy::Momentum));
        assert_eq!(Strategy::parse("yolo"), None);
    }
}
