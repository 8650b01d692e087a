use crate::domain::market::{ImpactLevel, NewsItem, Sentiment};

pub const DEFAULT_RELATED_NEWS: usize = 5;

const POSITIVE_KEYWORDS: &[&str] = &[
    "涨停", "大涨", "增长", "预增", "中标", "回购", "增持", "突破", "利好", "签约", "获批",
    "创新高", "超预期", "扭亏",
];

const NEGATIVE_KEYWORDS: &[&str] = &[
    "跌停", "大跌", "下滑", "预亏", "减持", "立案", "处罚", "违规", "利空", "退市", "亏损",
    "暴雷", "问询", "风险提示",
];

// Policy / macro wording that tends to move the whole market.
const MARKET_MOVING_KEYWORDS: &[&str] = &[
    "央行", "国务院", "证监会", "降准", "降息", "印花税", "LPR", "重磅", "突发",
];

/// Up to `max_count` items from `pool` relevant to the instrument, in pool order.
///
/// An item matches when the code is in its explicit list, or when the code or the name
/// occurs (case-sensitive) in its title or summary.
pub fn related_news(code: &str, name: &str, pool: &[NewsItem], max_count: usize) -> Vec<NewsItem> {
    pool.iter()
        .filter(|item| is_related(code, name, item))
        .take(max_count)
        .cloned()
        .collect()
}

fn is_related(code: &str, name: &str, item: &NewsItem) -> bool {
    if item.related_codes.iter().any(|c| c == code) {
        return true;
    }
    let mentions = |needle: &str| {
        !needle.is_empty() && (item.title.contains(needle) || item.summary.contains(needle))
    };
    mentions(code) || mentions(name)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NewsLabels {
    pub importance: u8,
    pub sentiment: Sentiment,
    pub impact: ImpactLevel,
}

pub fn label_news(title: &str, summary: &str, related_codes: usize) -> NewsLabels {
    let count = |words: &[&str]| {
        words
            .iter()
            .filter(|w| title.contains(*w) || summary.contains(*w))
            .count()
    };

    let positive = count(POSITIVE_KEYWORDS);
    let negative = count(NEGATIVE_KEYWORDS);
    let market_moving = count(MARKET_MOVING_KEYWORDS);

    let sentiment = match positive.cmp(&negative) {
        std::cmp::Ordering::Greater => Sentiment::Positive,
        std::cmp::Ordering::Less => Sentiment::Negative,
        std::cmp::Ordering::Equal => Sentiment::Neutral,
    };

    let mut score = 1usize;
    score += market_moving * 2;
    score += (positive + negative).min(2);
    if related_codes > 0 {
        score += 1;
    }
    let importance = score.clamp(1, 5) as u8;

    let impact = match importance {
        4..=5 => ImpactLevel::High,
        2..=3 => ImpactLevel::Medium,
        _ => ImpactLevel::Low,
    };

    NewsLabels {
        importance,
        sentiment,
        impact,
    }
}
