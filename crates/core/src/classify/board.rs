//! Board allow-lists, limit-up typing and the fixed unit conversions applied to pool feeds.

use crate::domain::hot_stock::LimitUpType;

/// Main-board prefixes for dragon-tiger, limit-up and continuous-limit lists.
/// ChiNext (300), STAR (688) and Beijing codes are excluded.
pub const MAIN_BOARD_PREFIXES: &[&str] = &["60", "601", "603", "605", "000", "001", "002"];

pub const TOP_GAINER_PREFIXES: &[&str] = &["600", "601", "603", "605", "000"];

pub const SPECIAL_TREATMENT_MARKER: &str = "ST";

pub const DRAGON_TIGER_MAX_CHANGE_PERCENT: f64 = 9.0;

const ONE_WORD_MAX_TURNOVER: f64 = 1.0;
const T_SHAPE_MAX_TURNOVER: f64 = 3.0;

fn is_six_digit_code(code: &str) -> bool {
    code.len() == 6 && code.bytes().all(|b| b.is_ascii_digit())
}

fn has_prefix(code: &str, prefixes: &[&str]) -> bool {
    is_six_digit_code(code) && prefixes.iter().any(|p| code.starts_with(p))
}

pub fn is_main_board(code: &str) -> bool {
    has_prefix(code, MAIN_BOARD_PREFIXES)
}

pub fn is_top_gainer_eligible(code: &str, name: &str) -> bool {
    has_prefix(code, TOP_GAINER_PREFIXES) && !name.contains(SPECIAL_TREATMENT_MARKER)
}

pub fn is_dragon_tiger_eligible(code: &str, change_percent: f64) -> bool {
    is_main_board(code) && change_percent < DRAGON_TIGER_MAX_CHANGE_PERCENT
}

/// Evaluated in order; the lower bound of each class is exclusive.
pub fn classify_limit_up(turnover_rate: f64, open_count: u32) -> LimitUpType {
    if turnover_rate < ONE_WORD_MAX_TURNOVER && open_count == 0 {
        LimitUpType::OneWord
    } else if turnover_rate < T_SHAPE_MAX_TURNOVER && open_count == 0 {
        LimitUpType::TShape
    } else {
        LimitUpType::Turnover
    }
}

/// Yuan → 万.
pub fn yuan_to_wan(v: f64) -> f64 {
    v / 10_000.0
}

/// Yuan → 亿.
pub fn yuan_to_yi(v: f64) -> f64 {
    v / 100_000_000.0
}

/// Percentages the feed sends multiplied by 100.
pub fn from_hundredths(v: f64) -> f64 {
    v / 100.0
}
