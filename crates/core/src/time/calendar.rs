use anyhow::Context;
use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use std::path::Path;

// SSE/SZSE trade in China Standard Time (UTC+8, no DST).
const CST_OFFSET_SECS: i32 = 8 * 3600;

pub const MAX_BACKWARD_SEARCH_DAYS: u32 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("no trading day found within 30 days before {from}")]
pub struct CalendarBoundsExceeded {
    pub from: NaiveDate,
}

#[derive(Debug, Deserialize)]
struct YearEntry {
    #[serde(default)]
    holidays: Vec<NaiveDate>,
    #[serde(default)]
    workdays: Vec<NaiveDate>,
}

/// Holiday and weekend-override workday sets, keyed by year in the source resource.
#[derive(Debug, Clone, Default)]
pub struct TradingDayTable {
    holidays: HashSet<NaiveDate>,
    workdays: HashSet<NaiveDate>,
    years: Vec<i32>,
}

impl TradingDayTable {
    pub fn from_json_str(s: &str) -> anyhow::Result<Self> {
        let raw: BTreeMap<String, YearEntry> =
            serde_json::from_str(s).context("trading calendar is not valid JSON")?;

        let mut out = Self::default();
        for (year_key, entry) in raw {
            let year: i32 = year_key
                .trim()
                .parse()
                .with_context(|| format!("invalid year key in trading calendar: {year_key:?}"))?;

            for d in entry.holidays.iter().chain(entry.workdays.iter()) {
                anyhow::ensure!(
                    d.year() == year,
                    "trading calendar date {d} is filed under year {year}"
                );
            }
            for d in &entry.workdays {
                anyhow::ensure!(
                    is_weekend(*d),
                    "trading calendar workday override {d} is not a weekend day"
                );
            }

            out.holidays.extend(entry.holidays);
            out.workdays.extend(entry.workdays);
            out.years.push(year);
        }

        Ok(out)
    }

    pub fn from_path(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read trading calendar {}", path.display()))?;
        Self::from_json_str(&text)
            .with_context(|| format!("failed to load trading calendar {}", path.display()))
    }

    pub fn covers_year(&self, year: i32) -> bool {
        self.years.contains(&year)
    }

    pub fn years(&self) -> &[i32] {
        &self.years
    }
}

#[derive(Debug, Clone)]
pub struct TradingCalendar {
    table: TradingDayTable,
}

impl TradingCalendar {
    pub fn new(table: TradingDayTable) -> Self {
        Self { table }
    }

    pub fn is_trading_day(&self, date: NaiveDate) -> bool {
        if self.table.holidays.contains(&date) {
            return false;
        }
        self.table.workdays.contains(&date) || !is_weekend(date)
    }

    pub fn previous_trading_day(
        &self,
        date: NaiveDate,
    ) -> Result<NaiveDate, CalendarBoundsExceeded> {
        let mut cur = date;
        for _ in 0..MAX_BACKWARD_SEARCH_DAYS {
            cur = cur - Duration::days(1);
            if self.is_trading_day(cur) {
                return Ok(cur);
            }
        }
        Err(CalendarBoundsExceeded { from: date })
    }

    pub fn latest_trading_day(
        &self,
        today: NaiveDate,
    ) -> Result<NaiveDate, CalendarBoundsExceeded> {
        if self.is_trading_day(today) {
            return Ok(today);
        }
        self.previous_trading_day(today)
    }

    pub fn warn_if_uncovered(&self, year: i32) {
        if !self.table.covers_year(year) {
            tracing::warn!(
                year,
                loaded_years = ?self.table.years(),
                "trading calendar has no table for this year; holidays will be treated as trading days"
            );
        }
    }
}

pub fn exchange_today(now_utc: DateTime<Utc>) -> NaiveDate {
    match chrono::FixedOffset::east_opt(CST_OFFSET_SECS) {
        Some(cst) => now_utc.with_timezone(&cst).date_naive(),
        None => now_utc.date_naive(),
    }
}

/// `YYYYMMDD`, the date key the pool feeds and storage use.
pub fn trade_date_key(date: NaiveDate) -> String {
    date.format("%Y%m%d").to_string()
}

pub fn parse_trade_date_key(key: &str) -> anyhow::Result<NaiveDate> {
    NaiveDate::parse_from_str(key.trim(), "%Y%m%d")
        .with_context(|| format!("invalid trade date key {key:?} (expected YYYYMMDD)"))
}

fn is_weekend(date: NaiveDate) -> bool {
    matches!(date.weekday(), chrono::Weekday::Sat | chrono::Weekday::Sun)
}
