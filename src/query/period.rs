use std::sync::LazyLock;

use chrono::{Datelike, Days, NaiveDate};
use regex::Regex;

use crate::date_util::{last_day_of_month, quarter_of};
use crate::error::{Error, Result};
use crate::query::metric::DateRange;

static RE_QUARTER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(\d{4})-Q([1-4])$").unwrap());
static RE_MONTH: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(\d{4})-(\d{2})$").unwrap());

/// A reporting period used for period-over-period growth.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Period {
    Year(i32),
    Quarter(i32, u8),
    Month(i32, u8),
    /// The last N days ending on (and including) the given date.
    Rolling(u32, NaiveDate),
}

impl Period {
    /// Parse a period string relative to `today`.
    ///
    /// Supported formats:
    /// - `2025`: year
    /// - `2025-Q1`: quarter
    /// - `2025-01`: month
    /// - `30d`: rolling last N days
    /// - `mtd` / `qtd` / `ytd`: the month, quarter or year containing `today`
    pub fn parse(s: &str, today: NaiveDate) -> Result<Self> {
        let s = s.trim();

        match s.to_lowercase().as_str() {
            "mtd" => return Ok(Period::Month(today.year(), today.month() as u8)),
            "qtd" => return Ok(Period::Quarter(today.year(), quarter_of(today))),
            "ytd" => return Ok(Period::Year(today.year())),
            _ => {}
        }

        if let Some(days) = s.strip_suffix(['d', 'D']) {
            if let Ok(n) = days.parse::<u32>() {
                if n == 0 {
                    return Err(Error::PeriodParse(format!("rolling period must be at least 1 day: {s}")));
                }
                // The window and the one before it must both be representable.
                if today.checked_sub_days(Days::new(2 * u64::from(n))).is_none() {
                    return Err(Error::PeriodParse(format!("rolling period reaches past the earliest date: {s}")));
                }
                return Ok(Period::Rolling(n, today));
            }
        }

        if s.len() == 4 {
            if let Ok(year) = s.parse::<i32>() {
                return Ok(Period::Year(year));
            }
        }

        if let Some(caps) = RE_QUARTER.captures(s) {
            let year: i32 = caps[1].parse().unwrap();
            let q: u8 = caps[2].parse().unwrap();
            return Ok(Period::Quarter(year, q));
        }

        if let Some(caps) = RE_MONTH.captures(s) {
            let year: i32 = caps[1].parse().unwrap();
            let month: u8 = caps[2].parse().unwrap();
            if (1..=12).contains(&month) {
                return Ok(Period::Month(year, month));
            }
        }

        Err(Error::PeriodParse(format!("unrecognized period: {s}")))
    }

    /// Convert to a canonical key string.
    pub fn to_key(&self) -> String {
        match self {
            Period::Year(y) => format!("{y}"),
            Period::Quarter(y, q) => format!("{y}-Q{q}"),
            Period::Month(y, m) => format!("{y}-{m:02}"),
            Period::Rolling(n, _) => format!("{n}d"),
        }
    }

    /// Inclusive first and last day of the period.
    pub fn date_range(&self) -> (NaiveDate, NaiveDate) {
        match self {
            Period::Year(y) => (
                NaiveDate::from_ymd_opt(*y, 1, 1).unwrap(),
                NaiveDate::from_ymd_opt(*y, 12, 31).unwrap(),
            ),
            Period::Quarter(y, q) => {
                let start_month = (*q as u32 - 1) * 3 + 1;
                (
                    NaiveDate::from_ymd_opt(*y, start_month, 1).unwrap(),
                    last_day_of_month(*y, *q as u32 * 3),
                )
            }
            Period::Month(y, m) => (
                NaiveDate::from_ymd_opt(*y, *m as u32, 1).unwrap(),
                last_day_of_month(*y, *m as u32),
            ),
            Period::Rolling(n, as_of) => (days_before(*as_of, u64::from(n.saturating_sub(1))), *as_of),
        }
    }

    /// Half-open window suitable for a `MetricQuery`.
    pub fn window(&self) -> DateRange {
        let (start, end) = self.date_range();
        DateRange::new(start, end.succ_opt().unwrap_or(NaiveDate::MAX))
    }

    /// The immediately preceding period of the same kind.
    pub fn previous(&self) -> Self {
        match self {
            Period::Year(y) => Period::Year(y - 1),
            Period::Quarter(y, q) => {
                if *q == 1 {
                    Period::Quarter(y - 1, 4)
                } else {
                    Period::Quarter(*y, q - 1)
                }
            }
            Period::Month(y, m) => {
                if *m == 1 {
                    Period::Month(y - 1, 12)
                } else {
                    Period::Month(*y, m - 1)
                }
            }
            Period::Rolling(n, as_of) => Period::Rolling(*n, days_before(*as_of, u64::from(*n))),
        }
    }
}

/// `d` minus `days`, clamped to the earliest representable date.
fn days_before(d: NaiveDate, days: u64) -> NaiveDate {
    d.checked_sub_days(Days::new(days)).unwrap_or(NaiveDate::MIN)
}

impl std::fmt::Display for Period {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_key())
    }
}
