use std::time::Duration;

use serde::Serialize;

use crate::error::{Error, Result};
use crate::metrics::trend::MAX_PERIODS;
use crate::storage::repository;
use crate::storage::Database;

pub const KEY_BRANCH_TIMEOUT_MS: &str = "report.branch_timeout_ms";
pub const KEY_REPORT_TIMEOUT_MS: &str = "report.timeout_ms";
pub const KEY_RANKING_LIMIT: &str = "report.ranking_limit";
pub const KEY_TREND_MONTHS: &str = "report.trend_months";
pub const KEY_NEW_USER_DAYS: &str = "report.new_user_days";

/// Upper bound for either timeout.
const MAX_TIMEOUT_MS: u64 = 10 * 60 * 1000;
const MAX_RANKING_LIMIT: i64 = 1000;
const MAX_NEW_USER_DAYS: i64 = 3650;

/// Tunables for report assembly.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportOptions {
    /// Time allowed for each section before it is defaulted.
    pub branch_timeout: Duration,
    /// Time allowed for the whole report; sections still running are defaulted.
    pub report_timeout: Duration,
    pub ranking_limit: i64,
    pub trend_months: i64,
    /// How far back a signup still counts as a "new user" notification.
    pub new_user_days: i64,
}

impl Default for ReportOptions {
    fn default() -> Self {
        Self {
            branch_timeout: Duration::from_secs(5),
            report_timeout: Duration::from_secs(15),
            ranking_limit: 5,
            trend_months: 6,
            new_user_days: 7,
        }
    }
}

impl ReportOptions {
    /// Defaults overlaid with the `report.*` keys stored in `app_config`.
    /// A stored value that is unparsable or out of range is skipped with a
    /// warning and its default kept.
    pub async fn load(db: &Database) -> Result<Self> {
        let rows = db
            .read(|conn| repository::list_config(conn))
            .await
            .map_err(|e| Error::Database(e.to_string()))?;
        let mut opts = Self::default();
        for (key, value) in &rows {
            if let Err(e) = opts.apply(key, value) {
                log::warn!("ignoring stored option: {e}");
            }
        }
        Ok(opts)
    }

    /// Defaults overlaid with `pairs`; the first bad value is an error.
    pub fn from_pairs(pairs: &[(String, String)]) -> Result<Self> {
        let mut opts = Self::default();
        for (key, value) in pairs {
            opts.apply(key, value)?;
        }
        Ok(opts)
    }

    fn apply(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            KEY_BRANCH_TIMEOUT_MS => {
                self.branch_timeout = Duration::from_millis(bounded(key, value, 1, MAX_TIMEOUT_MS)?)
            }
            KEY_REPORT_TIMEOUT_MS => {
                self.report_timeout = Duration::from_millis(bounded(key, value, 1, MAX_TIMEOUT_MS)?)
            }
            KEY_RANKING_LIMIT => self.ranking_limit = bounded(key, value, 0, MAX_RANKING_LIMIT)?,
            KEY_TREND_MONTHS => self.trend_months = bounded(key, value, 1, MAX_PERIODS)?,
            KEY_NEW_USER_DAYS => self.new_user_days = bounded(key, value, 0, MAX_NEW_USER_DAYS)?,
            _ => {}
        }
        Ok(())
    }
}

/// Parse `value` and require `min..=max`.
fn bounded<T>(key: &str, value: &str, min: T, max: T) -> Result<T>
where
    T: std::str::FromStr + PartialOrd + std::fmt::Display,
{
    let v: T = value
        .trim()
        .parse()
        .map_err(|_| Error::Config(format!("invalid value for {key}: {value:?}")))?;
    if v < min || v > max {
        return Err(Error::Config(format!(
            "{key} must be between {min} and {max}, got {v}"
        )));
    }
    Ok(v)
}
