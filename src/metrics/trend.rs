use chrono::{Datelike, NaiveDate};
use serde::Serialize;

use crate::date_util::{month_abbrev, shift_months};
use crate::error::{Error, Result};
use crate::metrics::source::MetricSource;
use crate::metrics::types::TrendSeries;
use crate::query::metric::{DateRange, MetricQuery};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PeriodUnit {
    Month,
}

/// One slot of a trend series.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bucket {
    pub label: String,
    pub range: DateRange,
}

/// Longest series a caller may ask for.
pub const MAX_PERIODS: i64 = 120;

/// The `period_count` consecutive periods ending with the one containing
/// `anchor`, oldest first.
pub fn buckets(period_count: i64, unit: PeriodUnit, anchor: NaiveDate) -> Result<Vec<Bucket>> {
    if !(1..=MAX_PERIODS).contains(&period_count) {
        return Err(Error::InvalidArgument(format!(
            "period count must be between 1 and {MAX_PERIODS}, got {period_count}"
        )));
    }
    let n = period_count as i32;

    match unit {
        PeriodUnit::Month => (0..n)
            .rev()
            .map(|i| {
                let (start, end) = shift_months(anchor, -i)
                    .zip(shift_months(anchor, -i + 1))
                    .ok_or_else(|| {
                        Error::InvalidArgument(format!("{period_count} months before {anchor} is out of range"))
                    })?;
                Ok(Bucket {
                    label: month_abbrev(start.month()).to_string(),
                    range: DateRange::new(start, end),
                })
            })
            .collect(),
    }
}

/// Evaluate `query` once per bucket, restricting it to that bucket's window.
pub async fn bucketize(
    source: &dyn MetricSource,
    query: &MetricQuery,
    period_count: i64,
    unit: PeriodUnit,
    anchor: NaiveDate,
) -> Result<TrendSeries> {
    let slots = buckets(period_count, unit, anchor)?;
    let mut series = TrendSeries {
        labels: Vec::with_capacity(slots.len()),
        values: Vec::with_capacity(slots.len()),
    };
    for slot in slots {
        let result = source.evaluate(&query.clone().within(slot.range)).await?;
        series.labels.push(slot.label);
        series.values.push(result.value);
    }
    Ok(series)
}

/// A series with the right labels and every value zero.
pub fn zeroed(period_count: i64, unit: PeriodUnit, anchor: NaiveDate) -> TrendSeries {
    match buckets(period_count, unit, anchor) {
        Ok(slots) => TrendSeries {
            values: vec![0.0; slots.len()],
            labels: slots.into_iter().map(|b| b.label).collect(),
        },
        Err(_) => TrendSeries::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::types::MetricResult;
    use crate::query::metric::Collection;
    use async_trait::async_trait;
    use std::sync::Mutex;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    /// Returns the month number of the window start and records each window.
    #[derive(Default)]
    struct MonthEcho {
        seen: Mutex<Vec<DateRange>>,
    }

    #[async_trait]
    impl MetricSource for MonthEcho {
        async fn evaluate(&self, query: &MetricQuery) -> Result<MetricResult> {
            let range = query.range.expect("bucketize always sets a range");
            self.seen.lock().unwrap().push(range);
            Ok(MetricResult::of(range.start.month() as f64))
        }
    }

    struct Unavailable;

    #[async_trait]
    impl MetricSource for Unavailable {
        async fn evaluate(&self, _query: &MetricQuery) -> Result<MetricResult> {
            Err(Error::SourceUnavailable("down".into()))
        }
    }

    #[tokio::test]
    async fn test_six_months_chronological() {
        let source = MonthEcho::default();
        let q = MetricQuery::sum(Collection::Payments, "amount");
        let series = bucketize(&source, &q, 6, PeriodUnit::Month, ymd(2025, 3, 17))
            .await
            .unwrap();

        assert_eq!(series.labels.len(), 6);
        assert_eq!(series.values.len(), 6);
        assert_eq!(series.labels, vec!["Oct", "Nov", "Dec", "Jan", "Feb", "Mar"]);
        assert_eq!(series.values, vec![10.0, 11.0, 12.0, 1.0, 2.0, 3.0]);

        let seen = source.seen.lock().unwrap();
        for pair in seen.windows(2) {
            assert!(pair[0].start < pair[1].start);
            assert_eq!(pair[0].end, pair[1].start);
        }
        assert_eq!(seen[0].start, ymd(2024, 10, 1));
        assert_eq!(seen[5].end, ymd(2025, 4, 1));
    }

    #[tokio::test]
    async fn test_query_filters_are_kept() {
        struct StatusCheck;

        #[async_trait]
        impl MetricSource for StatusCheck {
            async fn evaluate(&self, query: &MetricQuery) -> Result<MetricResult> {
                assert_eq!(query.filters.len(), 1);
                assert_eq!(query.filters[0].field, "status");
                Ok(MetricResult::of(1.0))
            }
        }

        let q = MetricQuery::count(Collection::Payments).status("completed");
        let series = bucketize(&StatusCheck, &q, 3, PeriodUnit::Month, ymd(2025, 1, 1))
            .await
            .unwrap();
        assert_eq!(series.values, vec![1.0, 1.0, 1.0]);
    }

    #[tokio::test]
    async fn test_rejects_out_of_range_count() {
        let q = MetricQuery::count(Collection::Brands);
        for n in [0, -3, MAX_PERIODS + 1, 4_000_000] {
            let err = bucketize(&MonthEcho::default(), &q, n, PeriodUnit::Month, ymd(2025, 1, 1))
                .await
                .unwrap_err();
            assert!(matches!(err, Error::InvalidArgument(_)));
        }
    }

    #[tokio::test]
    async fn test_source_failure_propagates() {
        let q = MetricQuery::count(Collection::Brands);
        let err = bucketize(&Unavailable, &q, 2, PeriodUnit::Month, ymd(2025, 1, 1))
            .await
            .unwrap_err();
        assert!(err.is_unavailable());
    }

    #[test]
    fn test_single_bucket_is_anchor_month() {
        let b = buckets(1, PeriodUnit::Month, ymd(2024, 2, 29)).unwrap();
        assert_eq!(b.len(), 1);
        assert_eq!(b[0].label, "Feb");
        assert_eq!(b[0].range, DateRange::new(ymd(2024, 2, 1), ymd(2024, 3, 1)));
    }

    #[test]
    fn test_zeroed_has_labels() {
        let s = zeroed(6, PeriodUnit::Month, ymd(2025, 6, 30));
        assert_eq!(s.labels, vec!["Jan", "Feb", "Mar", "Apr", "May", "Jun"]);
        assert_eq!(s.values, vec![0.0; 6]);
        assert!(zeroed(0, PeriodUnit::Month, ymd(2025, 6, 30)).is_empty());
        assert!(zeroed(4_000_000, PeriodUnit::Month, ymd(2025, 6, 30)).is_empty());
    }

    #[test]
    fn test_buckets_before_earliest_date_fail() {
        let err = buckets(3, PeriodUnit::Month, NaiveDate::MIN).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }
}
