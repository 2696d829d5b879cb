use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Scalar outcome of one metric query.
///
/// `empty` records that no row matched, which is not the same thing as a
/// matched set whose reduction happens to be zero.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct MetricResult {
    pub value: f64,
    pub empty: bool,
}

impl MetricResult {
    pub fn empty() -> Self {
        Self {
            value: 0.0,
            empty: true,
        }
    }

    pub fn of(value: f64) -> Self {
        Self {
            value,
            empty: false,
        }
    }

    /// The value as a whole-number count.
    pub fn count(&self) -> u64 {
        self.value.max(0.0).round() as u64
    }
}

/// One row of a ranked list.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RankingEntry {
    pub subject_id: String,
    pub display_name: String,
    pub primary_metric: f64,
    pub secondary_metrics: BTreeMap<String, f64>,
}

impl RankingEntry {
    pub fn new(subject_id: &str, display_name: &str, primary_metric: f64) -> Self {
        Self {
            subject_id: subject_id.to_string(),
            display_name: display_name.to_string(),
            primary_metric,
            secondary_metrics: BTreeMap::new(),
        }
    }

    pub fn with_secondary(mut self, name: &str, value: f64) -> Self {
        self.secondary_metrics.insert(name.to_string(), value);
        self
    }
}

/// Chronologically ascending per-period values. `labels` and `values`
/// always have the same length.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct TrendSeries {
    pub labels: Vec<String>,
    pub values: Vec<f64>,
}

impl TrendSeries {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GrowthMetric {
    pub current_value: f64,
    pub previous_value: f64,
    pub percent_change: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationType {
    Collaboration,
    Payment,
    User,
    Info,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    Medium,
    Low,
}

/// Dashboard notification, rebuilt on every request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: NotificationType,
    pub title: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub read: bool,
    pub priority: Priority,
}
