use crate::metrics::types::GrowthMetric;

/// Percentage change from `previous` to `current`.
///
/// A previous value of zero (or below) has no meaningful baseline, so the
/// change is reported as 0 rather than infinite.
pub fn compute(current: f64, previous: f64) -> GrowthMetric {
    let percent_change = if previous > 0.0 {
        (current - previous) / previous * 100.0
    } else {
        0.0
    };
    GrowthMetric {
        current_value: current,
        previous_value: previous,
        percent_change,
    }
}
