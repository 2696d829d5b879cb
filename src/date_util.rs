use chrono::{Datelike, Duration, NaiveDate};

/// Get the last day of a given month.
pub fn last_day_of_month(year: i32, month: u32) -> NaiveDate {
    if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1).unwrap() - Duration::days(1)
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1).unwrap() - Duration::days(1)
    }
}

/// First day of the month `delta` months away from the month containing `d`.
/// Negative deltas move backwards. `None` when the result is outside the
/// representable date range.
pub fn shift_months(d: NaiveDate, delta: i32) -> Option<NaiveDate> {
    let index = d
        .year()
        .checked_mul(12)?
        .checked_add(d.month0() as i32)?
        .checked_add(delta)?;
    let year = index.div_euclid(12);
    let month = index.rem_euclid(12) as u32 + 1;
    NaiveDate::from_ymd_opt(year, month, 1)
}

/// Get the quarter (1-4) for a given date.
pub fn quarter_of(d: NaiveDate) -> u8 {
    ((d.month() - 1) / 3 + 1) as u8
}

/// Three-letter month name used for chart labels.
pub fn month_abbrev(m: u32) -> &'static str {
    match m {
        1 => "Jan",
        2 => "Feb",
        3 => "Mar",
        4 => "Apr",
        5 => "May",
        6 => "Jun",
        7 => "Jul",
        8 => "Aug",
        9 => "Sep",
        10 => "Oct",
        11 => "Nov",
        12 => "Dec",
        _ => "???",
    }
}

/// `YYYY-MM-DD` key matching the `created_date_key` column.
pub fn date_key(d: NaiveDate) -> String {
    d.format("%Y-%m-%d").to_string()
}
