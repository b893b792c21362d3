//! Timestamp parsing and calendar bucketing
//!
//! All export timestamps are stored as naive UTC. Offsets present in the
//! source are applied before the offset is dropped, so month and week
//! boundaries never depend on the machine's local timezone.

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime};

const NAIVE_DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%Y", "%d %b %Y", "%b %d, %Y"];

/// Parse an export timestamp into naive UTC.
///
/// Returns `None` for empty cells and anything that matches no known format.
///
/// # Examples
/// ```
/// use ssa_common::time::parse_timestamp;
///
/// let a = parse_timestamp("2024-03-01T10:00:00+02:00").unwrap();
/// let b = parse_timestamp("2024-03-01 08:00:00").unwrap();
/// assert_eq!(a, b);
/// assert!(parse_timestamp("").is_none());
/// ```
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let value = raw.trim();
    if value.is_empty() || value.eq_ignore_ascii_case("nan") || value.eq_ignore_ascii_case("null")
    {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.naive_utc());
    }
    // "2024-03-01 10:00:00+00:00" and "... +0000" variants
    for fmt in ["%Y-%m-%d %H:%M:%S%.f%:z", "%Y-%m-%d %H:%M:%S%.f%z"] {
        if let Ok(dt) = DateTime::parse_from_str(value, fmt) {
            return Some(dt.naive_utc());
        }
    }
    // Trailing "Z" or " UTC" without a parseable offset
    let stripped = value
        .strip_suffix('Z')
        .or_else(|| value.strip_suffix(" UTC"))
        .unwrap_or(value);

    for fmt in NAIVE_DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(stripped, fmt) {
            return Some(dt);
        }
    }
    for fmt in DATE_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(stripped, fmt) {
            return Some(d.and_time(NaiveTime::MIN));
        }
    }
    None
}

/// First instant of the calendar month containing `ts`
pub fn month_start(ts: NaiveDateTime) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(ts.year(), ts.month(), 1)
        .unwrap_or(ts.date())
        .and_time(NaiveTime::MIN)
}

/// First instant of the following calendar month
pub fn next_month_start(ts: NaiveDateTime) -> NaiveDateTime {
    let (year, month) = if ts.month() == 12 {
        (ts.year() + 1, 1)
    } else {
        (ts.year(), ts.month() + 1)
    };
    NaiveDate::from_ymd_opt(year, month, 1)
        .unwrap_or(ts.date())
        .and_time(NaiveTime::MIN)
}

/// Monday 00:00 of the ISO week containing `ts`
pub fn week_start(ts: NaiveDateTime) -> NaiveDateTime {
    let offset = ts.weekday().num_days_from_monday() as i64;
    (ts.date() - Duration::days(offset)).and_time(NaiveTime::MIN)
}

/// Midnight opening `date`
pub fn day_start(date: NaiveDate) -> NaiveDateTime {
    date.and_time(NaiveTime::MIN)
}

/// Midnight closing `date` (exclusive end of that day)
pub fn day_end(date: NaiveDate) -> NaiveDateTime {
    (date + Duration::days(1)).and_time(NaiveTime::MIN)
}

/// `YYYY-MM` label used for monthly cohorts
pub fn month_label(ts: NaiveDateTime) -> String {
    format!("{:04}-{:02}", ts.year(), ts.month())
}

/// Whole days elapsed from `earlier` to `later` (negative if reversed)
pub fn days_between(earlier: NaiveDateTime, later: NaiveDateTime) -> i64 {
    (later - earlier).num_days()
}
