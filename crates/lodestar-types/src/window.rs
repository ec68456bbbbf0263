//! Execution windows: the data interval a scheduled run operates on.

use chrono::{DateTime, Datelike, Duration, DurationRound, Timelike, Utc};
use serde::{Deserialize, Serialize};

/// Boundary the scheduled time is floored to before applying the offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TruncateTo {
    Hour,
    Day,
    Week,
    Month,
}

impl TruncateTo {
    /// Parse the single-letter form used in specs (`h`, `d`, `w`, `M`).
    ///
    /// # Errors
    ///
    /// Returns a description of the accepted forms for anything else.
    pub fn parse(s: &str) -> Result<Self, String> {
        match s.trim() {
            "h" => Ok(Self::Hour),
            "d" => Ok(Self::Day),
            "w" => Ok(Self::Week),
            "M" => Ok(Self::Month),
            other => Err(format!(
                "unknown truncate unit {other:?}, expected one of h, d, w, M"
            )),
        }
    }

    fn apply(self, at: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            Self::Hour => at
                .duration_trunc(Duration::hours(1))
                .unwrap_or(at),
            Self::Day => at
                .duration_trunc(Duration::days(1))
                .unwrap_or(at),
            Self::Week => {
                let day = at.duration_trunc(Duration::days(1)).unwrap_or(at);
                let since_monday = i64::from(day.weekday().num_days_from_monday());
                day - Duration::days(since_monday)
            }
            Self::Month => at
                .with_day(1)
                .and_then(|d| d.with_hour(0))
                .and_then(|d| d.with_minute(0))
                .and_then(|d| d.with_second(0))
                .and_then(|d| d.with_nanosecond(0))
                .unwrap_or(at),
        }
    }
}

/// Parse a signed duration string like `"24h"`, `"30m"`, `"2d"`, `"1w"`.
///
/// `"0"` is accepted as a zero duration.
///
/// # Errors
///
/// Returns a description of the expected format on malformed input.
pub fn parse_window_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    if s == "0" {
        return Ok(Duration::zero());
    }
    let (negative, body) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s),
    };
    if body.is_empty() || !body.is_ascii() {
        return Err(format!(
            "invalid duration {s:?}, expected forms like 24h, 30m, 2d, 1w"
        ));
    }
    let (digits, unit) = body.split_at(body.len() - 1);
    let value: i64 = digits
        .parse()
        .map_err(|_| format!("invalid duration {s:?}, expected forms like 24h, 30m, 2d, 1w"))?;
    let duration = match unit {
        "m" => Duration::minutes(value),
        "h" => Duration::hours(value),
        "d" => Duration::days(value),
        "w" => Duration::weeks(value),
        _ => {
            return Err(format!(
                "invalid duration unit in {s:?}, expected one of m, h, d, w"
            ))
        }
    };
    Ok(if negative { -duration } else { duration })
}

/// Window configuration carried on a task, in its textual spec form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskWindow {
    pub size: String,
    pub offset: String,
    pub truncate_to: String,
}

impl Default for TaskWindow {
    fn default() -> Self {
        Self {
            size: "24h".to_string(),
            offset: "0".to_string(),
            truncate_to: "d".to_string(),
        }
    }
}

impl TaskWindow {
    /// Parse the textual fields into a computable [`Window`].
    ///
    /// # Errors
    ///
    /// Returns a description of the malformed field.
    pub fn prepare(&self) -> Result<Window, String> {
        Ok(Window {
            size: parse_window_duration(&self.size)?,
            offset: parse_window_duration(&self.offset)?,
            truncate_to: TruncateTo::parse(&self.truncate_to)?,
        })
    }
}

/// Fully-parsed window over which a scheduled run reads data.
///
/// The window end is the scheduled time floored to `truncate_to` plus
/// `offset`; the start precedes the end by `size`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub size: Duration,
    pub offset: Duration,
    pub truncate_to: TruncateTo,
}

impl Window {
    /// Inclusive start of the window for a run scheduled at `scheduled_at`.
    #[must_use]
    pub fn start(&self, scheduled_at: DateTime<Utc>) -> DateTime<Utc> {
        self.end(scheduled_at) - self.size
    }

    /// Exclusive end of the window for a run scheduled at `scheduled_at`.
    #[must_use]
    pub fn end(&self, scheduled_at: DateTime<Utc>) -> DateTime<Utc> {
        self.truncate_to.apply(scheduled_at) + self.offset
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    #[test]
    fn parses_plain_durations() {
        assert_eq!(parse_window_duration("24h").unwrap(), Duration::hours(24));
        assert_eq!(parse_window_duration("30m").unwrap(), Duration::minutes(30));
        assert_eq!(parse_window_duration("2d").unwrap(), Duration::days(2));
        assert_eq!(parse_window_duration("1w").unwrap(), Duration::weeks(1));
        assert_eq!(parse_window_duration("0").unwrap(), Duration::zero());
        assert_eq!(parse_window_duration("-1h").unwrap(), Duration::hours(-1));
    }

    #[test]
    fn rejects_malformed_durations() {
        assert!(parse_window_duration("h").is_err());
        assert!(parse_window_duration("12x").is_err());
        assert!(parse_window_duration("").is_err());
    }

    #[test]
    fn daily_window_covers_previous_day() {
        let window = TaskWindow::default().prepare().unwrap();
        let scheduled = at(2021, 2, 25, 6, 30);
        assert_eq!(window.end(scheduled), at(2021, 2, 25, 0, 0));
        assert_eq!(window.start(scheduled), at(2021, 2, 24, 0, 0));
    }

    #[test]
    fn hourly_truncation() {
        let window = TaskWindow {
            size: "1h".into(),
            offset: "0".into(),
            truncate_to: "h".into(),
        }
        .prepare()
        .unwrap();
        let scheduled = at(2021, 2, 25, 6, 45);
        assert_eq!(window.end(scheduled), at(2021, 2, 25, 6, 0));
        assert_eq!(window.start(scheduled), at(2021, 2, 25, 5, 0));
    }

    #[test]
    fn week_truncates_to_monday() {
        let window = TaskWindow {
            size: "1w".into(),
            offset: "0".into(),
            truncate_to: "w".into(),
        }
        .prepare()
        .unwrap();
        // 2021-02-25 is a Thursday; the week starts Monday 2021-02-22.
        assert_eq!(window.end(at(2021, 2, 25, 6, 0)), at(2021, 2, 22, 0, 0));
    }

    #[test]
    fn month_truncates_to_first() {
        let window = TaskWindow {
            size: "24h".into(),
            offset: "0".into(),
            truncate_to: "M".into(),
        }
        .prepare()
        .unwrap();
        assert_eq!(window.end(at(2021, 2, 25, 6, 0)), at(2021, 2, 1, 0, 0));
    }

    #[test]
    fn offset_shifts_the_window() {
        let window = TaskWindow {
            size: "24h".into(),
            offset: "6h".into(),
            truncate_to: "d".into(),
        }
        .prepare()
        .unwrap();
        let scheduled = at(2021, 2, 25, 12, 0);
        assert_eq!(window.end(scheduled), at(2021, 2, 25, 6, 0));
        assert_eq!(window.start(scheduled), at(2021, 2, 24, 6, 0));
    }

    #[test]
    fn unknown_truncate_unit_errors() {
        let err = TruncateTo::parse("y").unwrap_err();
        assert!(err.contains("truncate unit"));
    }
}
