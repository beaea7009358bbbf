//! Review cadence rules.
//!
//! A cadence determines when a memory is "due for review". The rule is a
//! pure function of the current time and the memory's last-accessed
//! timestamp: a memory is due when the current period (day, week, month)
//! holds no recorded access.

use crate::error::{EngramError, Result};
use crate::types::Timestamp;
use chrono::{DateTime, Datelike, Duration, NaiveTime, Utc, Weekday};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Recurrence rule for scheduled review.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Cadence {
    /// Due once per calendar day
    Daily,
    /// Due once per ISO week (Monday start)
    Weekly,
    /// Due once per calendar month
    Monthly,
    /// Due on the given weekday, once per day
    DayOfWeek(Weekday),
    /// Due on the given day of the month (1..=31), once per day.
    /// Months shorter than the value fire on their last day.
    DayOfMonth(u8),
}

impl Cadence {
    /// Parse from the wire pair `(kind, value)`.
    ///
    /// `value` is required for `day_of_week` (weekday name) and
    /// `day_of_month` (1..=31), and must be absent otherwise.
    pub fn parse(kind: &str, value: Option<&str>) -> Result<Self> {
        match (kind, value) {
            ("daily", None) => Ok(Cadence::Daily),
            ("weekly", None) => Ok(Cadence::Weekly),
            ("monthly", None) => Ok(Cadence::Monthly),
            ("day_of_week", Some(day)) => {
                let weekday = day.parse::<Weekday>().map_err(|_| {
                    EngramError::invalid_arg(format!("unknown weekday: {:?}", day))
                })?;
                Ok(Cadence::DayOfWeek(weekday))
            }
            ("day_of_month", Some(day)) => {
                let n: u8 = day.parse().map_err(|_| {
                    EngramError::invalid_arg(format!("day of month must be a number, got {:?}", day))
                })?;
                if (1..=31).contains(&n) {
                    Ok(Cadence::DayOfMonth(n))
                } else {
                    Err(EngramError::invalid_arg(format!(
                        "day of month must be 1..=31, got {}",
                        n
                    )))
                }
            }
            ("day_of_week", None) | ("day_of_month", None) => Err(EngramError::invalid_arg(
                format!("cadence kind {:?} requires a value", kind),
            )),
            ("daily" | "weekly" | "monthly", Some(_)) => Err(EngramError::invalid_arg(format!(
                "cadence kind {:?} takes no value",
                kind
            ))),
            (other, _) => Err(EngramError::invalid_arg(format!(
                "unknown cadence kind: {:?}",
                other
            ))),
        }
    }

    /// Wire name of the kind.
    pub fn kind_str(&self) -> &'static str {
        match self {
            Cadence::Daily => "daily",
            Cadence::Weekly => "weekly",
            Cadence::Monthly => "monthly",
            Cadence::DayOfWeek(_) => "day_of_week",
            Cadence::DayOfMonth(_) => "day_of_month",
        }
    }

    /// Wire value, when the kind carries one.
    pub fn value_str(&self) -> Option<String> {
        match self {
            Cadence::DayOfWeek(day) => Some(day.to_string().to_lowercase()),
            Cadence::DayOfMonth(n) => Some(n.to_string()),
            _ => None,
        }
    }

    /// Stable numeric tag for canonical encoding.
    pub fn as_tag(&self) -> (u8, u8) {
        match self {
            Cadence::Daily => (0, 0),
            Cadence::Weekly => (1, 0),
            Cadence::Monthly => (2, 0),
            Cadence::DayOfWeek(day) => (3, day.num_days_from_monday() as u8),
            Cadence::DayOfMonth(n) => (4, *n),
        }
    }

    /// Inverse of [`as_tag`](Self::as_tag).
    pub fn from_tag(kind: u8, value: u8) -> Result<Self> {
        match kind {
            0 => Ok(Cadence::Daily),
            1 => Ok(Cadence::Weekly),
            2 => Ok(Cadence::Monthly),
            3 => {
                let day = weekday_from_monday_offset(value).ok_or_else(|| {
                    EngramError::serialization(format!("bad weekday offset: {}", value))
                })?;
                Ok(Cadence::DayOfWeek(day))
            }
            4 => {
                if (1..=31).contains(&value) {
                    Ok(Cadence::DayOfMonth(value))
                } else {
                    Err(EngramError::serialization(format!(
                        "bad day of month: {}",
                        value
                    )))
                }
            }
            other => Err(EngramError::serialization(format!(
                "unknown cadence tag: {}",
                other
            ))),
        }
    }

    /// Whether a memory with this cadence is due for review at `now`,
    /// given its last recorded access (if any).
    ///
    /// A memory with no recorded access is due whenever the calendar
    /// condition holds.
    pub fn is_due(&self, now: Timestamp, last_accessed: Option<Timestamp>) -> bool {
        let now_dt = now.to_datetime();
        match self {
            Cadence::Daily => not_accessed_since(last_accessed, start_of_day(now_dt)),
            Cadence::Weekly => not_accessed_since(last_accessed, start_of_week(now_dt)),
            Cadence::Monthly => not_accessed_since(last_accessed, start_of_month(now_dt)),
            Cadence::DayOfWeek(day) => {
                now_dt.weekday() == *day
                    && not_accessed_since(last_accessed, start_of_day(now_dt))
            }
            Cadence::DayOfMonth(n) => {
                let today = now_dt.day();
                let last_day = days_in_month(now_dt.year(), now_dt.month());
                let target = (*n as u32).min(last_day);
                today == target && not_accessed_since(last_accessed, start_of_day(now_dt))
            }
        }
    }
}

impl fmt::Display for Cadence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.value_str() {
            Some(v) => write!(f, "{}:{}", self.kind_str(), v),
            None => f.write_str(self.kind_str()),
        }
    }
}

fn weekday_from_monday_offset(offset: u8) -> Option<Weekday> {
    [
        Weekday::Mon,
        Weekday::Tue,
        Weekday::Wed,
        Weekday::Thu,
        Weekday::Fri,
        Weekday::Sat,
        Weekday::Sun,
    ]
    .get(offset as usize)
    .copied()
}

fn not_accessed_since(last_accessed: Option<Timestamp>, period_start: DateTime<Utc>) -> bool {
    match last_accessed {
        None => true,
        Some(last) => last.to_datetime() < period_start,
    }
}

fn start_of_day(dt: DateTime<Utc>) -> DateTime<Utc> {
    dt.date_naive()
        .and_time(NaiveTime::MIN)
        .and_utc()
}

fn start_of_week(dt: DateTime<Utc>) -> DateTime<Utc> {
    let days_back = dt.weekday().num_days_from_monday() as i64;
    start_of_day(dt) - Duration::days(days_back)
}

fn start_of_month(dt: DateTime<Utc>) -> DateTime<Utc> {
    start_of_day(dt.with_day(1).unwrap_or(dt))
}

fn days_in_month(year: i32, month: u32) -> u32 {
    match month {
        1 | 3 | 5 | 7 | 8 | 10 | 12 => 31,
        4 | 6 | 9 | 11 => 30,
        _ => {
            let leap = (year % 4 == 0 && year % 100 != 0) || year % 400 == 0;
            if leap {
                29
            } else {
                28
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(y: i32, mo: u32, d: u32, h: u32) -> Timestamp {
        let dt = Utc.with_ymd_and_hms(y, mo, d, h, 0, 0).unwrap();
        Timestamp::from_millis(dt.timestamp_millis() as u64)
    }

    #[test]
    fn test_parse_simple_kinds() {
        assert_eq!(Cadence::parse("daily", None).unwrap(), Cadence::Daily);
        assert_eq!(Cadence::parse("weekly", None).unwrap(), Cadence::Weekly);
        assert_eq!(Cadence::parse("monthly", None).unwrap(), Cadence::Monthly);
    }

    #[test]
    fn test_parse_day_of_week() {
        assert_eq!(
            Cadence::parse("day_of_week", Some("tuesday")).unwrap(),
            Cadence::DayOfWeek(Weekday::Tue)
        );
        assert!(Cadence::parse("day_of_week", Some("someday")).is_err());
        assert!(Cadence::parse("day_of_week", None).is_err());
    }

    #[test]
    fn test_parse_day_of_month() {
        assert_eq!(
            Cadence::parse("day_of_month", Some("15")).unwrap(),
            Cadence::DayOfMonth(15)
        );
        assert!(Cadence::parse("day_of_month", Some("0")).is_err());
        assert!(Cadence::parse("day_of_month", Some("32")).is_err());
    }

    #[test]
    fn test_parse_unknown_kind() {
        let err = Cadence::parse("hourly", None).unwrap_err();
        assert!(err.is_invalid_arg());
    }

    #[test]
    fn test_parse_extra_value_rejected() {
        assert!(Cadence::parse("daily", Some("1")).is_err());
    }

    #[test]
    fn test_daily_due() {
        // 2026-03-10 is a Tuesday
        let now = ts(2026, 3, 10, 12);
        assert!(Cadence::Daily.is_due(now, None));
        // accessed yesterday -> due
        assert!(Cadence::Daily.is_due(now, Some(ts(2026, 3, 9, 23))));
        // accessed earlier today -> not due
        assert!(!Cadence::Daily.is_due(now, Some(ts(2026, 3, 10, 8))));
    }

    #[test]
    fn test_weekly_due() {
        // Tuesday; week starts Monday 2026-03-09
        let now = ts(2026, 3, 10, 12);
        assert!(Cadence::Weekly.is_due(now, Some(ts(2026, 3, 8, 12)))); // last Sunday
        assert!(!Cadence::Weekly.is_due(now, Some(ts(2026, 3, 9, 6)))); // this Monday
    }

    #[test]
    fn test_monthly_due() {
        let now = ts(2026, 3, 10, 12);
        assert!(Cadence::Monthly.is_due(now, Some(ts(2026, 2, 27, 12))));
        assert!(!Cadence::Monthly.is_due(now, Some(ts(2026, 3, 1, 1))));
    }

    #[test]
    fn test_day_of_week_due() {
        let tuesday = ts(2026, 3, 10, 12);
        let wednesday = ts(2026, 3, 11, 12);
        let cadence = Cadence::DayOfWeek(Weekday::Tue);
        assert!(cadence.is_due(tuesday, None));
        assert!(!cadence.is_due(wednesday, None));
        assert!(!cadence.is_due(tuesday, Some(ts(2026, 3, 10, 8))));
    }

    #[test]
    fn test_day_of_month_due() {
        let cadence = Cadence::DayOfMonth(15);
        assert!(cadence.is_due(ts(2026, 3, 15, 9), None));
        assert!(!cadence.is_due(ts(2026, 3, 14, 9), None));
    }

    #[test]
    fn test_day_of_month_clamps_to_short_months() {
        // Day 31 fires on Feb 28 in a non-leap year
        let cadence = Cadence::DayOfMonth(31);
        assert!(cadence.is_due(ts(2026, 2, 28, 9), None));
        assert!(!cadence.is_due(ts(2026, 2, 27, 9), None));
    }

    #[test]
    fn test_tag_round_trip() {
        let all = [
            Cadence::Daily,
            Cadence::Weekly,
            Cadence::Monthly,
            Cadence::DayOfWeek(Weekday::Fri),
            Cadence::DayOfMonth(28),
        ];
        for c in all {
            let (k, v) = c.as_tag();
            assert_eq!(Cadence::from_tag(k, v).unwrap(), c);
        }
    }

    #[test]
    fn test_wire_round_trip() {
        let c = Cadence::DayOfWeek(Weekday::Sat);
        let parsed = Cadence::parse(c.kind_str(), c.value_str().as_deref()).unwrap();
        assert_eq!(parsed, c);
    }
}
