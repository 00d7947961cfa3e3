//! Time types for the weekly OOO view.
//!
//! This module provides [`QueryWindow`] for the week-aligned range sent to the
//! calendar provider, helpers to anchor calendar dates in a timezone, and the
//! parsers used for the `--min-duration` and `--timezone` options.

use chrono::{DateTime, Datelike, Days, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use thiserror::Error;

/// Errors produced when parsing a duration string.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DurationParseError {
    /// The input was empty.
    #[error("empty duration")]
    Empty,
    /// A number was not followed by a unit (e.g. `"24"`).
    #[error("missing unit in duration {0:?} (expected one of d, h, m, s)")]
    MissingUnit(String),
    /// The unit is not one of `d`, `h`, `m`, `s`.
    #[error("unknown unit {unit:?} in duration {input:?}")]
    UnknownUnit { input: String, unit: String },
    /// The input contained something other than number/unit pairs.
    #[error("invalid duration {0:?}")]
    Invalid(String),
    /// The value does not fit in a duration.
    #[error("duration {0:?} is too large")]
    Overflow(String),
}

/// Errors produced when resolving a timezone name.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown timezone {name:?}: {reason}")]
pub struct TimezoneError {
    /// The name that failed to resolve.
    pub name: String,
    /// Why it failed.
    pub reason: String,
}

/// Error returned when a window would end past the representable calendar.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{weeks} weeks ahead of {from} is out of range")]
pub struct WindowError {
    /// The local date the window was computed from.
    pub from: NaiveDate,
    /// The requested number of weeks.
    pub weeks: u32,
}

/// Parses a duration such as `24h`, `48h`, `1h30m`, `2d` or `90m`.
///
/// Components are summed, so `1d12h` is 36 hours. A bare `0` is accepted and
/// means "no minimum".
pub fn parse_duration(input: &str) -> Result<Duration, DurationParseError> {
    let s = input.trim();
    if s.is_empty() {
        return Err(DurationParseError::Empty);
    }
    if s == "0" {
        return Ok(Duration::zero());
    }

    let mut total_secs: i64 = 0;
    let mut rest = s;

    while !rest.is_empty() {
        let digits_len = rest.chars().take_while(|c| c.is_ascii_digit()).count();
        if digits_len == 0 {
            return Err(DurationParseError::Invalid(s.to_string()));
        }
        let (digits, tail) = rest.split_at(digits_len);
        let value: i64 = digits
            .parse()
            .map_err(|_| DurationParseError::Overflow(s.to_string()))?;

        let unit_len = tail.chars().take_while(|c| c.is_ascii_alphabetic()).count();
        if unit_len == 0 {
            return Err(DurationParseError::MissingUnit(s.to_string()));
        }
        let (unit, tail) = tail.split_at(unit_len);

        let unit_secs = match unit {
            "d" => 86_400,
            "h" => 3_600,
            "m" => 60,
            "s" => 1,
            other => {
                return Err(DurationParseError::UnknownUnit {
                    input: s.to_string(),
                    unit: other.to_string(),
                });
            }
        };

        total_secs = value
            .checked_mul(unit_secs)
            .and_then(|secs| total_secs.checked_add(secs))
            .ok_or_else(|| DurationParseError::Overflow(s.to_string()))?;
        rest = tail;
    }

    Duration::try_seconds(total_secs).ok_or_else(|| DurationParseError::Overflow(s.to_string()))
}

/// Resolves an IANA timezone name.
///
/// `None` selects the system timezone.
pub fn resolve_timezone(name: Option<&str>) -> Result<Tz, TimezoneError> {
    match name {
        Some(name) => name.trim().parse::<Tz>().map_err(|e| TimezoneError {
            name: name.to_string(),
            reason: e.to_string(),
        }),
        None => Ok(system_timezone()),
    }
}

/// Returns the system timezone, falling back to UTC if it cannot be determined.
pub fn system_timezone() -> Tz {
    match iana_time_zone::get_timezone() {
        Ok(name) => name.parse::<Tz>().unwrap_or_else(|_| {
            tracing::warn!("system timezone {} is not a known IANA zone, using UTC", name);
            Tz::UTC
        }),
        Err(e) => {
            tracing::warn!("could not determine system timezone ({}), using UTC", e);
            Tz::UTC
        }
    }
}

/// Returns the Monday of the week containing `date`.
pub fn week_monday(date: NaiveDate) -> NaiveDate {
    date - Duration::days(i64::from(date.weekday().num_days_from_monday()))
}

/// Returns the first instant of `date` in `tz`.
///
/// All-day calendar dates are anchored here. If local midnight does not exist
/// (a DST gap at midnight) the first existing hour of the day is used.
pub fn start_of_day(date: NaiveDate, tz: &Tz) -> DateTime<Utc> {
    let midnight = date.and_time(NaiveTime::MIN);
    (0..=3)
        .find_map(|h| {
            tz.from_local_datetime(&(midnight + Duration::hours(h)))
                .earliest()
        })
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|| midnight.and_utc())
}

/// Returns the last whole second of `date` in `tz` (23:59:59 local).
pub fn end_of_day(date: NaiveDate, tz: &Tz) -> DateTime<Utc> {
    match date.succ_opt() {
        Some(next) => start_of_day(next, tz) - Duration::seconds(1),
        None => date
            .and_hms_opt(23, 59, 59)
            .map(|dt| dt.and_utc())
            .unwrap_or_else(|| start_of_day(date, tz)),
    }
}

/// Returns true if `instant` is exactly the start of its local day in `tz`.
pub fn is_local_midnight(instant: DateTime<Utc>, tz: &Tz) -> bool {
    let date = instant.with_timezone(tz).date_naive();
    start_of_day(date, tz) == instant
}

/// The week-aligned range queried from the calendar provider.
///
/// `start` is Monday 00:00:00 of the week containing "now" and `end` is
/// Sunday 23:59:59 of the week `weeks` weeks later, both in `tz`. The window
/// therefore always covers `weeks + 1` whole weeks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryWindow {
    /// Monday 00:00 local, as an instant.
    pub start: DateTime<Utc>,
    /// Sunday 23:59:59 local, as an instant.
    pub end: DateTime<Utc>,
    /// The timezone used for week boundaries and all-day events.
    pub tz: Tz,
}

impl QueryWindow {
    /// Computes the window for `weeks` weeks ahead of `now`.
    ///
    /// Fails if the last Sunday is past the end of the representable calendar.
    pub fn weeks_ahead(now: DateTime<Utc>, weeks: u32, tz: Tz) -> Result<Self, WindowError> {
        let today = now.with_timezone(&tz).date_naive();
        let monday = week_monday(today);
        let sunday = monday
            .checked_add_days(Days::new(u64::from(weeks) * 7 + 6))
            .and_then(|sunday| sunday.succ_opt().map(|_| sunday))
            .ok_or(WindowError { from: today, weeks })?;

        Ok(Self {
            start: start_of_day(monday, &tz),
            end: end_of_day(sunday, &tz),
            tz,
        })
    }

    /// Builds a window covering the whole weeks from `first_monday` to the
    /// Sunday of the week containing `last_day`.
    pub fn from_dates(first_monday: NaiveDate, last_day: NaiveDate, tz: Tz) -> Self {
        let monday = week_monday(first_monday);
        let sunday = week_monday(last_day.max(monday)) + Duration::days(6);
        Self {
            start: start_of_day(monday, &tz),
            end: end_of_day(sunday, &tz),
            tz,
        }
    }

    /// The local date of the window start (always a Monday).
    pub fn first_day(&self) -> NaiveDate {
        self.start.with_timezone(&self.tz).date_naive()
    }

    /// The local date of the window end (always a Sunday).
    pub fn last_day(&self) -> NaiveDate {
        self.end.with_timezone(&self.tz).date_naive()
    }

    /// The Monday of every week in the window, in order.
    pub fn week_starts(&self) -> Vec<NaiveDate> {
        let last = self.last_day();
        let mut weeks = Vec::new();
        let mut monday = week_monday(self.first_day());
        while monday <= last {
            weeks.push(monday);
            monday += Duration::weeks(1);
        }
        weeks
    }

    /// The IANA name of the window timezone.
    pub fn timezone_name(&self) -> &'static str {
        self.tz.name()
    }
}
