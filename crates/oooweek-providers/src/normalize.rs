//! RawEvent to OooEvent conversion.
//!
//! Timed instants are used as-is. All-day dates are anchored at local
//! midnight in the display timezone, so an all-day event ending on a date
//! ends exactly when that date starts locally.

use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use oooweek_core::OooEvent;
use oooweek_core::time::start_of_day;

use crate::raw_event::{RawEvent, RawEventTime};

/// Converts a [`RawEvent`] into an [`OooEvent`] attributed to `person`.
///
/// Returns `None` for cancelled events, events typed as something other than
/// out-of-office, and events whose end is not after their start.
pub fn to_ooo_event(raw: &RawEvent, person: &str, tz: &Tz) -> Option<OooEvent> {
    if raw.is_cancelled() || !raw.is_out_of_office() {
        return None;
    }

    let start = resolve_time(&raw.start, tz);
    let end = resolve_time(&raw.end, tz);

    let event = OooEvent::new(person, start, end)?;
    Some(match raw.summary.as_deref() {
        Some(summary) if !summary.is_empty() => event.with_summary(summary),
        _ => event,
    })
}

/// Resolves a raw time to an absolute instant in `tz`.
pub fn resolve_time(time: &RawEventTime, tz: &Tz) -> DateTime<Utc> {
    match time {
        RawEventTime::DateTime(dt) => *dt,
        RawEventTime::Date(date) => start_of_day(*date, tz),
    }
}

/// Converts and filters a member's events, keeping those lasting at least
/// `min_duration`, ordered by start.
pub fn collect_member_events(
    raw_events: &[RawEvent],
    person: &str,
    tz: &Tz,
    min_duration: Duration,
) -> Vec<OooEvent> {
    let mut events: Vec<OooEvent> = raw_events
        .iter()
        .filter_map(|raw| to_ooo_event(raw, person, tz))
        .filter(|event| event.lasts_at_least(min_duration))
        .collect();
    events.sort_by(|a, b| a.start.cmp(&b.start).then(a.end.cmp(&b.end)));
    events
}
