//! Raw event type from calendar providers.
//!
//! [`RawEvent`] is the provider-agnostic shape of an event as it comes off
//! the wire, before it is anchored in a timezone and turned into an
//! [`OooEvent`](oooweek_core::OooEvent).

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// The event type Google assigns to out-of-office entries.
pub const OUT_OF_OFFICE: &str = "outOfOffice";

/// The time specification for a raw event.
///
/// Calendar providers return either an RFC3339 datetime or, for all-day
/// events, a bare date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum RawEventTime {
    /// A specific datetime in UTC.
    DateTime(DateTime<Utc>),
    /// An all-day event date (no specific time).
    Date(NaiveDate),
}

impl RawEventTime {
    /// Returns true if this is an all-day event time.
    pub fn is_all_day(&self) -> bool {
        matches!(self, Self::Date(_))
    }
}

/// A raw calendar event from a provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawEvent {
    /// Provider-assigned event identifier.
    pub id: String,
    /// The calendar the event was listed from.
    pub calendar_id: String,
    /// Start time (inclusive).
    pub start: RawEventTime,
    /// End time (exclusive). For all-day events this is the day after the
    /// last day.
    pub end: RawEventTime,
    /// The event title.
    pub summary: Option<String>,
    /// Provider event type, e.g. `outOfOffice`.
    pub event_type: Option<String>,
    /// Event status (confirmed, tentative, cancelled).
    pub status: Option<String>,
}

impl RawEvent {
    /// Creates a new raw event with the required fields.
    pub fn new(
        id: impl Into<String>,
        start: RawEventTime,
        end: RawEventTime,
        calendar_id: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            calendar_id: calendar_id.into(),
            start,
            end,
            summary: None,
            event_type: None,
            status: None,
        }
    }

    /// Builder method to set the summary.
    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = Some(summary.into());
        self
    }

    /// Builder method to set the event type.
    pub fn with_event_type(mut self, event_type: impl Into<String>) -> Self {
        self.event_type = Some(event_type.into());
        self
    }

    /// Builder method to set the status.
    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }

    /// Returns true if this event has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.status.as_deref() == Some("cancelled")
    }

    /// Returns true unless the provider typed the event as something other
    /// than out-of-office.
    pub fn is_out_of_office(&self) -> bool {
        self.event_type
            .as_deref()
            .is_none_or(|kind| kind == OUT_OF_OFFICE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn builder_sets_fields() {
        let event = RawEvent::new(
            "evt-1",
            RawEventTime::Date(date(2025, 3, 3)),
            RawEventTime::Date(date(2025, 3, 5)),
            "alice@example.com",
        )
        .with_summary("Vacation")
        .with_event_type(OUT_OF_OFFICE)
        .with_status("confirmed");

        assert_eq!(event.summary.as_deref(), Some("Vacation"));
        assert!(event.is_out_of_office());
        assert!(!event.is_cancelled());
        assert!(event.start.is_all_day());
    }

    #[test]
    fn untyped_events_count_as_out_of_office() {
        let start = Utc.with_ymd_and_hms(2025, 3, 3, 9, 0, 0).unwrap();
        let event = RawEvent::new(
            "evt-2",
            RawEventTime::DateTime(start),
            RawEventTime::DateTime(start),
            "bob@example.com",
        );
        assert!(event.is_out_of_office());
        assert!(!event.clone().with_event_type("default").is_out_of_office());
        assert!(event.with_status("cancelled").is_cancelled());
    }
}
