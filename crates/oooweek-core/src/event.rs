//! Out-of-office event types.
//!
//! - [`OooEvent`]: a single OOO period for one person, as absolute instants
//! - [`EventsByPerson`]: the aggregator output consumed by the renderer

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Events keyed by person (calendar id), each list ordered by start time.
///
/// A person with an empty list was visible but had no qualifying events.
pub type EventsByPerson = BTreeMap<String, Vec<OooEvent>>;

/// An out-of-office period for one person.
///
/// Both bounds are absolute instants. All-day events have already been
/// anchored at local midnight by the time they become an `OooEvent`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OooEvent {
    /// The person (calendar id / email address) this event belongs to.
    pub person: String,
    /// Start of the period (inclusive).
    pub start: DateTime<Utc>,
    /// End of the period (exclusive).
    pub end: DateTime<Utc>,
    /// The event title, if the provider exposed one.
    pub summary: Option<String>,
}

impl OooEvent {
    /// Creates an event, returning `None` unless `end > start`.
    pub fn new(
        person: impl Into<String>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Option<Self> {
        (end > start).then(|| Self {
            person: person.into(),
            start,
            end,
            summary: None,
        })
    }

    /// Builder method to set the summary.
    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = Some(summary.into());
        self
    }

    /// Length of the period.
    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    /// Returns true if the period lasts at least `min`.
    pub fn lasts_at_least(&self, min: Duration) -> bool {
        self.duration() >= min
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn utc(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
    }

    #[test]
    fn rejects_empty_or_inverted_periods() {
        assert!(OooEvent::new("a@example.com", utc(2025, 3, 3, 9), utc(2025, 3, 3, 9)).is_none());
        assert!(OooEvent::new("a@example.com", utc(2025, 3, 3, 9), utc(2025, 3, 3, 8)).is_none());
    }

    #[test]
    fn duration_threshold_is_inclusive() {
        let event = OooEvent::new("a@example.com", utc(2025, 3, 3, 0), utc(2025, 3, 5, 0))
            .unwrap()
            .with_summary("Vacation");

        assert_eq!(event.duration(), Duration::hours(48));
        assert!(event.lasts_at_least(Duration::hours(48)));
        assert!(!event.lasts_at_least(Duration::hours(49)));
        assert_eq!(event.summary.as_deref(), Some("Vacation"));
    }

    #[test]
    fn serde_roundtrip() {
        let event = OooEvent::new("a@example.com", utc(2025, 3, 3, 0), utc(2025, 3, 4, 0)).unwrap();
        let json = serde_json::to_string(&event).unwrap();
        let parsed: OooEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(event, parsed);
    }
}
