//! CalendarProvider trait definition.
//!
//! This module defines the [`CalendarProvider`] trait, the seam between the
//! aggregator and a calendar backend. A provider answers two questions:
//!
//! - which calendars does a group address expand to (free/busy expansion)
//! - which OOO events does one calendar hold in a time range

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;

use chrono::{DateTime, Utc};
use oooweek_core::QueryWindow;
use serde::{Deserialize, Serialize};

use crate::error::ProviderResult;
use crate::raw_event::{RawEvent, OUT_OF_OFFICE};

/// Events requested per page when listing a calendar.
pub const EVENT_PAGE_SIZE: usize = 250;

/// Bounds on group expansion, sent with every free/busy query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpansionLimits {
    /// Maximum number of members resolved per group.
    pub group_expansion_max: u32,
    /// Maximum number of calendars returned per request.
    pub calendar_expansion_max: u32,
}

impl Default for ExpansionLimits {
    fn default() -> Self {
        Self {
            group_expansion_max: 100,
            calendar_expansion_max: 50,
        }
    }
}

/// A free/busy expansion request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FreeBusyQuery {
    pub time_min: DateTime<Utc>,
    pub time_max: DateTime<Utc>,
    /// IANA name of the timezone used in the response.
    pub time_zone: String,
    /// Group or calendar addresses to expand.
    pub items: Vec<String>,
    pub limits: ExpansionLimits,
}

impl FreeBusyQuery {
    /// Builds a query expanding `group` over `window`.
    pub fn for_group(group: impl Into<String>, window: &QueryWindow) -> Self {
        Self {
            time_min: window.start,
            time_max: window.end,
            time_zone: window.timezone_name().to_string(),
            items: vec![group.into()],
            limits: ExpansionLimits::default(),
        }
    }

}

/// An error reported for one entry of a free/busy response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FreeBusyError {
    #[serde(default)]
    pub domain: String,
    #[serde(default)]
    pub reason: String,
}

impl FreeBusyError {
    /// Returns true if the entry is unknown to the provider.
    pub fn is_not_found(&self) -> bool {
        self.reason == "notFound"
    }
}

/// A busy interval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusyPeriod {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// Free/busy summary for one calendar.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FreeBusyCalendar {
    #[serde(default)]
    pub busy: Vec<BusyPeriod>,
    #[serde(default)]
    pub errors: Vec<FreeBusyError>,
}

impl FreeBusyCalendar {
    /// Returns true if the provider reported this calendar as unknown.
    pub fn is_not_found(&self) -> bool {
        self.errors.iter().any(FreeBusyError::is_not_found)
    }

    /// The reasons of all reported errors, joined for display.
    pub fn error_summary(&self) -> Option<String> {
        if self.errors.is_empty() {
            return None;
        }
        Some(
            self.errors
                .iter()
                .map(|e| e.reason.as_str())
                .collect::<Vec<_>>()
                .join(", "),
        )
    }
}

/// Options for listing one calendar's events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventQuery {
    pub time_min: DateTime<Utc>,
    pub time_max: DateTime<Utc>,
    /// Only return events of these types. Empty means all types.
    pub event_types: Vec<String>,
    /// Expand recurring events into single instances.
    pub single_events: bool,
    /// Order results by start time.
    pub order_by_start: bool,
    /// Page size hint.
    pub max_results: Option<usize>,
}

impl EventQuery {
    /// Single out-of-office events within `window`, ordered by start time.
    pub fn out_of_office(window: &QueryWindow) -> Self {
        Self {
            time_min: window.start,
            time_max: window.end,
            event_types: vec![OUT_OF_OFFICE.to_string()],
            single_events: true,
            order_by_start: true,
            max_results: Some(EVENT_PAGE_SIZE),
        }
    }
}

/// A boxed future for async trait methods.
///
/// Boxed futures keep the trait object-safe so providers can be shared as
/// `Arc<dyn CalendarProvider>` across tasks.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// The core abstraction for calendar providers.
///
/// # Implementation Notes
///
/// - Implementations must be `Send + Sync`: the aggregator calls
///   [`list_events`](Self::list_events) from many tasks at once
/// - Pagination is handled internally
/// - There is no retry layer; errors are reported as-is
pub trait CalendarProvider: Send + Sync {
    /// Returns the name/type of this provider (e.g., "google").
    fn name(&self) -> &str;

    /// Expands the query items into member calendars.
    ///
    /// Returns a map from resolved calendar id to its free/busy summary.
    fn query_free_busy(
        &self,
        query: FreeBusyQuery,
    ) -> BoxFuture<'_, ProviderResult<BTreeMap<String, FreeBusyCalendar>>>;

    /// Lists events from one calendar.
    fn list_events<'a>(
        &'a self,
        calendar_id: &'a str,
        query: EventQuery,
    ) -> BoxFuture<'a, ProviderResult<Vec<RawEvent>>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn window() -> QueryWindow {
        let now = Utc.with_ymd_and_hms(2025, 3, 5, 12, 0, 0).unwrap();
        QueryWindow::weeks_ahead(now, 8, chrono_tz::Europe::Paris).unwrap()
    }

    #[test]
    fn default_limits() {
        let limits = ExpansionLimits::default();
        assert_eq!(limits.group_expansion_max, 100);
        assert_eq!(limits.calendar_expansion_max, 50);
    }

    #[test]
    fn free_busy_query_for_group() {
        let w = window();
        let query = FreeBusyQuery::for_group("team@example.com", &w);
        assert_eq!(query.items, vec!["team@example.com".to_string()]);
        assert_eq!(query.time_min, w.start);
        assert_eq!(query.time_max, w.end);
        assert_eq!(query.time_zone, "Europe/Paris");
        assert_eq!(query.limits, ExpansionLimits::default());
    }

    #[test]
    fn event_query_out_of_office() {
        let w = window();
        let query = EventQuery::out_of_office(&w);
        assert_eq!(query.event_types, vec!["outOfOffice".to_string()]);
        assert!(query.single_events);
        assert!(query.order_by_start);
        assert_eq!(query.max_results, Some(250));
    }

    #[test]
    fn free_busy_calendar_errors() {
        let json = r#"{"errors": [{"domain": "global", "reason": "notFound"}], "busy": []}"#;
        let cal: FreeBusyCalendar = serde_json::from_str(json).unwrap();
        assert!(cal.is_not_found());
        assert_eq!(cal.error_summary().as_deref(), Some("notFound"));

        let ok: FreeBusyCalendar = serde_json::from_str("{}").unwrap();
        assert!(!ok.is_not_found());
        assert!(ok.error_summary().is_none());
    }
}
