//! Date-indexed presence of OOO people.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{Duration, NaiveDate};
use chrono_tz::Tz;

use crate::event::{EventsByPerson, OooEvent};
use crate::time::is_local_midnight;

/// Maps each local calendar date to the set of people OOO on that date.
///
/// An event marks every date from the local date of its start through the
/// local date of its end. The end date is not marked when the event ends
/// exactly at local midnight, which is how all-day events end.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PresenceGrid {
    days: BTreeMap<NaiveDate, BTreeSet<String>>,
}

impl PresenceGrid {
    /// Builds the grid for all events, resolving dates in `tz`.
    pub fn build(events_by_person: &EventsByPerson, tz: &Tz) -> Self {
        let mut grid = Self::default();
        for (person, events) in events_by_person {
            for event in events {
                grid.mark(person, event, tz);
            }
        }
        grid
    }

    fn mark(&mut self, person: &str, event: &OooEvent, tz: &Tz) {
        let Some((first, last)) = Self::span(event, tz) else {
            return;
        };

        let mut day = first;
        while day <= last {
            self.days
                .entry(day)
                .or_default()
                .insert(person.to_string());
            day += Duration::days(1);
        }
    }

    /// Returns the first and last local dates covered by `event`.
    fn span(event: &OooEvent, tz: &Tz) -> Option<(NaiveDate, NaiveDate)> {
        if event.end <= event.start {
            return None;
        }

        let first = event.start.with_timezone(tz).date_naive();
        let mut last = event.end.with_timezone(tz).date_naive();
        if is_local_midnight(event.end, tz) {
            last = last.pred_opt()?;
        }

        (last >= first).then_some((first, last))
    }

    /// Returns true if `person` is OOO on `date`.
    pub fn is_present(&self, date: NaiveDate, person: &str) -> bool {
        self.days
            .get(&date)
            .is_some_and(|people| people.contains(person))
    }

    /// People OOO on `date`, sorted.
    #[cfg(test)]
    fn people_on(&self, date: NaiveDate) -> impl Iterator<Item = &str> {
        self.days
            .get(&date)
            .into_iter()
            .flat_map(|people| people.iter().map(String::as_str))
    }

    /// Distinct people OOO on any date in `[first, last]`, sorted.
    pub fn people_between(&self, first: NaiveDate, last: NaiveDate) -> BTreeSet<&str> {
        self.days
            .range(first..=last)
            .flat_map(|(_, people)| people.iter().map(String::as_str))
            .collect()
    }

    /// All dates with at least one person OOO, in order.
    #[cfg(test)]
    fn dates(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        self.days.keys().copied()
    }

    /// Returns true if nobody is OOO on any date.
    #[cfg(test)]
    fn is_empty(&self) -> bool {
        self.days.is_empty()
    }
}
