//! Group expansion and concurrent OOO collection.
//!
//! One free/busy query expands the group into member calendars. Each member
//! is then fetched in its own task; a failing member is reported alongside
//! the results instead of failing the whole run.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::Duration;
use oooweek_core::{EventsByPerson, QueryWindow};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{ProviderError, ProviderErrorCode, ProviderResult};
use crate::normalize::collect_member_events;
use crate::provider::{CalendarProvider, EventQuery, FreeBusyQuery};

/// A member whose events could not be fetched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberFailure {
    /// The member calendar id.
    pub member: String,
    /// Why the fetch failed.
    pub reason: String,
}

impl fmt::Display for MemberFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.member, self.reason)
    }
}

/// The outcome of a collection run.
#[derive(Debug, Default)]
pub struct Collected {
    /// Retained events for every member that was fetched successfully.
    pub events: EventsByPerson,
    /// Members that could not be fetched, sorted by member.
    pub failures: Vec<MemberFailure>,
}

/// Expands a group and collects its members' OOO events.
pub struct Aggregator {
    provider: Arc<dyn CalendarProvider>,
}

impl Aggregator {
    /// Creates an aggregator over `provider`.
    pub fn new(provider: Arc<dyn CalendarProvider>) -> Self {
        Self { provider }
    }

    /// Collects OOO events lasting at least `min_duration` for every member
    /// of `group` within `window`.
    ///
    /// # Errors
    ///
    /// - [`ProviderErrorCode::GroupNotFound`] if the group is unknown
    /// - [`ProviderErrorCode::NoCalendarsVisible`] if it expands to nothing
    /// - [`ProviderErrorCode::Cancelled`] if `cancel` fires first
    /// - any error of the free/busy call itself
    pub async fn collect_ooo(
        &self,
        cancel: &CancellationToken,
        group: &str,
        window: &QueryWindow,
        min_duration: Duration,
    ) -> ProviderResult<Collected> {
        let (members, mut failures) = self.expand_group(cancel, group, window).await?;
        info!("group {} expanded to {} member calendars", group, members.len());

        let shared = Arc::new(Mutex::new(EventsByPerson::new()));
        let query = EventQuery::out_of_office(window);
        let mut pending: BTreeSet<String> = BTreeSet::new();
        let mut set = JoinSet::new();

        for member in members {
            pending.insert(member.clone());

            let provider = Arc::clone(&self.provider);
            let shared = Arc::clone(&shared);
            let cancel = cancel.clone();
            let query = query.clone();
            let tz = window.tz;

            set.spawn(async move {
                debug!(member = %member, "fetching OOO events");
                let result = tokio::select! {
                    _ = cancel.cancelled() => Err(ProviderError::cancelled("fetch interrupted")),
                    result = provider.list_events(&member, query) => result,
                };

                match result {
                    Ok(raw_events) => {
                        let events = collect_member_events(&raw_events, &member, &tz, min_duration);
                        debug!(
                            member = %member,
                            fetched = raw_events.len(),
                            retained = events.len(),
                            "fetched OOO events"
                        );
                        shared
                            .lock()
                            .unwrap_or_else(PoisonError::into_inner)
                            .insert(member.clone(), events);
                        (member, Ok(()))
                    }
                    Err(e) => (member, Err(e)),
                }
            });
        }

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    set.abort_all();
                    while set.join_next().await.is_some() {}
                    return Err(ProviderError::cancelled("collection interrupted"));
                }
                next = set.join_next() => next,
            };

            match next {
                None => break,
                Some(Ok((member, Ok(())))) => {
                    pending.remove(&member);
                }
                Some(Ok((member, Err(e)))) => {
                    pending.remove(&member);
                    warn!(member = %member, "failed to fetch events: {}", e);
                    failures.push(MemberFailure {
                        member,
                        reason: e.to_string(),
                    });
                }
                Some(Err(e)) => {
                    // The member is identified from `pending` once the set is drained.
                    warn!("member task failed: {}", e);
                }
            }
        }

        if cancel.is_cancelled() {
            return Err(ProviderError::cancelled("collection interrupted"));
        }

        for member in pending {
            failures.push(MemberFailure {
                member,
                reason: "fetch task panicked".to_string(),
            });
        }
        failures.sort_by(|a, b| a.member.cmp(&b.member));

        let events = std::mem::take(&mut *shared.lock().unwrap_or_else(PoisonError::into_inner));
        Ok(Collected { events, failures })
    }

    /// Resolves `group` into member calendar ids.
    ///
    /// Members whose free/busy entry carries errors are returned as failures
    /// and are not fetched.
    async fn expand_group(
        &self,
        cancel: &CancellationToken,
        group: &str,
        window: &QueryWindow,
    ) -> ProviderResult<(Vec<String>, Vec<MemberFailure>)> {
        let query = FreeBusyQuery::for_group(group, window);

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ProviderError::cancelled("group expansion interrupted")),
            result = self.provider.query_free_busy(query) => result,
        };

        let mut calendars = match result {
            Ok(calendars) => calendars,
            Err(e)
                if matches!(
                    e.code(),
                    ProviderErrorCode::NotFound | ProviderErrorCode::GroupNotFound
                ) =>
            {
                debug!("free/busy lookup for {} failed: {}", group, e);
                return Err(ProviderError::group_not_found(group).with_source(e));
            }
            Err(e) => return Err(e),
        };

        if let Some(own) = calendars.remove(group)
            && own.is_not_found()
        {
            return Err(ProviderError::group_not_found(group));
        }

        if calendars.is_empty() {
            return Err(ProviderError::no_calendars_visible(group));
        }

        let mut members = Vec::with_capacity(calendars.len());
        let mut failures = Vec::new();
        for (id, calendar) in calendars {
            match calendar.error_summary() {
                Some(reason) => {
                    warn!(member = %id, "calendar not accessible: {}", reason);
                    failures.push(MemberFailure { member: id, reason });
                }
                None => members.push(id),
            }
        }

        Ok((members, failures))
    }
}
