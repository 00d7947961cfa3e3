//! Google Calendar provider implementation.
//!
//! This module implements the [`CalendarProvider`] trait for Google Calendar.

use std::collections::BTreeMap;

use tracing::debug;

use crate::error::{ProviderError, ProviderResult};
use crate::provider::{BoxFuture, CalendarProvider, EventQuery, FreeBusyCalendar, FreeBusyQuery};
use crate::raw_event::RawEvent;

use super::client::{FreeBusyResponse, GoogleCalendarClient};
use super::config::GoogleConfig;
use super::tokens::Credential;

const PROVIDER_NAME: &str = "google";

/// Google Calendar provider.
///
/// Holds an API client authorized with one access credential; obtaining and
/// caching that credential is [`AuthFlow`](super::flow::AuthFlow)'s job.
#[derive(Debug)]
pub struct GoogleProvider {
    client: GoogleCalendarClient,
}

impl GoogleProvider {
    /// Creates a provider that authenticates with `credential`.
    pub fn new(credential: &Credential, config: &GoogleConfig) -> ProviderResult<Self> {
        config
            .validate()
            .map_err(|e| ProviderError::configuration(e).with_provider(PROVIDER_NAME))?;

        let client = GoogleCalendarClient::new(&credential.access_token, config)
            .map_err(|e| e.with_provider(PROVIDER_NAME))?;
        Ok(Self { client })
    }

    async fn expand(
        &self,
        query: FreeBusyQuery,
    ) -> ProviderResult<BTreeMap<String, FreeBusyCalendar>> {
        let response = self
            .client
            .free_busy(&query)
            .await
            .map_err(|e| e.with_provider(PROVIDER_NAME))?;
        calendars_for(&query, response)
    }

    async fn fetch(&self, calendar_id: &str, query: EventQuery) -> ProviderResult<Vec<RawEvent>> {
        self.client
            .list_events(calendar_id, &query)
            .await
            .map_err(|e| e.with_provider(PROVIDER_NAME))
    }
}

/// Checks the group section of a free/busy response and returns the
/// resolved calendars.
fn calendars_for(
    query: &FreeBusyQuery,
    response: FreeBusyResponse,
) -> ProviderResult<BTreeMap<String, FreeBusyCalendar>> {
    for item in &query.items {
        if let Some(group) = response.groups.get(item) {
            if group.is_not_found() {
                return Err(ProviderError::group_not_found(item).with_provider(PROVIDER_NAME));
            }
            debug!("{} expanded to {} calendars", item, group.calendars.len());
        }
    }
    Ok(response.calendars)
}

impl CalendarProvider for GoogleProvider {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    fn query_free_busy(
        &self,
        query: FreeBusyQuery,
    ) -> BoxFuture<'_, ProviderResult<BTreeMap<String, FreeBusyCalendar>>> {
        Box::pin(self.expand(query))
    }

    fn list_events<'a>(
        &'a self,
        calendar_id: &'a str,
        query: EventQuery,
    ) -> BoxFuture<'a, ProviderResult<Vec<RawEvent>>> {
        Box::pin(self.fetch(calendar_id, query))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use oooweek_core::QueryWindow;

    use crate::error::ProviderErrorCode;

    fn window() -> QueryWindow {
        let now = Utc.with_ymd_and_hms(2025, 3, 5, 12, 0, 0).unwrap();
        QueryWindow::weeks_ahead(now, 1, chrono_tz::UTC).unwrap()
    }

    fn credential() -> Credential {
        Credential::issued_at(Utc::now(), "test-token", None, Some(3600), None)
    }

    async fn provider_for(server: &mockito::ServerGuard) -> GoogleProvider {
        let config = GoogleConfig::default().with_api_base(server.url());
        GoogleProvider::new(&credential(), &config).unwrap()
    }

    #[tokio::test]
    async fn unknown_group_is_group_not_found() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/freeBusy")
            .with_status(200)
            .with_body(
                r#"{
                    "groups": {
                        "ghosts@example.com": {"errors": [{"domain": "global", "reason": "notFound"}]}
                    },
                    "calendars": {}
                }"#,
            )
            .create_async()
            .await;

        let provider = provider_for(&server).await;
        let err = provider
            .query_free_busy(FreeBusyQuery::for_group("ghosts@example.com", &window()))
            .await
            .unwrap_err();

        assert_eq!(err.code(), ProviderErrorCode::GroupNotFound);
        assert_eq!(err.provider(), Some("google"));
    }

    #[tokio::test]
    async fn returns_member_calendars() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/freeBusy")
            .with_status(200)
            .with_body(
                r#"{
                    "groups": {"team@example.com": {"calendars": ["alice@example.com", "bob@example.com"]}},
                    "calendars": {
                        "alice@example.com": {"busy": []},
                        "bob@example.com": {"errors": [{"domain": "calendar", "reason": "notFound"}]}
                    }
                }"#,
            )
            .create_async()
            .await;

        let provider = provider_for(&server).await;
        let calendars = provider
            .query_free_busy(FreeBusyQuery::for_group("team@example.com", &window()))
            .await
            .unwrap();

        assert_eq!(calendars.len(), 2);
        assert!(calendars["bob@example.com"].is_not_found());
        assert_eq!(provider.name(), "google");
    }

    #[tokio::test]
    async fn list_events_errors_carry_provider() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", mockito::Matcher::Regex(r"^/calendars/".to_string()))
            .match_query(mockito::Matcher::Any)
            .with_status(401)
            .create_async()
            .await;

        let provider = provider_for(&server).await;
        let err = provider
            .list_events("alice@example.com", EventQuery::out_of_office(&window()))
            .await
            .unwrap_err();

        assert_eq!(err.code(), ProviderErrorCode::AuthenticationFailed);
        assert_eq!(err.provider(), Some("google"));
    }

    #[test]
    fn rejects_invalid_config() {
        let config = GoogleConfig::default().with_scopes(vec![]);
        let err = GoogleProvider::new(&credential(), &config).unwrap_err();
        assert_eq!(err.code(), ProviderErrorCode::ConfigurationError);
    }
}
