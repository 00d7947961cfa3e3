//! Google Calendar API client.
//!
//! This module provides a low-level HTTP client for the two Calendar API
//! calls the tool needs: `freeBusy` (group expansion) and `events.list`
//! (out-of-office entries of one calendar).

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{ProviderError, ProviderResult};
use crate::provider::{EventQuery, FreeBusyCalendar, FreeBusyError, FreeBusyQuery};
use crate::raw_event::{RawEvent, RawEventTime};

use super::config::GoogleConfig;

/// Google Calendar API client.
#[derive(Debug)]
pub struct GoogleCalendarClient {
    http_client: reqwest::Client,
    access_token: String,
    base_url: String,
}

impl GoogleCalendarClient {
    /// Creates a new Google Calendar client with the given access token.
    pub fn new(access_token: impl Into<String>, config: &GoogleConfig) -> ProviderResult<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| {
                ProviderError::internal(format!("failed to create HTTP client: {}", e))
            })?;

        Ok(Self {
            http_client,
            access_token: access_token.into(),
            base_url: config.api_base.trim_end_matches('/').to_string(),
        })
    }

    /// Queries free/busy information, expanding groups into members.
    pub async fn free_busy(&self, query: &FreeBusyQuery) -> ProviderResult<FreeBusyResponse> {
        let url = format!("{}/freeBusy", self.base_url);
        let request = FreeBusyRequest {
            time_min: rfc3339(query.time_min),
            time_max: rfc3339(query.time_max),
            time_zone: &query.time_zone,
            group_expansion_max: query.limits.group_expansion_max,
            calendar_expansion_max: query.limits.calendar_expansion_max,
            items: query.items.iter().map(|id| FreeBusyItem { id }).collect(),
        };
        let body = serde_json::to_string(&request).map_err(|e| {
            ProviderError::internal(format!("failed to encode freeBusy request: {}", e))
        })?;

        debug!("querying free/busy for {:?}", query.items);
        let response = self
            .http_client
            .post(&url)
            .bearer_auth(&self.access_token)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .map_err(send_error)?;

        let body = read_body(response, "freeBusy").await?;
        serde_json::from_str(&body).map_err(|e| {
            ProviderError::invalid_response(format!("failed to parse freeBusy response: {}", e))
        })
    }

    /// Lists events from a calendar, following pagination.
    pub async fn list_events(
        &self,
        calendar_id: &str,
        query: &EventQuery,
    ) -> ProviderResult<Vec<RawEvent>> {
        let mut all_events = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let page = self
                .list_events_page(calendar_id, query, page_token.as_deref())
                .await?;

            all_events.extend(
                page.items
                    .into_iter()
                    .filter_map(|event| convert_event(event, calendar_id)),
            );

            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        debug!("fetched {} events from calendar {}", all_events.len(), calendar_id);
        Ok(all_events)
    }

    /// Fetches a single page of events.
    async fn list_events_page(
        &self,
        calendar_id: &str,
        query: &EventQuery,
        page_token: Option<&str>,
    ) -> ProviderResult<EventListResponse> {
        let url = format!(
            "{}/calendars/{}/events",
            self.base_url,
            urlencoding::encode(calendar_id)
        );

        let mut request = self
            .http_client
            .get(&url)
            .bearer_auth(&self.access_token)
            .query(&[
                ("timeMin", rfc3339(query.time_min)),
                ("timeMax", rfc3339(query.time_max)),
                ("singleEvents", query.single_events.to_string()),
            ]);

        if query.order_by_start {
            request = request.query(&[("orderBy", "startTime")]);
        }

        for event_type in &query.event_types {
            request = request.query(&[("eventTypes", event_type)]);
        }

        if let Some(max) = query.max_results {
            request = request.query(&[("maxResults", max.to_string())]);
        }

        if let Some(token) = page_token {
            request = request.query(&[("pageToken", token)]);
        }

        let response = request.send().await.map_err(send_error)?;
        let body = read_body(response, calendar_id).await?;

        serde_json::from_str(&body).map_err(|e| {
            ProviderError::invalid_response(format!("failed to parse response: {}", e))
        })
    }
}

fn rfc3339(instant: DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn send_error(e: reqwest::Error) -> ProviderError {
    let message = if e.is_timeout() {
        "request timeout".to_string()
    } else if e.is_connect() {
        format!("connection failed: {}", e)
    } else {
        format!("request failed: {}", e)
    };
    ProviderError::network(message).with_source(e)
}

/// Maps the response status to an error, or returns the body.
async fn read_body(response: reqwest::Response, resource: &str) -> ProviderResult<String> {
    let status = response.status();

    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        let retry_after = response
            .headers()
            .get("Retry-After")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse::<u64>().ok());
        return Err(ProviderError::rate_limited(format!(
            "rate limit exceeded{}",
            retry_after
                .map(|s| format!(", retry after {} seconds", s))
                .unwrap_or_default()
        )));
    }

    if status == reqwest::StatusCode::UNAUTHORIZED {
        return Err(ProviderError::authentication("access token expired or invalid"));
    }

    if status == reqwest::StatusCode::FORBIDDEN {
        return Err(ProviderError::authorization(format!(
            "access denied to {}",
            resource
        )));
    }

    if status == reqwest::StatusCode::NOT_FOUND {
        return Err(ProviderError::not_found(format!("{} not found", resource)));
    }

    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(ProviderError::server(format!(
            "API error ({}): {}",
            status, body
        )));
    }

    response
        .text()
        .await
        .map_err(|e| ProviderError::network(format!("failed to read response: {}", e)))
}

/// Converts a Google Calendar API event to a RawEvent.
fn convert_event(event: ApiEvent, calendar_id: &str) -> Option<RawEvent> {
    // Skip cancelled events
    if event.status.as_deref() == Some("cancelled") {
        return None;
    }

    let id = event.id.unwrap_or_default();
    let start = parse_event_time(&event.start, &id, "start")?;
    let end = parse_event_time(&event.end, &id, "end")?;

    let mut raw_event = RawEvent::new(id, start, end, calendar_id);
    raw_event.summary = event.summary;
    raw_event.event_type = event.event_type;
    raw_event.status = event.status;
    Some(raw_event)
}

fn parse_event_time(time: &ApiEventTime, id: &str, which: &str) -> Option<RawEventTime> {
    match (&time.date_time, &time.date) {
        (Some(dt), _) => DateTime::parse_from_rfc3339(dt)
            .map(|parsed| RawEventTime::DateTime(parsed.with_timezone(&Utc)))
            .map_err(|e| warn!("event {}: failed to parse {} time: {}", id, which, e))
            .ok(),
        (None, Some(date)) => NaiveDate::parse_from_str(date, "%Y-%m-%d")
            .map(RawEventTime::Date)
            .map_err(|e| warn!("event {}: failed to parse {} date: {}", id, which, e))
            .ok(),
        (None, None) => {
            warn!("event {} has no {} time", id, which);
            None
        }
    }
}

/// Request body of the freeBusy endpoint.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct FreeBusyRequest<'a> {
    time_min: String,
    time_max: String,
    time_zone: &'a str,
    group_expansion_max: u32,
    calendar_expansion_max: u32,
    items: Vec<FreeBusyItem<'a>>,
}

#[derive(Debug, Serialize)]
struct FreeBusyItem<'a> {
    id: &'a str,
}

/// Response from the freeBusy endpoint.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FreeBusyResponse {
    /// Resolved calendars, keyed by calendar id.
    #[serde(default)]
    pub calendars: BTreeMap<String, FreeBusyCalendar>,
    /// Expansion result per requested group.
    #[serde(default)]
    pub groups: BTreeMap<String, FreeBusyGroup>,
}

/// Expansion result for one group.
#[derive(Debug, Default, Deserialize)]
pub struct FreeBusyGroup {
    #[serde(default)]
    pub calendars: Vec<String>,
    #[serde(default)]
    pub errors: Vec<FreeBusyError>,
}

impl FreeBusyGroup {
    /// Returns true if the provider does not know the group.
    pub fn is_not_found(&self) -> bool {
        self.errors.iter().any(FreeBusyError::is_not_found)
    }
}

/// Response from the events.list endpoint.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventListResponse {
    #[serde(default)]
    items: Vec<ApiEvent>,
    next_page_token: Option<String>,
}

/// A single event from the Google Calendar API.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiEvent {
    id: Option<String>,
    summary: Option<String>,
    #[serde(default)]
    start: ApiEventTime,
    #[serde(default)]
    end: ApiEventTime,
    status: Option<String>,
    event_type: Option<String>,
}

/// Event time from the API.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiEventTime {
    date: Option<String>,
    date_time: Option<String>,
}
