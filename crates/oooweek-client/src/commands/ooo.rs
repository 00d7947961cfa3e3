//! The weekly out-of-office report.

use std::sync::Arc;

use chrono::{Duration, Utc};
use oooweek_core::{GridOptions, QueryWindow, render, render_text};
use oooweek_providers::google::{AuthFlow, GoogleProvider};
use oooweek_providers::{Aggregator, CalendarProvider, CredentialStore, MemberFailure, SecretKeys};
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::auth::ensure_registration;
use crate::config::Settings;
use crate::error::{ClientError, ClientResult};

/// A rendered table plus the members that could not be read.
#[derive(Debug)]
pub struct Report {
    pub table: String,
    pub failures: Vec<MemberFailure>,
}

/// Authorizes, fetches and prints the report for `group`.
///
/// Member failures go to stderr as warnings; the table goes to stdout.
pub async fn run(
    settings: &Settings,
    group: &str,
    store: Arc<dyn CredentialStore>,
    keys: SecretKeys,
    cancel: &CancellationToken,
) -> ClientResult<()> {
    let registration = ensure_registration(store.as_ref(), &keys, cancel).await?;
    let google = settings.google_config();

    let credential = AuthFlow::from_config(store, keys, registration, &google)?
        .obtain_token(cancel)
        .await?;
    let provider = GoogleProvider::new(&credential, &google)?;

    let window = QueryWindow::weeks_ahead(Utc::now(), settings.weeks, settings.timezone)
        .map_err(|e| ClientError::Config(e.to_string()))?;
    info!(
        group = %group,
        from = %window.first_day(),
        to = %window.last_day(),
        timezone = window.timezone_name(),
        "collecting OOO events"
    );

    let report = build_report(
        Arc::new(provider),
        group,
        &window,
        settings.min_duration,
        cancel,
    )
    .await?;

    for failure in &report.failures {
        eprintln!("warning: {}", failure);
    }
    print!("{}", report.table);
    Ok(())
}

/// Collects events for `group` through `provider` and renders the table.
pub async fn build_report(
    provider: Arc<dyn CalendarProvider>,
    group: &str,
    window: &QueryWindow,
    min_duration: Duration,
    cancel: &CancellationToken,
) -> ClientResult<Report> {
    let collected = Aggregator::new(provider)
        .collect_ooo(cancel, group, window, min_duration)
        .await?;

    let blocks = render(&collected.events, window);
    Ok(Report {
        table: render_text(&blocks, &GridOptions::default()),
        failures: collected.failures,
    })
}
