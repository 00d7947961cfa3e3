//! oooweek CLI entry point.

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use oooweek_core::{TracingConfig, init_tracing};
use oooweek_providers::{CredentialStore, FileStore, KeyringStore, SecretKeys};
use tokio_util::sync::CancellationToken;

use oooweek_client::cli::Cli;
use oooweek_client::commands;
use oooweek_client::config::{ClientConfig, Settings};
use oooweek_client::error::{ClientError, ClientResult};
use oooweek_client::signals::SignalHandler;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let tracing_config = if cli.debug {
        TracingConfig::cli_debug()
    } else {
        TracingConfig::cli()
    };
    if let Err(e) = init_tracing(tracing_config) {
        eprintln!("warning: {}", e);
    }

    let signals = SignalHandler::new();
    let listener = signals.spawn_listener();

    let result = run(cli, signals.token()).await;

    signals.trigger_shutdown();
    let _ = listener.await;

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli, cancel: CancellationToken) -> ClientResult<()> {
    let config = match cli.config {
        Some(ref path) => ClientConfig::load_from(path),
        None => ClientConfig::load(),
    }
    .map_err(ClientError::Config)?;

    let settings = Settings::resolve(&cli, &config)?;
    let store: Arc<dyn CredentialStore> = match &settings.secrets_path {
        Some(path) => Arc::new(FileStore::new(path)),
        None => Arc::new(KeyringStore::new()),
    };
    let keys = SecretKeys::default();

    if cli.has_reset() {
        commands::auth::run_resets(&cli, store.as_ref(), &keys)?;
    }

    match settings.group.as_deref() {
        Some(group) => commands::ooo::run(&settings, group, store, keys, &cancel).await,
        None => Ok(()),
    }
}
