//! Client registration setup and secret resets.

use std::io::{self, BufRead};

use oooweek_providers::google::{OAuthCredentials, reset_credential, reset_registration};
use oooweek_providers::{CredentialStore, SecretKeys};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::cli::Cli;
use crate::error::{ClientError, ClientResult};

const SETUP_INSTRUCTIONS: &str = "\
First time setup. Please provide your Google OAuth client registration:
1. Go to https://console.cloud.google.com
2. Create a new project or select an existing one
3. Enable the Google Calendar API
4. Under Credentials, create an OAuth 2.0 Client ID of type \"Desktop app\"
5. Download the client secret JSON file

Paste the contents of your client_secret.json file on one line and press Enter:";

/// Returns the stored client registration, asking for one on stdin if the
/// store has none.
pub async fn ensure_registration(
    store: &dyn CredentialStore,
    keys: &SecretKeys,
    cancel: &CancellationToken,
) -> ClientResult<OAuthCredentials> {
    ensure_registration_with(store, keys, cancel, read_stdin_line).await
}

/// Same as [`ensure_registration`], reading the registration with `read`.
pub async fn ensure_registration_with<F>(
    store: &dyn CredentialStore,
    keys: &SecretKeys,
    cancel: &CancellationToken,
    read: F,
) -> ClientResult<OAuthCredentials>
where
    F: FnOnce() -> io::Result<String> + Send + 'static,
{
    match store.get(&keys.service, &keys.registration) {
        Ok(stored) => {
            debug!("using stored client registration");
            return OAuthCredentials::parse_registration(&stored).map_err(|e| {
                ClientError::Config(format!(
                    "stored client registration is unusable ({}), run with --reset-secret",
                    e
                ))
            });
        }
        Err(e) if e.is_not_found() => {}
        Err(e) => return Err(e.into()),
    }

    eprintln!("{}", SETUP_INSTRUCTIONS);
    let input = read_line_detached(read, cancel).await?;
    let input = input.trim();
    if input.is_empty() {
        return Err(ClientError::Config(
            "no client registration was provided".to_string(),
        ));
    }

    let credentials = OAuthCredentials::parse_registration(input).map_err(|e| {
        ClientError::Config(format!(
            "{}, make sure you pasted the entire client_secret.json file",
            e
        ))
    })?;

    store.set(&keys.service, &keys.registration, input)?;
    info!("stored client registration");
    Ok(credentials)
}

/// Runs a blocking `read` on a detached thread and waits for it unless
/// `cancel` fires first.
///
/// The thread is never joined: a read blocked on stdin must not keep the
/// process alive after cancellation.
async fn read_line_detached<F>(read: F, cancel: &CancellationToken) -> ClientResult<String>
where
    F: FnOnce() -> io::Result<String> + Send + 'static,
{
    let (tx, rx) = oneshot::channel();
    std::thread::Builder::new()
        .name("oooweek-stdin".to_string())
        .spawn(move || {
            let _ = tx.send(read());
        })
        .map_err(|e| ClientError::Config(format!("failed to read input: {}", e)))?;

    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(ClientError::Config(
            "interrupted while waiting for the client registration".to_string(),
        )),
        result = rx => match result {
            Ok(Ok(line)) => Ok(line),
            Ok(Err(e)) => Err(ClientError::Config(format!("failed to read input: {}", e))),
            Err(_) => Err(ClientError::Config("input reader stopped unexpectedly".to_string())),
        },
    }
}

fn read_stdin_line() -> io::Result<String> {
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    Ok(line)
}

/// Applies the reset flags and prints what was deleted.
pub fn run_resets(cli: &Cli, store: &dyn CredentialStore, keys: &SecretKeys) -> ClientResult<()> {
    if let Some(line) = apply_resets(cli.reset_secret, cli.reset_token, store, keys)? {
        println!("{}", line);
    }
    Ok(())
}

/// Deletes the secrets selected by the flags. Resetting the registration
/// also resets the token.
pub fn apply_resets(
    reset_secret: bool,
    reset_token: bool,
    store: &dyn CredentialStore,
    keys: &SecretKeys,
) -> ClientResult<Option<&'static str>> {
    let line = if reset_secret {
        if reset_registration(store, keys)? {
            "Client registration and OAuth token have been reset."
        } else {
            "No stored client registration or OAuth token."
        }
    } else if reset_token {
        if reset_credential(store, keys)? {
            "OAuth token has been reset."
        } else {
            "No stored OAuth token."
        }
    } else {
        return Ok(None);
    };
    Ok(Some(line))
}
