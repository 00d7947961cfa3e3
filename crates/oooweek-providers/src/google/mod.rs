//! Google Calendar provider implementation.
//!
//! This module provides a [`GoogleProvider`] that expands a group through
//! the free/busy API and lists out-of-office events with the Calendar API v3.
//!
//! # Authentication Flow
//!
//! 1. User provides their own OAuth client registration (required by Google)
//! 2. [`AuthFlow`] returns the cached credential if it is still valid
//! 3. Otherwise it binds a loopback listener on an ephemeral port
//! 4. Opens the browser to the consent page with a state nonce and PKCE challenge
//! 5. Google redirects to the loopback listener with the authorization code
//! 6. The code is exchanged for a credential, which is cached in the store
//!
//! # Example
//!
//! ```ignore
//! use oooweek_providers::google::{AuthFlow, GoogleConfig, GoogleProvider, OAuthCredentials};
//!
//! let registration = OAuthCredentials::parse_registration(&client_secret_json)?;
//! let config = GoogleConfig::default();
//! let flow = AuthFlow::from_config(store, SecretKeys::default(), registration, &config)?;
//!
//! let credential = flow.obtain_token(&cancel).await?;
//! let provider = GoogleProvider::new(&credential, &config)?;
//! ```

mod callback;
mod client;
mod config;
mod flow;
mod oauth;
mod provider;
mod tokens;

pub use callback::{CallbackError, CallbackServer, ResponderGuard};
pub use client::{FreeBusyGroup, FreeBusyResponse, GoogleCalendarClient};
pub use config::{GoogleConfig, OAuthCredentials};
pub use flow::{
    AuthError, AuthFlow, BrowserLauncher, Progress, StderrProgress, SystemBrowser,
    reset_credential, reset_registration,
};
pub use oauth::{OAuthClient, PkceFlow, TokenExchange, generate_state};
pub use provider::GoogleProvider;
pub use tokens::{Credential, load_cached};
