//! OAuth 2.0 authorization-code exchange with PKCE.
//!
//! [`PkceFlow`] holds the per-attempt secrets (state nonce, code verifier and
//! its S256 challenge) and builds the authorization URL. [`TokenExchange`] is
//! the seam used by [`AuthFlow`](super::flow::AuthFlow) to trade the code for
//! a [`Credential`]; [`OAuthClient`] implements it against the token endpoint.

use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::Utc;
use rand::Rng as _;
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::error::{ProviderError, ProviderResult};
use crate::provider::BoxFuture;

use super::config::OAuthCredentials;
use super::tokens::Credential;

/// The PKCE code verifier length (in bytes, before base64 encoding).
const CODE_VERIFIER_LENGTH: usize = 32;

/// The state nonce length (in bytes, before base64 encoding).
const STATE_LENGTH: usize = 32;

/// PKCE flow state and utilities.
///
/// Implements RFC 7636 (Proof Key for Code Exchange).
#[derive(Debug, Clone)]
pub struct PkceFlow {
    /// The code verifier (high-entropy random string).
    pub verifier: String,
    /// The code challenge (SHA-256 hash of verifier, base64url encoded).
    pub challenge: String,
    /// Random state for CSRF protection. Used for a single attempt.
    pub state: String,
}

impl PkceFlow {
    /// Creates a new PKCE flow with random verifier and state.
    pub fn new() -> Self {
        let verifier = random_token(CODE_VERIFIER_LENGTH);
        let challenge = Self::compute_challenge(&verifier);
        let state = generate_state();

        Self {
            verifier,
            challenge,
            state,
        }
    }

    /// Computes the SHA-256 challenge for a code verifier.
    fn compute_challenge(verifier: &str) -> String {
        let digest = Sha256::digest(verifier.as_bytes());
        URL_SAFE_NO_PAD.encode(digest)
    }

    /// Builds the authorization URL for `credentials.auth_uri`.
    pub fn build_auth_url(
        &self,
        credentials: &OAuthCredentials,
        redirect_uri: &str,
        scopes: &[String],
    ) -> String {
        let scope = scopes.join(" ");
        let separator = if credentials.auth_uri.contains('?') { '&' } else { '?' };

        format!(
            "{}{}client_id={}&redirect_uri={}&response_type=code&scope={}&\
            code_challenge={}&code_challenge_method=S256&state={}&\
            access_type=offline&prompt=consent",
            credentials.auth_uri,
            separator,
            urlencoding::encode(&credentials.client_id),
            urlencoding::encode(redirect_uri),
            urlencoding::encode(&scope),
            urlencoding::encode(&self.challenge),
            urlencoding::encode(&self.state),
        )
    }
}

impl Default for PkceFlow {
    fn default() -> Self {
        Self::new()
    }
}

/// Generates a random state nonce: 256 bits, URL-safe base64 without padding.
pub fn generate_state() -> String {
    random_token(STATE_LENGTH)
}

fn random_token(len: usize) -> String {
    let mut rng = rand::rng();
    let bytes: Vec<u8> = (0..len).map(|_| rng.random()).collect();
    URL_SAFE_NO_PAD.encode(&bytes)
}

/// Trades an authorization code for a credential.
pub trait TokenExchange: Send + Sync {
    /// Exchanges `code` (obtained with `verifier`'s challenge) for a credential.
    fn exchange_code<'a>(
        &'a self,
        code: &'a str,
        verifier: &'a str,
        redirect_uri: &'a str,
    ) -> BoxFuture<'a, ProviderResult<Credential>>;
}

/// Token endpoint client.
#[derive(Debug)]
pub struct OAuthClient {
    credentials: OAuthCredentials,
    http_client: reqwest::Client,
}

impl OAuthClient {
    /// Creates a new OAuth client with the given credentials.
    pub fn new(credentials: OAuthCredentials, timeout: Duration) -> ProviderResult<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| {
                ProviderError::internal(format!("failed to create HTTP client: {}", e))
            })?;

        Ok(Self {
            credentials,
            http_client,
        })
    }

    async fn request_token(
        &self,
        code: &str,
        verifier: &str,
        redirect_uri: &str,
    ) -> ProviderResult<Credential> {
        let params = [
            ("client_id", self.credentials.client_id.as_str()),
            ("client_secret", self.credentials.client_secret.as_str()),
            ("code", code),
            ("code_verifier", verifier),
            ("grant_type", "authorization_code"),
            ("redirect_uri", redirect_uri),
        ];

        debug!("exchanging authorization code at {}", self.credentials.token_uri);
        let response = self
            .http_client
            .post(&self.credentials.token_uri)
            .form(&params)
            .send()
            .await
            .map_err(|e| {
                ProviderError::network(format!("token exchange request failed: {}", e))
                    .with_source(e)
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ProviderError::network(format!("failed to read response: {}", e)))?;

        if !status.is_success() {
            return Err(ProviderError::authentication(format!(
                "token exchange failed ({}): {}",
                status, body
            )));
        }

        let token_response: TokenResponse = serde_json::from_str(&body).map_err(|e| {
            ProviderError::invalid_response(format!("invalid token response: {}", e))
        })?;

        info!("obtained access token");
        Ok(token_response.into_credential())
    }
}

impl TokenExchange for OAuthClient {
    fn exchange_code<'a>(
        &'a self,
        code: &'a str,
        verifier: &'a str,
        redirect_uri: &'a str,
    ) -> BoxFuture<'a, ProviderResult<Credential>> {
        Box::pin(self.request_token(code, verifier, redirect_uri))
    }
}

/// Response from the token endpoint.
#[derive(Debug, serde::Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    token_type: Option<String>,
}

impl TokenResponse {
    fn into_credential(self) -> Credential {
        Credential::issued_at(
            Utc::now(),
            self.access_token,
            self.refresh_token,
            self.expires_in,
            self.token_type,
        )
    }
}
