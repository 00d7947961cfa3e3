//! Google Calendar provider configuration.

use std::time::Duration;

use serde::Deserialize;

/// Google OAuth endpoints.
pub const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
pub const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

/// Base URL for Google Calendar API v3.
pub const CALENDAR_API_BASE: &str = "https://www.googleapis.com/calendar/v3";

/// OAuth 2.0 client registration for Google API access.
///
/// Users must provide their own OAuth client, as Google requires registered
/// applications for API access. This is the content of the
/// `client_secret.json` downloaded from the Google Cloud Console.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OAuthCredentials {
    /// The OAuth 2.0 client ID from Google Cloud Console.
    pub client_id: String,
    /// The OAuth 2.0 client secret from Google Cloud Console.
    pub client_secret: String,
    /// Authorization endpoint.
    pub auth_uri: String,
    /// Token endpoint.
    pub token_uri: String,
}

/// Structure of Google's OAuth credentials JSON file.
///
/// Supports multiple formats:
/// 1. Google Cloud Console format with "installed" or "web" section
/// 2. Flat format with client_id and client_secret at root level (e.g., from gcloud)
#[derive(Debug, Deserialize)]
struct GoogleCredentialsFile {
    installed: Option<NestedCredentials>,
    web: Option<NestedCredentials>,
    client_id: Option<String>,
    client_secret: Option<String>,
    auth_uri: Option<String>,
    token_uri: Option<String>,
}

/// OAuth credentials within a nested section of the credentials JSON file.
#[derive(Debug, Deserialize)]
struct NestedCredentials {
    client_id: String,
    client_secret: String,
    auth_uri: Option<String>,
    token_uri: Option<String>,
}

impl OAuthCredentials {
    /// Creates new OAuth credentials using Google's default endpoints.
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            auth_uri: GOOGLE_AUTH_URL.to_string(),
            token_uri: GOOGLE_TOKEN_URL.to_string(),
        }
    }

    /// Builder method to override the endpoints.
    pub fn with_endpoints(mut self, auth_uri: impl Into<String>, token_uri: impl Into<String>) -> Self {
        self.auth_uri = auth_uri.into();
        self.token_uri = token_uri.into();
        self
    }

    /// Parses OAuth credentials from a Google credentials JSON string.
    ///
    /// Supports multiple formats:
    /// 1. Google Cloud Console format: `{"installed": {"client_id": "...", "client_secret": "..."}}`
    /// 2. Flat format: `{"client_id": "...", "client_secret": "..."}`
    ///
    /// Endpoints absent from the file default to Google's.
    pub fn from_json(json: &str) -> Result<Self, String> {
        let file: GoogleCredentialsFile = serde_json::from_str(json)
            .map_err(|e| format!("failed to parse credentials JSON: {}", e))?;

        let (client_id, client_secret, auth_uri, token_uri) = if let Some(creds) =
            file.installed.or(file.web)
        {
            (creds.client_id, creds.client_secret, creds.auth_uri, creds.token_uri)
        } else if let (Some(client_id), Some(client_secret)) = (file.client_id, file.client_secret)
        {
            (client_id, client_secret, file.auth_uri, file.token_uri)
        } else {
            return Err("credentials file must contain 'installed'/'web' section or 'client_id'/'client_secret' at root level".to_string());
        };

        let mut credentials = Self::new(client_id, client_secret);
        if let Some(auth_uri) = auth_uri.filter(|u| !u.is_empty()) {
            credentials.auth_uri = auth_uri;
        }
        if let Some(token_uri) = token_uri.filter(|u| !u.is_empty()) {
            credentials.token_uri = token_uri;
        }
        Ok(credentials)
    }

    /// Parses and validates credentials in one step.
    pub fn parse_registration(json: &str) -> Result<Self, String> {
        let credentials = Self::from_json(json)?;
        credentials
            .validate()
            .map_err(|e| format!("invalid credentials: {}", e))?;
        Ok(credentials)
    }

    /// Validates that the credentials appear to be correctly formatted.
    ///
    /// This checks that:
    /// - Client ID ends with `.apps.googleusercontent.com`
    /// - Client secret is non-empty
    /// - Both endpoints are absolute URLs
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.client_id.is_empty() {
            return Err("client_id is required");
        }
        if !self.client_id.ends_with(".apps.googleusercontent.com") {
            return Err("client_id should end with .apps.googleusercontent.com");
        }
        if self.client_secret.is_empty() {
            return Err("client_secret is required");
        }
        if url::Url::parse(&self.auth_uri).is_err() {
            return Err("auth_uri is not a valid URL");
        }
        if url::Url::parse(&self.token_uri).is_err() {
            return Err("token_uri is not a valid URL");
        }
        Ok(())
    }
}

/// Configuration for the Google Calendar provider.
#[derive(Debug, Clone)]
pub struct GoogleConfig {
    /// Calendar API base URL.
    pub api_base: String,

    /// Request timeout.
    pub timeout: Duration,

    /// How long to wait for the browser to hit the loopback callback.
    pub callback_timeout: Duration,

    /// User agent string for API requests.
    pub user_agent: String,

    /// OAuth scopes to request.
    ///
    /// Defaults to `["https://www.googleapis.com/auth/calendar.readonly"]`.
    pub scopes: Vec<String>,
}

impl Default for GoogleConfig {
    fn default() -> Self {
        Self {
            api_base: CALENDAR_API_BASE.to_string(),
            timeout: Duration::from_secs(Self::DEFAULT_TIMEOUT_SECS),
            callback_timeout: Duration::from_secs(Self::DEFAULT_CALLBACK_TIMEOUT_SECS),
            user_agent: format!("oooweek/{}", env!("CARGO_PKG_VERSION")),
            scopes: vec![Self::DEFAULT_SCOPE.to_string()],
        }
    }
}

impl GoogleConfig {
    /// Default timeout in seconds.
    pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

    /// Default callback timeout in seconds.
    pub const DEFAULT_CALLBACK_TIMEOUT_SECS: u64 = 300;

    /// Default OAuth scope for read-only calendar access.
    pub const DEFAULT_SCOPE: &'static str = "https://www.googleapis.com/auth/calendar.readonly";

    /// Sets the API base URL.
    pub fn with_api_base(mut self, base: impl Into<String>) -> Self {
        self.api_base = base.into();
        self
    }

    /// Sets the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the callback timeout.
    pub fn with_callback_timeout(mut self, timeout: Duration) -> Self {
        self.callback_timeout = timeout;
        self
    }

    /// Sets the OAuth scopes.
    pub fn with_scopes(mut self, scopes: Vec<String>) -> Self {
        self.scopes = scopes;
        self
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.scopes.is_empty() {
            return Err("at least one OAuth scope is required".to_string());
        }
        if self.timeout.is_zero() || self.callback_timeout.is_zero() {
            return Err("timeouts must be greater than zero".to_string());
        }
        url::Url::parse(&self.api_base).map_err(|e| format!("invalid API base URL: {}", e))?;
        Ok(())
    }
}
