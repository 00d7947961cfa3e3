//! Credential acquisition: cached token or loopback authorization.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{ProviderError, ProviderResult};
use crate::store::{CredentialStore, SecretKeys, StoreError, delete_if_present};

use super::callback::{CallbackError, CallbackServer};
use super::config::{GoogleConfig, OAuthCredentials};
use super::oauth::{OAuthClient, PkceFlow, TokenExchange};
use super::tokens::{self, Credential};

/// Why no credential could be obtained.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("authorization cancelled")]
    Cancelled,
    #[error("timed out waiting for the authorization callback")]
    TimedOut,
    #[error("callback state does not match the authorization request")]
    StateMismatch,
    #[error("callback carried no authorization code")]
    NoCodeReceived,
    #[error("authorization denied: {0}")]
    Denied(String),
    #[error("loopback listener failed: {0}")]
    Listener(#[source] io::Error),
    #[error("token exchange failed: {0}")]
    ExchangeFailed(#[source] ProviderError),
    #[error("failed to store credential: {0}")]
    StoreFailed(#[source] StoreError),
}

impl From<CallbackError> for AuthError {
    fn from(err: CallbackError) -> Self {
        match err {
            CallbackError::StateMismatch => Self::StateMismatch,
            CallbackError::NoCodeReceived => Self::NoCodeReceived,
            CallbackError::Denied(reason) => Self::Denied(reason),
            CallbackError::Accept(e) => Self::Listener(e),
        }
    }
}

/// Opens the authorization URL for the user.
pub trait BrowserLauncher: Send + Sync {
    fn open(&self, url: &str) -> io::Result<()>;
}

/// Opens URLs with the platform's default handler.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemBrowser;

impl BrowserLauncher for SystemBrowser {
    fn open(&self, url: &str) -> io::Result<()> {
        open::that(url)
    }
}

/// Receives user-facing progress lines while the browser flow runs.
pub trait Progress: Send + Sync {
    fn report(&self, message: &str);
}

/// Writes progress to stderr, keeping stdout for the report.
#[derive(Debug, Default, Clone, Copy)]
pub struct StderrProgress;

impl Progress for StderrProgress {
    fn report(&self, message: &str) {
        eprintln!("{}", message);
    }
}

/// Returns a usable credential, running the loopback flow when needed.
pub struct AuthFlow {
    store: Arc<dyn CredentialStore>,
    keys: SecretKeys,
    credentials: OAuthCredentials,
    scopes: Vec<String>,
    exchange: Arc<dyn TokenExchange>,
    browser: Arc<dyn BrowserLauncher>,
    progress: Arc<dyn Progress>,
    callback_timeout: Duration,
}

impl AuthFlow {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        keys: SecretKeys,
        credentials: OAuthCredentials,
        exchange: Arc<dyn TokenExchange>,
    ) -> Self {
        Self {
            store,
            keys,
            credentials,
            scopes: vec![GoogleConfig::DEFAULT_SCOPE.to_string()],
            exchange,
            browser: Arc::new(SystemBrowser),
            progress: Arc::new(StderrProgress),
            callback_timeout: Duration::from_secs(GoogleConfig::DEFAULT_CALLBACK_TIMEOUT_SECS),
        }
    }

    /// Builds a flow that exchanges codes at `credentials.token_uri`.
    pub fn from_config(
        store: Arc<dyn CredentialStore>,
        keys: SecretKeys,
        credentials: OAuthCredentials,
        config: &GoogleConfig,
    ) -> ProviderResult<Self> {
        let exchange = Arc::new(OAuthClient::new(credentials.clone(), config.timeout)?);
        Ok(Self::new(store, keys, credentials, exchange)
            .with_scopes(config.scopes.clone())
            .with_callback_timeout(config.callback_timeout))
    }

    pub fn with_scopes(mut self, scopes: Vec<String>) -> Self {
        self.scopes = scopes;
        self
    }

    pub fn with_browser(mut self, browser: Arc<dyn BrowserLauncher>) -> Self {
        self.browser = browser;
        self
    }

    pub fn with_progress(mut self, progress: Arc<dyn Progress>) -> Self {
        self.progress = progress;
        self
    }

    pub fn with_callback_timeout(mut self, timeout: Duration) -> Self {
        self.callback_timeout = timeout;
        self
    }

    /// Returns the cached credential if it is still valid, otherwise runs
    /// the authorization flow and caches the result.
    pub async fn obtain_token(&self, cancel: &CancellationToken) -> Result<Credential, AuthError> {
        if let Some(credential) = tokens::load_cached(self.store.as_ref(), &self.keys) {
            debug!("using cached credential");
            return Ok(credential);
        }

        let pkce = PkceFlow::new();
        let server = CallbackServer::bind().await.map_err(AuthError::Listener)?;
        let redirect_uri = server.redirect_uri();
        let (responder, outcome) = server.spawn(pkce.state.clone());

        let auth_url = pkce.build_auth_url(&self.credentials, &redirect_uri, &self.scopes);
        self.progress.report("Opening browser for authorization...");
        debug!("authorization URL: {}", auth_url);
        if let Err(e) = self.browser.open(&auth_url) {
            warn!("failed to open browser: {}", e);
            self.progress.report(&format!(
                "\nPlease open this URL in your browser:\n\n{}\n",
                auth_url
            ));
        }

        let code = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(AuthError::Cancelled),
            outcome = outcome => match outcome {
                Ok(result) => result?,
                Err(_) => {
                    return Err(AuthError::Listener(io::Error::other(
                        "callback responder stopped unexpectedly",
                    )));
                }
            },
            _ = tokio::time::sleep(self.callback_timeout) => return Err(AuthError::TimedOut),
        };

        self.progress
            .report("Authorization code received, exchanging for a token...");
        let credential = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(AuthError::Cancelled),
            result = self.exchange.exchange_code(&code, &pkce.verifier, &redirect_uri) => {
                result.map_err(AuthError::ExchangeFailed)?
            }
        };
        if credential.is_expired() {
            return Err(AuthError::ExchangeFailed(ProviderError::invalid_response(
                "token endpoint returned a token that is already expired",
            )));
        }

        tokens::save(self.store.as_ref(), &self.keys, &credential)
            .map_err(AuthError::StoreFailed)?;

        responder.stop();
        info!("authorization complete, credential cached");
        Ok(credential)
    }
}

/// Deletes the cached credential. Returns whether one existed.
pub fn reset_credential(store: &dyn CredentialStore, keys: &SecretKeys) -> Result<bool, StoreError> {
    delete_if_present(store, &keys.service, &keys.credential)
}

/// Deletes the client registration, then the cached credential. Returns
/// whether anything existed.
pub fn reset_registration(
    store: &dyn CredentialStore,
    keys: &SecretKeys,
) -> Result<bool, StoreError> {
    let registration = delete_if_present(store, &keys.service, &keys.registration)?;
    let credential = reset_credential(store, keys)?;
    Ok(registration || credential)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use chrono::Utc;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    use crate::provider::BoxFuture;
    use crate::store::MemoryStore;

    #[derive(Default)]
    struct FakeExchange {
        calls: AtomicUsize,
        codes: Mutex<Vec<String>>,
        expires_in: Option<i64>,
    }

    impl FakeExchange {
        fn expiring_in(secs: i64) -> Self {
            Self {
                expires_in: Some(secs),
                ..Default::default()
            }
        }
    }

    impl TokenExchange for FakeExchange {
        fn exchange_code<'a>(
            &'a self,
            code: &'a str,
            _verifier: &'a str,
            _redirect_uri: &'a str,
        ) -> BoxFuture<'a, ProviderResult<Credential>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.codes.lock().unwrap().push(code.to_string());
            let expires_in = self.expires_in.unwrap_or(3600);
            Box::pin(async move {
                Ok(Credential::issued_at(
                    Utc::now(),
                    format!("token-for-{}", code),
                    None,
                    Some(expires_in),
                    Some("Bearer".to_string()),
                ))
            })
        }
    }

    /// What the fake browser does once it is handed the authorization URL.
    #[derive(Clone, Copy)]
    enum Visit {
        /// Hit a stray path, then the callback with the right state.
        Approve,
        /// Hit the callback with a forged state.
        Forge,
        /// The user declines consent.
        Decline,
        /// The provider redirects without a code.
        Empty,
        /// Never visits.
        Idle,
    }

    struct FakeBrowser {
        visit: Visit,
        port: Mutex<Option<u16>>,
        stray_response: Arc<Mutex<Option<String>>>,
    }

    impl FakeBrowser {
        fn new(visit: Visit) -> Arc<Self> {
            Arc::new(Self {
                visit,
                port: Mutex::new(None),
                stray_response: Arc::new(Mutex::new(None)),
            })
        }

        fn port(&self) -> Option<u16> {
            *self.port.lock().unwrap()
        }
    }

    async fn get(port: u16, target: &str) -> String {
        let mut stream = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
        let request = format!("GET {} HTTP/1.1\r\nHost: 127.0.0.1\r\n\r\n", target);
        stream.write_all(request.as_bytes()).await.unwrap();
        let mut response = String::new();
        let _ = stream.read_to_string(&mut response).await;
        response
    }

    impl BrowserLauncher for FakeBrowser {
        fn open(&self, auth_url: &str) -> io::Result<()> {
            let parsed = url::Url::parse(auth_url).unwrap();
            let params: HashMap<String, String> = parsed.query_pairs().into_owned().collect();
            let redirect = url::Url::parse(&params["redirect_uri"]).unwrap();
            let port = redirect.port().unwrap();
            let state = params["state"].clone();
            *self.port.lock().unwrap() = Some(port);

            let query = match self.visit {
                Visit::Approve => format!("state={}&code=auth-code&scope=calendar", state),
                Visit::Forge => "state=forged&code=auth-code".to_string(),
                Visit::Decline => format!("error=access_denied&state={}", state),
                Visit::Empty => format!("state={}", state),
                Visit::Idle => return Ok(()),
            };
            let stray_response = Arc::clone(&self.stray_response);
            let approve = matches!(self.visit, Visit::Approve);
            tokio::spawn(async move {
                if approve {
                    let stray = get(port, "/favicon.ico").await;
                    *stray_response.lock().unwrap() = Some(stray);
                }
                get(port, &format!("/callback?{}", query)).await;
            });
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordedProgress(Mutex<Vec<String>>);

    impl Progress for RecordedProgress {
        fn report(&self, message: &str) {
            self.0.lock().unwrap().push(message.to_string());
        }
    }

    fn registration() -> OAuthCredentials {
        OAuthCredentials::new("test-client.apps.googleusercontent.com", "test-secret")
    }

    fn flow(
        store: Arc<MemoryStore>,
        exchange: Arc<FakeExchange>,
        browser: Arc<FakeBrowser>,
    ) -> AuthFlow {
        AuthFlow::new(store, SecretKeys::default(), registration(), exchange)
            .with_browser(browser)
            .with_callback_timeout(Duration::from_secs(5))
    }

    async fn assert_port_released(port: u16) {
        for _ in 0..50 {
            if TcpStream::connect(("127.0.0.1", port)).await.is_err() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("loopback port {} still accepting connections", port);
    }

    #[tokio::test]
    async fn cached_credential_skips_flow() {
        let store = Arc::new(MemoryStore::new());
        let keys = SecretKeys::default();
        let cached = Credential::issued_at(Utc::now(), "cached", None, Some(3600), None);
        tokens::save(store.as_ref(), &keys, &cached).unwrap();

        let exchange = Arc::new(FakeExchange::default());
        let browser = FakeBrowser::new(Visit::Idle);
        let flow = flow(Arc::clone(&store), Arc::clone(&exchange), Arc::clone(&browser));

        let credential = flow.obtain_token(&CancellationToken::new()).await.unwrap();
        assert_eq!(credential, cached);
        assert_eq!(exchange.calls.load(Ordering::SeqCst), 0);
        assert!(browser.port().is_none());
    }

    #[tokio::test]
    async fn expired_credential_runs_new_exchange() {
        let store = Arc::new(MemoryStore::new());
        let keys = SecretKeys::default();
        let expired = Credential::issued_at(
            Utc::now() - chrono::Duration::hours(2),
            "expired",
            None,
            Some(3600),
            None,
        );
        tokens::save(store.as_ref(), &keys, &expired).unwrap();

        let exchange = Arc::new(FakeExchange::default());
        let browser = FakeBrowser::new(Visit::Approve);
        let flow = flow(Arc::clone(&store), Arc::clone(&exchange), Arc::clone(&browser));

        let credential = flow.obtain_token(&CancellationToken::new()).await.unwrap();
        assert_eq!(credential.access_token, "token-for-auth-code");
        assert_eq!(exchange.calls.load(Ordering::SeqCst), 1);
        assert_eq!(*exchange.codes.lock().unwrap(), vec!["auth-code".to_string()]);

        let stored = tokens::load_cached(store.as_ref(), &keys).unwrap();
        assert_eq!(stored, credential);

        let stray = browser.stray_response.lock().unwrap().clone().unwrap();
        assert!(stray.starts_with("HTTP/1.1 404"));

        assert_port_released(browser.port().unwrap()).await;
    }

    #[tokio::test]
    async fn browser_flow_reports_progress() {
        let store = Arc::new(MemoryStore::new());
        let exchange = Arc::new(FakeExchange::default());
        let progress = Arc::new(RecordedProgress::default());
        let flow = flow(
            Arc::clone(&store),
            Arc::clone(&exchange),
            FakeBrowser::new(Visit::Approve),
        )
        .with_progress(Arc::clone(&progress) as Arc<dyn Progress>);

        flow.obtain_token(&CancellationToken::new()).await.unwrap();
        assert_eq!(
            *progress.0.lock().unwrap(),
            vec![
                "Opening browser for authorization...".to_string(),
                "Authorization code received, exchanging for a token...".to_string(),
            ]
        );

        // A second run uses the cached credential and stays quiet.
        let quiet = Arc::new(RecordedProgress::default());
        let flow = flow_with(store, exchange, Arc::clone(&quiet));
        flow.obtain_token(&CancellationToken::new()).await.unwrap();
        assert!(quiet.0.lock().unwrap().is_empty());
    }

    fn flow_with(
        store: Arc<MemoryStore>,
        exchange: Arc<FakeExchange>,
        progress: Arc<RecordedProgress>,
    ) -> AuthFlow {
        flow(store, exchange, FakeBrowser::new(Visit::Idle)).with_progress(progress)
    }

    #[tokio::test]
    async fn already_expired_token_is_rejected() {
        let store = Arc::new(MemoryStore::new());
        let exchange = Arc::new(FakeExchange::expiring_in(0));
        let browser = FakeBrowser::new(Visit::Approve);
        let flow = flow(Arc::clone(&store), Arc::clone(&exchange), Arc::clone(&browser));

        let err = flow.obtain_token(&CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, AuthError::ExchangeFailed(_)));
        assert_eq!(exchange.calls.load(Ordering::SeqCst), 1);
        assert!(tokens::load_cached(store.as_ref(), &SecretKeys::default()).is_none());

        assert_port_released(browser.port().unwrap()).await;
    }

    #[tokio::test]
    async fn short_lived_token_is_returned() {
        let store = Arc::new(MemoryStore::new());
        let exchange = Arc::new(FakeExchange::expiring_in(30));
        let browser = FakeBrowser::new(Visit::Approve);
        let flow = flow(Arc::clone(&store), Arc::clone(&exchange), Arc::clone(&browser));

        let credential = flow.obtain_token(&CancellationToken::new()).await.unwrap();
        assert!(!credential.is_expired());
    }

    #[tokio::test]
    async fn state_mismatch_never_exchanges() {
        let store = Arc::new(MemoryStore::new());
        let exchange = Arc::new(FakeExchange::default());
        let browser = FakeBrowser::new(Visit::Forge);
        let flow = flow(Arc::clone(&store), Arc::clone(&exchange), Arc::clone(&browser));

        let err = flow.obtain_token(&CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, AuthError::StateMismatch));
        assert_eq!(exchange.calls.load(Ordering::SeqCst), 0);
        assert!(tokens::load_cached(store.as_ref(), &SecretKeys::default()).is_none());
        assert_port_released(browser.port().unwrap()).await;
    }

    #[tokio::test]
    async fn denied_and_missing_code() {
        let exchange = Arc::new(FakeExchange::default());

        let declined = flow(
            Arc::new(MemoryStore::new()),
            Arc::clone(&exchange),
            FakeBrowser::new(Visit::Decline),
        );
        let err = declined
            .obtain_token(&CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Denied(reason) if reason == "access_denied"));

        let empty = flow(
            Arc::new(MemoryStore::new()),
            Arc::clone(&exchange),
            FakeBrowser::new(Visit::Empty),
        );
        let err = empty
            .obtain_token(&CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::NoCodeReceived));

        assert_eq!(exchange.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn times_out_without_callback() {
        let browser = FakeBrowser::new(Visit::Idle);
        let flow = flow(
            Arc::new(MemoryStore::new()),
            Arc::new(FakeExchange::default()),
            Arc::clone(&browser),
        )
        .with_callback_timeout(Duration::from_millis(100));

        let err = flow.obtain_token(&CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, AuthError::TimedOut));
        assert_port_released(browser.port().unwrap()).await;
    }

    #[tokio::test]
    async fn cancellation_interrupts_wait() {
        let browser = FakeBrowser::new(Visit::Idle);
        let flow = flow(
            Arc::new(MemoryStore::new()),
            Arc::new(FakeExchange::default()),
            Arc::clone(&browser),
        );

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let err = flow.obtain_token(&cancel).await.unwrap_err();
        assert!(matches!(err, AuthError::Cancelled));
        assert_port_released(browser.port().unwrap()).await;
    }

    #[test]
    fn resets_are_idempotent() {
        let store = MemoryStore::new();
        let keys = SecretKeys::default();
        store.set(&keys.service, &keys.registration, "{}").unwrap();
        store.set(&keys.service, &keys.credential, "{}").unwrap();

        assert!(reset_credential(&store, &keys).unwrap());
        assert!(!reset_credential(&store, &keys).unwrap());
        assert!(store.get(&keys.service, &keys.registration).is_ok());

        store.set(&keys.service, &keys.credential, "{}").unwrap();
        assert!(reset_registration(&store, &keys).unwrap());
        assert!(store.get(&keys.service, &keys.registration).unwrap_err().is_not_found());
        assert!(store.get(&keys.service, &keys.credential).unwrap_err().is_not_found());
        assert!(!reset_registration(&store, &keys).unwrap());
    }
}
