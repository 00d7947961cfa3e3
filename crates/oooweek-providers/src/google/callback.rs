//! One-shot loopback HTTP responder for the authorization redirect.
//!
//! The responder binds an ephemeral port on `127.0.0.1`, answers requests
//! until the `/callback` request arrives, reports its outcome over a oneshot
//! channel and exits. Stray requests (favicon, health checks) get a 404 and
//! do not end the wait. Each connection is read on its own task, so an idle
//! preconnected socket never delays the real redirect.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Path the provider redirects to.
pub const CALLBACK_PATH: &str = "/callback";

/// Time allowed for a single connection to send its request.
const CONNECTION_TIMEOUT: Duration = Duration::from_secs(10);

/// Upper bound on header lines read per request.
const MAX_HEADER_LINES: usize = 100;

const SUCCESS_PAGE: &str = "<html><body><h1>Authorization Successful</h1>\
    <p>You can close this window and return to the terminal.</p></body></html>";

const FAILURE_PAGE: &str = "<html><body><h1>Authorization Failed</h1>\
    <p>You can close this window.</p></body></html>";

const NOT_FOUND_PAGE: &str = "<html><body><h1>Not Found</h1></body></html>";

/// Why the callback did not yield a code.
#[derive(Debug, Error)]
pub enum CallbackError {
    #[error("callback state does not match the authorization request")]
    StateMismatch,
    #[error("callback carried no authorization code")]
    NoCodeReceived,
    #[error("authorization denied: {0}")]
    Denied(String),
    #[error("failed to accept connection: {0}")]
    Accept(#[source] io::Error),
}

/// Outcome reported by the responder.
pub type CallbackResult = Result<String, CallbackError>;

/// A bound, not yet serving, loopback listener.
#[derive(Debug)]
pub struct CallbackServer {
    listener: TcpListener,
    addr: SocketAddr,
}

impl CallbackServer {
    /// Binds `127.0.0.1` on a port chosen by the OS.
    pub async fn bind() -> io::Result<Self> {
        let listener = TcpListener::bind(("127.0.0.1", 0)).await?;
        let addr = listener.local_addr()?;
        debug!("bound loopback server on {}", addr);
        Ok(Self { listener, addr })
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// The redirect URI advertised in the authorization URL.
    pub fn redirect_uri(&self) -> String {
        format!("http://127.0.0.1:{}{}", self.addr.port(), CALLBACK_PATH)
    }

    /// Starts answering requests. The receiver yields exactly one outcome,
    /// unless the responder is stopped first.
    pub fn spawn(self, expected_state: String) -> (ResponderGuard, oneshot::Receiver<CallbackResult>) {
        let (tx, rx) = oneshot::channel();
        let cancel = CancellationToken::new();
        let task = tokio::spawn(serve(self.listener, expected_state, cancel.clone(), tx));
        (
            ResponderGuard {
                cancel,
                task: Some(task),
            },
            rx,
        )
    }
}

/// Owns the responder task.
///
/// [`stop`](Self::stop) tears it down in the background; dropping the guard
/// without stopping cancels and aborts it. Either way the listener closes
/// with the task.
#[derive(Debug)]
pub struct ResponderGuard {
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl ResponderGuard {
    pub fn stop(mut self) {
        if let Some(task) = self.task.take() {
            self.cancel.cancel();
            tokio::spawn(async move {
                if let Err(e) = task.await
                    && e.is_panic()
                {
                    warn!("callback responder panicked");
                }
            });
        }
    }
}

impl Drop for ResponderGuard {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            self.cancel.cancel();
            task.abort();
        }
    }
}

async fn serve(
    listener: TcpListener,
    expected_state: String,
    cancel: CancellationToken,
    tx: oneshot::Sender<CallbackResult>,
) {
    let expected_state: Arc<str> = expected_state.into();
    // Dropped with this future, which aborts any connection still reading.
    let mut connections = JoinSet::new();

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            Some(joined) = connections.join_next(), if !connections.is_empty() => {
                match joined {
                    Ok(Some(outcome)) => {
                        let _ = tx.send(outcome);
                        return;
                    }
                    Ok(None) => {}
                    Err(e) if e.is_panic() => warn!("callback connection handler panicked"),
                    Err(_) => {}
                }
            }
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    debug!("callback connection from {}", peer);
                    let expected_state = Arc::clone(&expected_state);
                    connections.spawn(async move {
                        let handled = tokio::time::timeout(
                            CONNECTION_TIMEOUT,
                            handle_connection(stream, &expected_state),
                        )
                        .await;
                        handled.unwrap_or_else(|_| {
                            debug!("connection from {} timed out", peer);
                            None
                        })
                    });
                }
                Err(e) => {
                    let _ = tx.send(Err(CallbackError::Accept(e)));
                    return;
                }
            },
        }
    }
}

/// Reads one request and answers it. Returns `None` when the request was
/// not the callback.
async fn handle_connection(stream: TcpStream, expected_state: &str) -> Option<CallbackResult> {
    let mut reader = BufReader::new(stream);
    let mut request_line = String::new();
    if reader.read_line(&mut request_line).await.is_err() {
        return None;
    }

    let mut header = String::new();
    for _ in 0..MAX_HEADER_LINES {
        header.clear();
        match reader.read_line(&mut header).await {
            Ok(0) | Err(_) => break,
            Ok(_) if header.trim_end().is_empty() => break,
            Ok(_) => {}
        }
    }

    let stream = reader.get_mut();

    // GET /callback?code=...&state=... HTTP/1.1
    let mut parts = request_line.split_whitespace();
    let (Some(method), Some(target)) = (parts.next(), parts.next()) else {
        return None;
    };
    let (path, query) = target.split_once('?').unwrap_or((target, ""));
    if method != "GET" || path != CALLBACK_PATH {
        debug!("ignoring request for {}", path);
        respond(stream, "404 Not Found", NOT_FOUND_PAGE).await;
        return None;
    }

    let outcome = parse_callback(query, expected_state);
    match &outcome {
        Ok(_) => respond(stream, "200 OK", SUCCESS_PAGE).await,
        Err(_) => respond(stream, "400 Bad Request", FAILURE_PAGE).await,
    }
    Some(outcome)
}

/// Interprets the callback query string.
fn parse_callback(query: &str, expected_state: &str) -> CallbackResult {
    let mut code = None;
    let mut state = None;
    let mut error = None;

    for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
        match key.as_ref() {
            "code" => code = Some(value.into_owned()),
            "state" => state = Some(value.into_owned()),
            "error" => error = Some(value.into_owned()),
            _ => {}
        }
    }

    if state.as_deref() != Some(expected_state) {
        return Err(CallbackError::StateMismatch);
    }
    if let Some(error) = error {
        return Err(CallbackError::Denied(error));
    }
    match code {
        Some(code) if !code.is_empty() => Ok(code),
        _ => Err(CallbackError::NoCodeReceived),
    }
}

async fn respond(stream: &mut TcpStream, status: &str, body: &str) {
    let response = format!(
        "HTTP/1.1 {}\r\nContent-Type: text/html; charset=utf-8\r\n\
        Content-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        body.len(),
        body
    );
    if let Err(e) = stream.write_all(response.as_bytes()).await {
        debug!("failed to write callback response: {}", e);
        return;
    }
    let _ = stream.flush().await;
    let _ = stream.shutdown().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    async fn get(port: u16, target: &str) -> String {
        let mut stream = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
        let request = format!("GET {} HTTP/1.1\r\nHost: 127.0.0.1:{}\r\n\r\n", target, port);
        stream.write_all(request.as_bytes()).await.unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        response
    }

    #[test]
    fn parse_callback_outcomes() {
        assert_eq!(parse_callback("code=abc&state=s1", "s1").unwrap(), "abc");
        assert_eq!(
            parse_callback("state=s1&code=4%2F0Ab", "s1").unwrap(),
            "4/0Ab"
        );
        assert!(matches!(
            parse_callback("code=abc&state=other", "s1"),
            Err(CallbackError::StateMismatch)
        ));
        assert!(matches!(
            parse_callback("code=abc", "s1"),
            Err(CallbackError::StateMismatch)
        ));
        assert!(matches!(
            parse_callback("error=access_denied&state=s1", "s1"),
            Err(CallbackError::Denied(reason)) if reason == "access_denied"
        ));
        assert!(matches!(
            parse_callback("state=s1", "s1"),
            Err(CallbackError::NoCodeReceived)
        ));
        assert!(matches!(
            parse_callback("state=s1&code=", "s1"),
            Err(CallbackError::NoCodeReceived)
        ));
    }

    #[tokio::test]
    async fn redirect_uri_uses_ephemeral_port() {
        let server = CallbackServer::bind().await.unwrap();
        assert_ne!(server.port(), 0);
        assert_eq!(
            server.redirect_uri(),
            format!("http://127.0.0.1:{}/callback", server.port())
        );
    }

    #[tokio::test]
    async fn ignores_stray_requests_until_callback() {
        let server = CallbackServer::bind().await.unwrap();
        let port = server.port();
        let (guard, rx) = server.spawn("nonce".to_string());

        let stray = get(port, "/favicon.ico").await;
        assert!(stray.starts_with("HTTP/1.1 404"));

        let ok = get(port, "/callback?state=nonce&code=the-code").await;
        assert!(ok.starts_with("HTTP/1.1 200"));
        assert!(ok.contains("Authorization Successful"));

        assert_eq!(rx.await.unwrap().unwrap(), "the-code");
        guard.stop();
    }

    #[tokio::test]
    async fn idle_connection_does_not_block_callback() {
        let server = CallbackServer::bind().await.unwrap();
        let port = server.port();
        let (guard, rx) = server.spawn("nonce".to_string());

        // A preconnected socket that never sends a request.
        let _idle = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        let ok = tokio::time::timeout(
            Duration::from_secs(2),
            get(port, "/callback?state=nonce&code=the-code"),
        )
        .await
        .unwrap();
        assert!(ok.starts_with("HTTP/1.1 200"));

        let outcome = tokio::time::timeout(Duration::from_secs(2), rx).await.unwrap();
        assert_eq!(outcome.unwrap().unwrap(), "the-code");
        guard.stop();
    }

    #[tokio::test]
    async fn mismatched_state_gets_400() {
        let server = CallbackServer::bind().await.unwrap();
        let port = server.port();
        let (_guard, rx) = server.spawn("nonce".to_string());

        let response = get(port, "/callback?state=forged&code=the-code").await;
        assert!(response.starts_with("HTTP/1.1 400"));
        assert!(matches!(rx.await.unwrap(), Err(CallbackError::StateMismatch)));
    }

    #[tokio::test]
    async fn dropping_guard_closes_listener() {
        let server = CallbackServer::bind().await.unwrap();
        let port = server.port();
        let (guard, rx) = server.spawn("nonce".to_string());
        drop(guard);

        // The sender is dropped with the aborted task.
        assert!(rx.await.is_err());
        assert!(TcpStream::connect(("127.0.0.1", port)).await.is_err());
    }
}
