//! Single-shot local HTTP listener for the OAuth redirect.
//!
//! Binds a TCP listener on `127.0.0.1:<port>`, waits for the identity
//! provider to redirect the browser back, answers with a static confirmation
//! page, and hands the raw callback URL to the caller. Connections are read
//! concurrently and the first complete request line wins; the listener and
//! every other connection are dropped at that point, so a second request is
//! never served.

use std::{collections::HashMap, time::Duration};
use tokio::io::{AsyncBufReadExt as _, AsyncReadExt as _, AsyncWriteExt as _, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio::task::{JoinHandle, JoinSet};
use wifassist_types::{WifError, traits::Result};

const MAX_REQUEST_LINE: u64 = 8192;

const SUCCESS_HTML: &[u8] =
    b"HTTP/1.1 200 OK\r\nContent-Type: text/html\r\nConnection: close\r\n\r\n\
    <html><body><h1>Login successful!</h1>\
    <p>You can close this window and return to the terminal.</p></body></html>";

/// The raw URL of the one redirect a login attempt produces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackEvent {
    url: String,
}

impl CallbackEvent {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }

    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Decoded query parameters of the callback URL.
    ///
    /// # Errors
    ///
    /// Returns [`WifError::Auth`] if the query string is not valid form encoding.
    pub fn query_params(&self) -> Result<HashMap<String, String>> {
        let without_fragment = self.url.split('#').next().unwrap_or_default();
        let query = without_fragment.split_once('?').map_or("", |(_, q)| q);
        serde_urlencoded::from_str(query)
            .map_err(|e| WifError::Auth(format!("invalid callback query params: {e}")))
    }

    /// The `code` query parameter.
    ///
    /// # Errors
    ///
    /// Returns [`WifError::Auth`] if the provider reported an error or the
    /// callback carries no code.
    pub fn authorization_code(&self) -> Result<String> {
        let mut params = self.query_params()?;
        if let Some(error) = params.remove("error") {
            let description = params.remove("error_description").unwrap_or_default();
            return Err(WifError::Auth(format!(
                "identity provider returned {error}: {description}"
            )));
        }
        params
            .remove("code")
            .filter(|c| !c.is_empty())
            .ok_or_else(|| WifError::Auth("missing code parameter in callback".into()))
    }
}

/// A bound, not yet serving, redirect listener.
///
/// Bind **before** opening the browser so the redirect cannot race the
/// listener.
#[derive(Debug)]
pub struct RedirectCapture {
    listener: TcpListener,
    port: u16,
}

impl RedirectCapture {
    /// Bind the local callback port.
    ///
    /// # Errors
    ///
    /// Returns [`WifError::Listener`] if the port is already in use or cannot
    /// be bound. Binding is never retried.
    pub async fn bind(port: u16) -> Result<Self> {
        let addr = format!("127.0.0.1:{port}");
        let listener = TcpListener::bind(&addr).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::AddrInUse {
                WifError::Listener(format!(
                    "port {port} is already in use; stop the process holding it \
                     (`lsof -i :{port}`) and try again"
                ))
            } else {
                WifError::Listener(format!("cannot bind callback port {port}: {e}"))
            }
        })?;
        let port = listener
            .local_addr()
            .map_err(|e| WifError::Listener(e.to_string()))?
            .port();
        Ok(Self { listener, port })
    }

    /// The port actually bound (differs from the requested one when it was 0).
    #[must_use]
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Start serving on a background task; the result arrives through the
    /// returned [`PendingRedirect`].
    #[must_use]
    pub fn spawn(self, timeout: Duration) -> PendingRedirect {
        let (tx, rx) = oneshot::channel();
        let port = self.port;
        let task = tokio::spawn(async move {
            let result = tokio::time::timeout(timeout, serve_one(self.listener, port))
                .await
                .unwrap_or_else(|_| {
                    Err(WifError::Listener(format!(
                        "timed out after {}s waiting for the login redirect",
                        timeout.as_secs()
                    )))
                });
            let _ = tx.send(result);
        });
        tracing::debug!(port, "redirect listener started");
        PendingRedirect { rx, task }
    }

    /// Serve until exactly one redirect arrives or `timeout` elapses.
    ///
    /// # Errors
    ///
    /// Returns [`WifError::Listener`] on accept/read failure or timeout.
    pub async fn accept_one(self, timeout: Duration) -> Result<CallbackEvent> {
        self.spawn(timeout).wait().await
    }
}

/// Bind `port`, wait for one redirect, and return its URL.
///
/// Convenience wrapper around [`RedirectCapture::bind`] +
/// [`RedirectCapture::accept_one`] for callers that do not need to bind early.
///
/// # Errors
///
/// Returns [`WifError::Listener`] if binding or accepting fails, or on timeout.
pub async fn await_one_redirect(port: u16, timeout: Duration) -> Result<CallbackEvent> {
    RedirectCapture::bind(port).await?.accept_one(timeout).await
}

/// Handle to a redirect listener running on its own task.
///
/// Dropping the handle (or calling [`cancel`](Self::cancel)) stops the
/// listener and releases the port.
#[derive(Debug)]
pub struct PendingRedirect {
    rx: oneshot::Receiver<Result<CallbackEvent>>,
    task: JoinHandle<()>,
}

impl PendingRedirect {
    /// Wait for the captured redirect.
    ///
    /// # Errors
    ///
    /// Returns [`WifError::Listener`] if the listener failed, timed out, or
    /// was stopped.
    pub async fn wait(mut self) -> Result<CallbackEvent> {
        match (&mut self.rx).await {
            Ok(result) => result,
            Err(_) => Err(WifError::Listener(
                "redirect listener stopped before a callback arrived".into(),
            )),
        }
    }

    /// Stop listening without waiting for a redirect.
    pub fn cancel(self) {
        self.task.abort();
    }
}

impl Drop for PendingRedirect {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn serve_one(listener: TcpListener, port: u16) -> Result<CallbackEvent> {
    // Browsers open speculative connections that stay idle or close without
    // a request, so no single connection may block the others.
    let mut readers = JoinSet::new();
    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, peer) =
                    accepted.map_err(|e| WifError::Listener(e.to_string()))?;
                readers.spawn(async move { (peer, read_request_line(stream).await) });
            }
            Some(joined) = readers.join_next() => {
                let Ok((peer, read)) = joined else { continue };
                let Some((mut stream, line)) = read? else {
                    tracing::debug!(%peer, "ignoring empty connection");
                    continue;
                };
                let target = request_target(&line)?;

                stream
                    .write_all(SUCCESS_HTML)
                    .await
                    .map_err(|e| WifError::Listener(format!("write error: {e}")))?;
                let _ = stream.shutdown().await;

                tracing::debug!(%peer, "login redirect captured");
                return Ok(CallbackEvent::new(format!("http://localhost:{port}{target}")));
            }
        }
    }
}

/// Read up to the first line break. `None` when the peer went away without
/// sending anything usable.
async fn read_request_line(stream: TcpStream) -> Result<Option<(TcpStream, String)>> {
    let mut reader = BufReader::new(stream);
    let mut line = String::new();
    let n = match (&mut reader)
        .take(MAX_REQUEST_LINE)
        .read_line(&mut line)
        .await
    {
        Ok(n) => n,
        Err(e) => {
            tracing::debug!(error = %e, "connection dropped before a request line");
            return Ok(None);
        }
    };
    if n == 0 {
        return Ok(None);
    }
    if !line.ends_with('\n') {
        return Err(WifError::Listener(format!(
            "request line not terminated after {n} bytes (limit {MAX_REQUEST_LINE})"
        )));
    }
    Ok(Some((reader.into_inner(), line)))
}

fn request_target(request: &str) -> Result<&str> {
    // First line format: "GET /auth/callback?code=...&state=... HTTP/1.1"
    let first_line = request.lines().next().unwrap_or("");
    first_line
        .split_ascii_whitespace()
        .nth(1)
        .filter(|t| t.starts_with('/'))
        .ok_or_else(|| WifError::Listener(format!("malformed request line: {first_line:?}")))
}
