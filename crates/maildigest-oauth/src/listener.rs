//! One-shot loopback listener for the authorization redirect.
//!
//! The provider redirects the browser to `http://localhost:<port>/?code=...`.
//! The listener accepts that single request, answers with a short HTML page,
//! and hands the `code` back. The accept runs on its own task so the caller
//! can bound it with a timeout. The socket is released on every exit path,
//! including timeout, so the next attempt can bind the same port.

use std::time::Duration;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tracing::{debug, warn};
use url::Url;

use crate::error::{Error, Result};

/// Upper bound on the request line we are willing to read.
const MAX_REQUEST_LINE: u64 = 8 * 1024;

const SUCCESS_PAGE: &str = "HTTP/1.1 200 OK\r\n\
Content-Type: text/html; charset=utf-8\r\n\
Connection: close\r\n\
\r\n\
<!doctype html><html><body><h3>Authorization received.</h3>\
<p>You can close this window and return to the terminal.</p></body></html>";

/// A bound, not yet accepted, loopback listener.
#[derive(Debug)]
pub struct AuthorizationListener {
    listener: TcpListener,
}

impl AuthorizationListener {
    /// Binds `127.0.0.1:port`. Port `0` picks a free port.
    ///
    /// # Errors
    ///
    /// Returns an error if the port is unavailable.
    pub async fn bind(port: u16) -> Result<Self> {
        let listener = TcpListener::bind(("127.0.0.1", port)).await?;
        debug!(port, "authorization listener bound");
        Ok(Self { listener })
    }

    /// Port actually bound.
    ///
    /// # Errors
    ///
    /// Returns an error if the socket address cannot be read.
    pub fn local_port(&self) -> Result<u16> {
        Ok(self.listener.local_addr()?.port())
    }

    /// Waits for one redirect and returns its `code`.
    ///
    /// Returns `Ok(None)` if nothing arrives within `timeout`, or if the one
    /// request received carried no code. The listener is consumed either way.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AccessDenied`] if the redirect carried an `error`
    /// parameter, or an I/O error from the accepted connection.
    pub async fn wait_for_code(self, timeout: Duration) -> Result<Option<String>> {
        let (tx, rx) = oneshot::channel();
        let listener = self.listener;
        let worker = tokio::spawn(async move {
            // `accept_one` owns the listener; it is dropped before we report.
            let outcome = accept_one(listener).await;
            let _ = tx.send(outcome);
        });

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(outcome)) => {
                let _ = worker.await;
                outcome
            }
            Ok(Err(_)) => match worker.await {
                Err(e) => Err(Error::Listener(e.to_string())),
                Ok(()) => Err(Error::Listener("worker exited without a result".into())),
            },
            Err(_) => {
                worker.abort();
                // Wait for the abort so the socket is closed before returning.
                let _ = worker.await;
                debug!(timeout_secs = timeout.as_secs(), "no authorization redirect arrived");
                Ok(None)
            }
        }
    }
}

async fn accept_one(listener: TcpListener) -> Result<Option<String>> {
    let (stream, peer) = listener.accept().await?;
    drop(listener);
    debug!(%peer, "authorization redirect connection");

    let (read_half, mut write_half) = stream.into_split();
    let request = read_request(BufReader::new(read_half).take(MAX_REQUEST_LINE)).await;

    // The browser gets the page even when the request could not be read.
    write_half.write_all(SUCCESS_PAGE.as_bytes()).await?;
    write_half.shutdown().await?;

    parse_redirect(&request?)
}

/// Reads the request line, then drains the headers so closing the socket
/// does not reset the response.
async fn read_request<R: AsyncBufRead + Unpin>(mut reader: R) -> Result<String> {
    let mut request_line = String::new();
    reader.read_line(&mut request_line).await?;

    let mut header = String::new();
    while reader.read_line(&mut header).await? > 0 && !header.trim_end().is_empty() {
        header.clear();
    }
    Ok(request_line)
}

/// Extracts the `code` query parameter from an HTTP request line such as
/// `GET /?code=abc&scope=x HTTP/1.1`.
fn parse_redirect(request_line: &str) -> Result<Option<String>> {
    let Some(target) = request_line.split_whitespace().nth(1) else {
        warn!("malformed authorization redirect request");
        return Ok(None);
    };

    let base = Url::parse("http://localhost/")?;
    let url = base.join(target)?;

    let mut code = None;
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "code" => code = Some(value.into_owned()),
            "error" => {
                warn!(error = %value, "provider redirected with an error");
                return Err(Error::AccessDenied);
            }
            _ => {}
        }
    }
    Ok(code.filter(|c| !c.is_empty()))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tokio::net::TcpStream;

    #[test]
    fn test_parse_redirect_extracts_code() {
        let code = parse_redirect("GET /?code=4%2F0Ab&scope=mail HTTP/1.1\r\n").unwrap();
        assert_eq!(code.as_deref(), Some("4/0Ab"));
    }

    #[test]
    fn test_parse_redirect_without_code() {
        assert!(parse_redirect("GET /favicon.ico HTTP/1.1").unwrap().is_none());
        assert!(parse_redirect("").unwrap().is_none());
    }

    #[test]
    fn test_parse_redirect_error_is_access_denied() {
        let result = parse_redirect("GET /?error=access_denied HTTP/1.1");
        assert!(matches!(result, Err(Error::AccessDenied)));
    }

    #[tokio::test]
    async fn test_captures_code_and_answers() {
        let listener = AuthorizationListener::bind(0).await.unwrap();
        let port = listener.local_port().unwrap();

        let client = tokio::spawn(async move {
            let mut stream = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
            stream
                .write_all(b"GET /?code=abc HTTP/1.1\r\nHost: localhost\r\n\r\n")
                .await
                .unwrap();
            let mut body = String::new();
            stream.read_to_string(&mut body).await.unwrap();
            body
        });

        let code = listener
            .wait_for_code(Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(code.as_deref(), Some("abc"));

        let body = client.await.unwrap();
        assert!(body.starts_with("HTTP/1.1 200 OK"));
    }

    #[tokio::test]
    async fn test_timeout_returns_none_and_frees_port() {
        let listener = AuthorizationListener::bind(0).await.unwrap();
        let port = listener.local_port().unwrap();

        let code = listener
            .wait_for_code(Duration::from_millis(50))
            .await
            .unwrap();
        assert!(code.is_none());

        // The port must be free again for the next attempt.
        let again = AuthorizationListener::bind(port).await.unwrap();
        assert_eq!(again.local_port().unwrap(), port);
    }

    #[tokio::test]
    async fn test_unreadable_request_still_gets_page() {
        let listener = AuthorizationListener::bind(0).await.unwrap();
        let port = listener.local_port().unwrap();

        let client = tokio::spawn(async move {
            let mut stream = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
            stream.write_all(b"GET /?code=\xff\xfe HTTP/1.1\r\n").await.unwrap();
            let mut body = String::new();
            stream.read_to_string(&mut body).await.unwrap();
            body
        });

        let result = listener.wait_for_code(Duration::from_secs(5)).await;
        assert!(matches!(result, Err(Error::Io(_))));

        let body = client.await.unwrap();
        assert!(body.starts_with("HTTP/1.1 200 OK"));
    }
}
