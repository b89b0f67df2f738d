//! Local HTTP listener that stands in for the browser page during login.
//!
//! The backend redirects the browser to `http://127.0.0.1:<port>/?code=...`.
//! We answer that request with a short HTML page and hand its target back so
//! bootstrap can pick the code out of it. Browsers also open idle preconnect
//! sockets and ask for `/favicon.ico`; those connections are skipped.

use std::time::Duration;

use anyhow::{Context, Result};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use forwardkey_core::bootstrap::authorization_code;
use tokio::net::{TcpListener, TcpStream};
use tracing::debug;

/// How long to wait for the browser to come back.
const TIMEOUT_SECS: u64 = 120;

/// How long a connection may stay silent before it is dropped.
const READ_TIMEOUT: Duration = Duration::from_secs(2);

const REQUEST_BUFFER_SIZE: usize = 8192;

const RETURN_HTML: &[u8] =
    b"HTTP/1.1 200 OK\r\nContent-Type: text/html\r\nConnection: close\r\n\r\n\
    <html><body><h1>forwardkey</h1><p>Return to the terminal to finish signing in.</p></body></html>";

const NOT_FOUND: &[u8] =
    b"HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n";

/// Bind the callback port. Do this before opening the browser so the
/// redirect cannot arrive before anyone is listening.
pub async fn bind(port: u16) -> Result<TcpListener> {
    let addr = format!("127.0.0.1:{port}");
    TcpListener::bind(&addr).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::AddrInUse {
            anyhow::anyhow!("Port {port} is already in use; pass a different --port")
        } else {
            anyhow::anyhow!("Failed to bind callback port {port}: {e}")
        }
    })
}

/// Wait for the redirect and return its target (path and query). Only a
/// request whose target carries a `code` parameter ends the wait.
pub async fn accept(listener: TcpListener) -> Result<String> {
    let accept = async {
        loop {
            let (mut stream, peer) = listener
                .accept()
                .await
                .context("Failed to accept callback connection")?;

            let Some(target) = read_target(&mut stream).await else {
                debug!(%peer, "Callback connection sent no request");
                continue;
            };

            if authorization_code(&target).is_none() {
                debug!(%peer, %target, "Ignoring request without authorization code");
                let _ = stream.write_all(NOT_FOUND).await;
                let _ = stream.shutdown().await;
                continue;
            }

            debug!(%peer, "Login redirect received");
            stream
                .write_all(RETURN_HTML)
                .await
                .context("Failed to answer callback request")?;
            let _ = stream.shutdown().await;

            return Ok::<String, anyhow::Error>(target);
        }
    };

    tokio::time::timeout(Duration::from_secs(TIMEOUT_SECS), accept)
        .await
        .map_err(|_| anyhow::anyhow!("Timed out waiting for the login redirect"))?
}

/// Read one request from the connection. `None` for a connection that stays
/// silent, closes, fails or does not send a request line.
async fn read_target(stream: &mut TcpStream) -> Option<String> {
    let mut buf = vec![0u8; REQUEST_BUFFER_SIZE];
    let n = match tokio::time::timeout(READ_TIMEOUT, stream.read(&mut buf)).await {
        Ok(Ok(n)) if n > 0 => n,
        Ok(Ok(_)) => return None,
        Ok(Err(e)) => {
            debug!(error = %e, "Failed to read callback request");
            return None;
        }
        Err(_) => return None,
    };

    let request = String::from_utf8_lossy(&buf[..n]);
    request_target(&request).map(str::to_string)
}

/// Second token of the request line: `GET /?code=abc HTTP/1.1` -> `/?code=abc`.
fn request_target(request: &str) -> Option<&str> {
    let first_line = request.lines().next()?;
    let mut parts = first_line.split_ascii_whitespace();
    let _method = parts.next()?;
    parts.next()
}
