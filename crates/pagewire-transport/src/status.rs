//! Plaintext status banner served on the WebSocket port.
//!
//! Before the WebSocket handshake the request head is peeked (not
//! consumed). A head without an `Upgrade: websocket` header is a plain
//! HTTP request and gets the banner instead of a connection.
//!
//! Runs on the connection's own task, bounded by the handshake timeout.

use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

const PEEK_LIMIT: usize = 4096;
const PEEK_ATTEMPTS: usize = 20;
const PEEK_INTERVAL: Duration = Duration::from_millis(10);

/// Returns `true` if the pending request is plain HTTP.
///
/// Anything undecided after [`PEEK_ATTEMPTS`] falls through to the
/// WebSocket handshake, which reports its own error.
pub(crate) async fn is_status_request(stream: &TcpStream) -> bool {
    let mut buf = vec![0u8; PEEK_LIMIT];
    for _ in 0..PEEK_ATTEMPTS {
        let n = match stream.peek(&mut buf).await {
            Ok(0) | Err(_) => return false,
            Ok(n) => n,
        };
        let head = &buf[..n];
        if has_websocket_upgrade(head) {
            return false;
        }
        if head_complete(head) || n == buf.len() {
            return true;
        }
        tokio::time::sleep(PEEK_INTERVAL).await;
    }
    false
}

/// Writes `banner` as a `200 text/plain` response and closes the stream.
pub(crate) async fn respond(
    mut stream: TcpStream,
    banner: &str,
) -> Result<(), crate::TransportError> {
    // Drain the request head so closing does not reset the connection.
    let mut buf = vec![0u8; PEEK_LIMIT];
    let _ = stream.read(&mut buf).await;

    let response = format!(
        "HTTP/1.1 200 OK\r\n\
         Content-Type: text/plain; charset=utf-8\r\n\
         Content-Length: {}\r\n\
         Connection: close\r\n\
         \r\n\
         {banner}",
        banner.len()
    );
    stream
        .write_all(response.as_bytes())
        .await
        .map_err(crate::TransportError::StatusFailed)?;
    stream
        .shutdown()
        .await
        .map_err(crate::TransportError::StatusFailed)
}

fn has_websocket_upgrade(head: &[u8]) -> bool {
    String::from_utf8_lossy(head)
        .to_ascii_lowercase()
        .lines()
        .any(|line| line.starts_with("upgrade:") && line.contains("websocket"))
}

fn head_complete(head: &[u8]) -> bool {
    head.windows(4).any(|w| w == b"\r\n\r\n")
}
