//! A push subscription to `/ws/analysis/<base-id>` that waits for a single
//! verdict payload. A blocking `tungstenite` client connection with no TLS
//! layer — the classifier is a loopback service.

use std::net::TcpStream;
use std::time::Duration;

use tungstenite::{Message, WebSocket};
use url::Url;

use crate::error::SubscriptionError;
use crate::model::ClassifierResult;

const POLL_TIMEOUT: Duration = Duration::from_millis(300);

/// Opens the subscription socket for `base_id`.
pub fn connect(base_url: &str, base_id: &str) -> Result<WebSocket<TcpStream>, SubscriptionError> {
    let ws_url = to_ws_url(base_url, base_id);
    let url = Url::parse(&ws_url).map_err(|e| SubscriptionError::Open(e.to_string()))?;
    let host = url
        .host_str()
        .ok_or_else(|| SubscriptionError::Open("missing host".into()))?;
    let port = url.port().unwrap_or(80);

    let tcp = TcpStream::connect((host, port)).map_err(|e| SubscriptionError::Open(e.to_string()))?;
    tcp.set_read_timeout(Some(POLL_TIMEOUT))
        .map_err(|e| SubscriptionError::Open(e.to_string()))?;
    tcp.set_nodelay(true).ok();

    let (socket, _response) =
        tungstenite::client::client(url.as_str(), tcp).map_err(|e| SubscriptionError::Open(e.to_string()))?;
    Ok(socket)
}

fn to_ws_url(base_url: &str, base_id: &str) -> String {
    let stripped = base_url
        .trim_end_matches('/')
        .replacen("http://", "ws://", 1)
        .replacen("https://", "wss://", 1);
    format!("{stripped}/ws/analysis/{base_id}")
}

/// Outcome of one poll of the subscription socket.
pub enum PollOutcome {
    Verdict(ClassifierResult),
    /// No message yet; keep polling while `should_continue` holds.
    Pending,
    Closed,
    Malformed,
}

/// Polls the socket once, respecting the read timeout set at `connect` time.
/// The session manager calls this in a loop, checking its own teardown
/// signal between calls so a torn-down session's thread exits promptly
/// instead of blocking indefinitely on a silent classifier.
pub fn poll_once(socket: &mut WebSocket<TcpStream>) -> PollOutcome {
    match socket.read() {
        Ok(Message::Text(text)) => match serde_json::from_str::<ClassifierResult>(text.as_str()) {
            Ok(result) => PollOutcome::Verdict(result),
            Err(_) => PollOutcome::Malformed,
        },
        Ok(Message::Close(_)) => PollOutcome::Closed,
        Ok(_) => PollOutcome::Pending,
        Err(tungstenite::Error::Io(e))
            if e.kind() == std::io::ErrorKind::WouldBlock || e.kind() == std::io::ErrorKind::TimedOut =>
        {
            PollOutcome::Pending
        }
        Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed) => {
            PollOutcome::Closed
        }
        Err(_) => PollOutcome::Closed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rewrites_http_scheme_to_ws() {
        assert_eq!(
            to_ws_url("http://127.0.0.1:8000", "post_1"),
            "ws://127.0.0.1:8000/ws/analysis/post_1"
        );
    }

    #[test]
    fn rewrites_https_scheme_to_wss() {
        assert_eq!(
            to_ws_url("https://example.com", "post_9"),
            "wss://example.com/ws/analysis/post_9"
        );
    }
}
