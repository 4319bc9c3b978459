//! A long-lived listener on a fixed loopback port accepting exactly one
//! active client at a time. Each inbound text frame is a JSON location
//! message; malformed frames are logged and dropped without closing the
//! socket.

use std::net::{TcpListener, TcpStream};
use std::sync::mpsc::Sender;

use tracing::{debug, info, warn};
use tungstenite::{Message, WebSocket};

use crate::model::LocationMessage;

/// Events the sensor intake hands to the crop coordinator.
#[derive(Debug, Clone)]
pub enum SensorEvent {
    Location(LocationMessage),
    /// The active client disconnected; all per-session state resets to
    /// "no active post".
    Disconnected,
}

/// Runs the accept loop on the current thread. Intended to be spawned on its
/// own `std::thread`; never returns under normal operation.
pub fn run(port: u16, event_tx: Sender<SensorEvent>) {
    let addr = format!("127.0.0.1:{port}");
    let listener = match TcpListener::bind(&addr) {
        Ok(l) => l,
        Err(e) => {
            tracing::error!("sensor intake: failed to bind {addr}: {e}");
            return;
        }
    };
    info!("sensor intake listening on {addr}");

    loop {
        match listener.accept() {
            Ok((stream, peer)) => {
                info!("sensor intake: accepted connection from {peer}");
                handle_connection(stream, &event_tx);
                info!("sensor intake: connection from {peer} closed");
                let _ = event_tx.send(SensorEvent::Disconnected);
            }
            Err(e) => {
                warn!("sensor intake: accept failed: {e}");
            }
        }
    }
}

fn handle_connection(stream: TcpStream, event_tx: &Sender<SensorEvent>) {
    let mut socket: WebSocket<TcpStream> = match tungstenite::accept(stream) {
        Ok(s) => s,
        Err(e) => {
            warn!("sensor intake: websocket handshake failed: {e}");
            return;
        }
    };

    loop {
        match socket.read() {
            Ok(Message::Text(text)) => handle_frame(text.as_str(), event_tx),
            Ok(Message::Binary(bytes)) => {
                if let Ok(text) = std::str::from_utf8(&bytes) {
                    handle_frame(text, event_tx);
                }
            }
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed) => break,
            Err(e) => {
                warn!("sensor intake: read error: {e}");
                break;
            }
        }
    }
}

fn handle_frame(text: &str, event_tx: &Sender<SensorEvent>) {
    match serde_json::from_str::<LocationMessage>(text) {
        Ok(msg) => {
            debug!("sensor intake: location message for site {}", msg.site);
            let _ = event_tx.send(SensorEvent::Location(msg));
        }
        Err(e) => {
            warn!("sensor intake: dropping malformed frame: {e}; raw={text}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malformed_frame_does_not_emit_event() {
        let (tx, rx) = std::sync::mpsc::channel();
        handle_frame("not json", &tx);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn well_formed_frame_emits_location_event() {
        let (tx, rx) = std::sync::mpsc::channel();
        let json = r#"{"site":"x","dpr":2.0,"windowScreenX":0,"windowScreenY":0,"post":null}"#;
        handle_frame(json, &tx);
        match rx.try_recv() {
            Ok(SensorEvent::Location(msg)) => assert_eq!(msg.site, "x"),
            other => panic!("unexpected: {other:?}"),
        }
    }
}
