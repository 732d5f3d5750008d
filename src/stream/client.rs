//! Realtime websocket channel for deploy events.
//!
//! The channel opens a single authenticated websocket against the session's
//! stream address and fans inbound traffic out through two lanes: decoded
//! JSON events and transport errors. The channel is terminal: when the
//! transport closes or errors there is no automatic reconnection, and the
//! caller decides whether to open a new one.

use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{info, warn};

use crate::config::Credential;
use crate::negotiate::Session;

/// Query parameter carrying the encoded credential. The websocket handshake
/// carries no custom headers, so the token rides the URL.
const AUTH_QUERY_PARAM: &str = "auth";

/// Lifecycle states of a realtime channel.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum StreamState {
    /// Handshake in progress.
    Connecting,
    /// Connected and dispatching events.
    Open,
    /// Terminal: explicit close or transport-level close/error.
    Closed,
}

/// Errors produced by the realtime channel.
#[derive(Debug, Error)]
pub enum StreamError {
    /// No session has been negotiated yet. Unlike the request gateway, the
    /// realtime channel never negotiates lazily.
    #[error("no negotiated session; initialize the connector first")]
    NotNegotiated,

    /// Websocket transport error.
    #[error("websocket error: {0}")]
    WebSocket(#[from] WsError),
}

/// Opens the realtime channel for a resolved session.
///
/// Connects to the session's stream address with the credential encoded in
/// the auth query parameter, then hands the socket to a background worker
/// that feeds the returned handle.
pub async fn open(session: &Session) -> Result<StreamHandle, StreamError> {
    let url = authenticated_url(&session.endpoints().stream_url, session.credential());
    let (state_tx, state_rx) = watch::channel(StreamState::Connecting);

    let (socket, _) = connect_async(url.as_str()).await?;
    let _ = state_tx.send(StreamState::Open);
    info!(event = "stream_open", stream_url = %session.endpoints().stream_url);

    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let (error_tx, error_rx) = mpsc::unbounded_channel();
    let (close_tx, close_rx) = mpsc::unbounded_channel();

    tokio::spawn(stream_worker(socket, event_tx, error_tx, close_rx, state_tx));

    Ok(StreamHandle {
        events: event_rx,
        errors: error_rx,
        state: state_rx,
        closer: StreamCloser { tx: close_tx },
    })
}

fn authenticated_url(stream_url: &str, credential: &Credential) -> String {
    format!(
        "{stream_url}?{AUTH_QUERY_PARAM}={}",
        credential.basic_token()
    )
}

/// Handle over one open realtime connection.
///
/// Destroyed on explicit close or on terminal transport error; never
/// reopened automatically. Dropping the handle closes the channel once the
/// worker observes the closed lanes.
#[derive(Debug)]
pub struct StreamHandle {
    events: mpsc::UnboundedReceiver<Value>,
    errors: mpsc::UnboundedReceiver<StreamError>,
    state: watch::Receiver<StreamState>,
    closer: StreamCloser,
}

impl StreamHandle {
    /// Receives the next decoded event frame.
    ///
    /// Returns `None` once the channel is closed and all buffered events
    /// have been drained.
    pub async fn recv(&mut self) -> Option<Value> {
        self.events.recv().await
    }

    /// Receives the next transport-level error, if one was reported.
    pub async fn recv_error(&mut self) -> Option<StreamError> {
        self.errors.recv().await
    }

    /// Returns the current lifecycle state.
    pub fn state(&self) -> StreamState {
        *self.state.borrow()
    }

    /// Waits until the channel reaches [`StreamState::Closed`].
    pub async fn closed(&mut self) {
        loop {
            if *self.state.borrow() == StreamState::Closed {
                return;
            }
            if self.state.changed().await.is_err() {
                return;
            }
        }
    }

    /// Returns a cloneable closer for this channel.
    pub fn closer(&self) -> StreamCloser {
        self.closer.clone()
    }

    /// Closes the channel. Closing an already-closed channel is a no-op.
    pub fn close(&self) {
        self.closer.close();
    }
}

/// Cloneable close signal for a realtime channel.
#[derive(Clone, Debug)]
pub struct StreamCloser {
    tx: mpsc::UnboundedSender<()>,
}

impl StreamCloser {
    /// Signals the worker to close the socket. Idempotent: signalling an
    /// already-closed channel is a no-op.
    pub fn close(&self) {
        let _ = self.tx.send(());
    }
}

async fn stream_worker(
    mut socket: WebSocketStream<MaybeTlsStream<TcpStream>>,
    event_tx: mpsc::UnboundedSender<Value>,
    error_tx: mpsc::UnboundedSender<StreamError>,
    mut close_rx: mpsc::UnboundedReceiver<()>,
    state_tx: watch::Sender<StreamState>,
) {
    loop {
        tokio::select! {
            _ = close_rx.recv() => {
                let _ = socket.close(None).await;
                info!(event = "stream_closed", reason = "client");
                break;
            }
            frame = socket.next() => match frame {
                Some(Ok(Message::Text(text))) => match serde_json::from_str::<Value>(&text) {
                    Ok(event) => {
                        let _ = event_tx.send(event);
                    }
                    Err(err) => {
                        // Undecodable frames are dropped: they never reach
                        // the caller and never close the channel.
                        warn!(event = "stream_frame_undecodable", error = %err);
                    }
                },
                Some(Ok(Message::Ping(payload))) => {
                    if let Err(err) = socket.send(Message::Pong(payload)).await {
                        let _ = error_tx.send(StreamError::WebSocket(err));
                        break;
                    }
                }
                Some(Ok(Message::Pong(_))) => {}
                Some(Ok(Message::Close(_))) | None => {
                    info!(event = "stream_closed", reason = "server");
                    break;
                }
                Some(Ok(_)) => {
                    // The protocol is JSON text; other frame kinds are
                    // absorbed like undecodable text.
                    warn!(event = "stream_frame_undecodable", error = "non-text frame");
                }
                Some(Err(err)) => {
                    let _ = error_tx.send(StreamError::WebSocket(err));
                    break;
                }
            }
        }
    }

    let _ = state_tx.send(StreamState::Closed);
}

#[cfg(test)]
mod tests {
    use secrecy::SecretString;

    use super::authenticated_url;
    use crate::config::Credential;

    #[test]
    fn authenticated_url_embeds_the_encoded_credential() {
        let credential = Credential::new("user", SecretString::new("pw".to_string()));
        assert_eq!(
            authenticated_url("wss://deploy.airlift.dev/api/v1/ws", &credential),
            "wss://deploy.airlift.dev/api/v1/ws?auth=dXNlcjpwdw=="
        );
    }

    #[test]
    fn authenticated_url_never_contains_the_raw_secret() {
        let credential = Credential::new("user", SecretString::new("hunter2".to_string()));
        let url = authenticated_url("ws://localhost:8420/api/v1/ws", &credential);
        assert!(!url.contains("hunter2"));
    }
}
