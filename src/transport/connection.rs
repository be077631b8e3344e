//! Transport connection manager
//!
//! Owns the single WebSocket connection to the event stream. Handles
//! connect/disconnect/reconnect with bounded backoff and fans incoming
//! events out to the stores via a broadcast channel.
//!
//! Reconnect policy: delay = base_delay * attempt, attempt capped at
//! max_reconnect_attempts. Past the cap the connection stays in
//! `Reconnecting` with no further timers; going offline is an observable
//! state, not an error.

use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch, Mutex};
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message};
use tracing::{debug, error, info, warn};

use crate::config::SyncConfig;
use crate::types::{ClientEvent, Result, ServerEvent, SyncError};

/// Connection lifecycle phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionPhase {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

/// Observable connection state, published on a watch channel
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionState {
    pub phase: ConnectionPhase,
    pub attempt: u32,
    pub last_error: Option<String>,
}

impl ConnectionState {
    fn disconnected() -> Self {
        Self {
            phase: ConnectionPhase::Disconnected,
            attempt: 0,
            last_error: None,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.phase == ConnectionPhase::Connected
    }

    /// True once reconnect attempts are exhausted and no timer is pending
    pub fn is_offline(&self, max_attempts: u32) -> bool {
        self.phase == ConnectionPhase::Reconnecting && self.attempt > max_attempts
    }
}

/// Handles for a live connection task
struct LiveConnection {
    outbound: mpsc::Sender<ClientEvent>,
    shutdown: watch::Sender<bool>,
}

/// Manages the event-stream connection lifecycle
pub struct ConnectionManager {
    socket_url: String,
    base_delay: Duration,
    max_attempts: u32,
    state_tx: watch::Sender<ConnectionState>,
    events_tx: broadcast::Sender<ServerEvent>,
    live: Mutex<Option<LiveConnection>>,
}

impl ConnectionManager {
    pub fn new(config: &SyncConfig) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::disconnected());
        let (events_tx, _) = broadcast::channel(256);
        Self {
            socket_url: config.socket_url.clone(),
            base_delay: config.reconnect_base_delay,
            max_attempts: config.max_reconnect_attempts,
            state_tx,
            events_tx,
            live: Mutex::new(None),
        }
    }

    /// Watch connection-state transitions
    pub fn state(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    /// Subscribe to inbound server events
    pub fn subscribe(&self) -> broadcast::Receiver<ServerEvent> {
        self.events_tx.subscribe()
    }

    /// Current phase snapshot
    pub fn phase(&self) -> ConnectionPhase {
        self.state_tx.borrow().phase
    }

    /// Start the connection task with the given connection-time credential.
    ///
    /// A live connection already exists: no-op. Only one connection may
    /// exist per session.
    pub async fn connect(&self, token: &str) -> Result<()> {
        if token.is_empty() {
            return Err(SyncError::Invalid("auth token is required".into()));
        }

        let mut live = self.live.lock().await;
        if live.is_some() {
            debug!("connect() while a connection task exists; no-op");
            return Ok(());
        }

        let (outbound_tx, outbound_rx) = mpsc::channel(64);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let runner = ConnectionRunner {
            url: handshake_url(&self.socket_url, token),
            base_delay: self.base_delay,
            max_attempts: self.max_attempts,
            state_tx: self.state_tx.clone(),
            events_tx: self.events_tx.clone(),
            shutdown: shutdown_rx,
        };
        tokio::spawn(runner.run(outbound_rx));

        *live = Some(LiveConnection {
            outbound: outbound_tx,
            shutdown: shutdown_tx,
        });
        Ok(())
    }

    /// Enqueue an outbound event, fire-and-forget.
    ///
    /// Fails with `Closed` when no connection task is live; events queued
    /// while reconnecting are flushed once the connection is back.
    pub async fn send(&self, event: ClientEvent) -> Result<()> {
        let live = self.live.lock().await;
        match live.as_ref() {
            Some(conn) => conn
                .outbound
                .try_send(event)
                .map_err(|e| SyncError::Closed(format!("outbound queue: {}", e))),
            None => Err(SyncError::Closed("no live connection".into())),
        }
    }

    /// Tear the connection down. Idempotent; safe to call when already
    /// disconnected. Cancels any pending retry timer and stops event
    /// dispatch immediately (events racing the teardown are dropped by the
    /// shutdown check in the connection task).
    pub async fn teardown(&self) {
        let mut live = self.live.lock().await;
        if let Some(conn) = live.take() {
            let _ = conn.shutdown.send(true);
            info!("Transport teardown requested");
        }
        self.state_tx.send_replace(ConnectionState::disconnected());
    }
}

/// State carried by the spawned connection task
struct ConnectionRunner {
    url: String,
    base_delay: Duration,
    max_attempts: u32,
    state_tx: watch::Sender<ConnectionState>,
    events_tx: broadcast::Sender<ServerEvent>,
    shutdown: watch::Receiver<bool>,
}

impl ConnectionRunner {
    fn set_state(&self, phase: ConnectionPhase, attempt: u32, last_error: Option<String>) {
        // After a teardown the manager owns the state; a racing task must
        // not resurrect it.
        if *self.shutdown.borrow() {
            return;
        }
        self.state_tx.send_replace(ConnectionState {
            phase,
            attempt,
            last_error,
        });
    }

    async fn run(mut self, mut outbound: mpsc::Receiver<ClientEvent>) {
        let mut attempt: u32 = 0;

        loop {
            if *self.shutdown.borrow() {
                break;
            }

            self.set_state(ConnectionPhase::Connecting, attempt, None);
            debug!(url = %redact_token(&self.url), "Connecting to event stream");

            let mut shutdown = self.shutdown.clone();
            let connected = tokio::select! {
                result = connect_async(self.url.as_str()) => result,
                _ = shutdown.changed() => break,
            };

            match connected {
                Ok((ws, _)) => {
                    attempt = 0;
                    self.set_state(ConnectionPhase::Connected, 0, None);
                    info!("Event stream connected");

                    let reason = self.drive(ws, &mut outbound).await;
                    match reason {
                        CloseReason::LocalTeardown => break,
                        CloseReason::Remote(e) => {
                            warn!("Event stream lost: {}", e);
                        }
                    }
                }
                Err(e) => {
                    error!("Event stream connect failed: {}", e);
                }
            }

            // Remote-initiated loss or failed attempt: back off and retry
            attempt += 1;
            if attempt > self.max_attempts {
                self.set_state(
                    ConnectionPhase::Reconnecting,
                    attempt,
                    Some("reconnect attempts exhausted".to_string()),
                );
                warn!(
                    max_attempts = self.max_attempts,
                    "Reconnect attempts exhausted; staying offline"
                );
                // Terminal observable state. Hold until teardown.
                let mut shutdown = self.shutdown.clone();
                let _ = shutdown.wait_for(|stop| *stop).await;
                break;
            }

            let delay = self.base_delay * attempt;
            self.set_state(ConnectionPhase::Reconnecting, attempt, None);
            info!(attempt, max = self.max_attempts, ?delay, "Reconnecting after delay");

            let mut shutdown = self.shutdown.clone();
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = shutdown.changed() => break,
            }
        }

        debug!("Connection task ended");
    }

    /// Drive one live connection until it drops or teardown is requested
    async fn drive(
        &mut self,
        ws: tokio_tungstenite::WebSocketStream<
            tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
        >,
        outbound: &mut mpsc::Receiver<ClientEvent>,
    ) -> CloseReason {
        let (mut sink, mut stream) = ws.split();
        let mut shutdown = self.shutdown.clone();

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    let _ = sink.send(Message::Close(None)).await;
                    return CloseReason::LocalTeardown;
                }
                event = outbound.recv() => {
                    match event {
                        Some(event) => {
                            let frame = match serde_json::to_string(&event) {
                                Ok(frame) => frame,
                                Err(e) => {
                                    error!("Failed to encode outbound event: {}", e);
                                    continue;
                                }
                            };
                            if let Err(e) = sink.send(Message::Text(frame)).await {
                                return CloseReason::Remote(e.to_string());
                            }
                        }
                        // Manager dropped the sender: treat as teardown
                        None => {
                            let _ = sink.send(Message::Close(None)).await;
                            return CloseReason::LocalTeardown;
                        }
                    }
                }
                msg = stream.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            // Teardown raced with delivery: drop, never dispatch
                            if *self.shutdown.borrow() {
                                return CloseReason::LocalTeardown;
                            }
                            match serde_json::from_str::<ServerEvent>(&text) {
                                Ok(event) => {
                                    // No receivers is fine; consumers come and go
                                    let _ = self.events_tx.send(event);
                                }
                                Err(e) => {
                                    debug!("Dropping unparseable event: {} ({})", e, text);
                                }
                            }
                        }
                        Some(Ok(Message::Ping(data))) => {
                            let _ = sink.send(Message::Pong(data)).await;
                        }
                        Some(Ok(Message::Close(frame))) => {
                            return CloseReason::Remote(format!("closed by server: {:?}", frame));
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            return CloseReason::Remote(e.to_string());
                        }
                        None => {
                            return CloseReason::Remote("stream ended".to_string());
                        }
                    }
                }
            }
        }
    }
}

enum CloseReason {
    /// Teardown requested locally; do not reconnect
    LocalTeardown,
    /// The remote end dropped the connection; reconnect with backoff
    Remote(String),
}

/// Handshake URL with the auth token as connection-time credential.
///
/// A bare origin (`ws://host:port`) gets the `/` path inserted first: the
/// request target of the upgrade must be a path, never `?token=..` alone.
fn handshake_url(socket_url: &str, token: &str) -> String {
    let (base, query) = match socket_url.split_once('?') {
        Some((base, query)) => (base, Some(query)),
        None => (socket_url, None),
    };

    let authority_start = base.find("://").map(|i| i + 3).unwrap_or(0);
    let mut url = base.to_string();
    if !base[authority_start..].contains('/') {
        url.push('/');
    }

    match query {
        Some(query) => format!("{}?{}&token={}", url, query, token),
        None => format!("{}?token={}", url, token),
    }
}

fn redact_token(url: &str) -> String {
    match url.find("token=") {
        Some(idx) => format!("{}token=<redacted>", &url[..idx]),
        None => url.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handshake_url_appends_token() {
        assert_eq!(
            handshake_url("ws://localhost:4000/ws", "abc"),
            "ws://localhost:4000/ws?token=abc"
        );
        assert_eq!(
            handshake_url("ws://localhost:4000/ws?v=2", "abc"),
            "ws://localhost:4000/ws?v=2&token=abc"
        );
    }

    #[test]
    fn test_handshake_url_bare_origin_gets_root_path() {
        assert_eq!(
            handshake_url("ws://127.0.0.1:4000", "abc"),
            "ws://127.0.0.1:4000/?token=abc"
        );
        assert_eq!(
            handshake_url("wss://example.com", "abc"),
            "wss://example.com/?token=abc"
        );
    }

    #[test]
    fn test_redact_token() {
        assert_eq!(
            redact_token("ws://h/ws?token=secret"),
            "ws://h/ws?token=<redacted>"
        );
    }

    #[test]
    fn test_offline_detection() {
        let state = ConnectionState {
            phase: ConnectionPhase::Reconnecting,
            attempt: 6,
            last_error: None,
        };
        assert!(state.is_offline(5));

        let state = ConnectionState {
            phase: ConnectionPhase::Reconnecting,
            attempt: 3,
            last_error: None,
        };
        assert!(!state.is_offline(5));
    }

    #[tokio::test]
    async fn test_connect_requires_token() {
        let manager = ConnectionManager::new(&SyncConfig::default());
        assert!(matches!(
            manager.connect("").await,
            Err(SyncError::Invalid(_))
        ));
    }

    #[tokio::test]
    async fn test_send_without_connection_is_closed() {
        let manager = ConnectionManager::new(&SyncConfig::default());
        let err = manager
            .send(ClientEvent::JoinRoom {
                room: "supervisors".to_string(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::Closed(_)));
    }

    #[tokio::test]
    async fn test_teardown_is_idempotent() {
        let manager = ConnectionManager::new(&SyncConfig::default());
        manager.teardown().await;
        manager.teardown().await;
        assert_eq!(manager.phase(), ConnectionPhase::Disconnected);
    }
}
