//! Socket Transport
//!
//! A single logical websocket connection per process, keyed by identity.
//! Inbound text frames are classified and forwarded into the orchestrator's
//! queue in wire arrival order. Non-clean closes reconnect with capped
//! exponential backoff; a close with code 1000 or 1001 never reconnects.
//! Across reconnections there is no ordering guarantee, so consumers must
//! be idempotent.

use std::sync::{Arc, RwLock};

use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use crate::models::protocol::{classify_frame, EventOrigin, SourceEvent};
use crate::utils::error::{CoreError, CoreResult};

/// Runtime status of the socket, for a UI connection indicator
#[derive(Debug, Clone, Default, Serialize)]
pub struct SocketStatus {
    pub connected: bool,
    pub reconnecting: bool,
    /// Reconnect attempts since the last successful open
    pub attempts: u32,
    pub identity: Option<String>,
}

/// Backoff schedule: `base × 2^min(attempt−1, 4)`, capped at `base × 16`.
/// Attempt 1 uses the base delay.
pub fn backoff_delay_ms(base_ms: u64, attempt: u32) -> u64 {
    let exponent = attempt.saturating_sub(1).min(4);
    base_ms.saturating_mul(1u64 << exponent)
}

struct Connection {
    identity: String,
    cancel: CancellationToken,
    outbound_tx: mpsc::Sender<serde_json::Value>,
    task: JoinHandle<()>,
}

/// Long-lived bidirectional connection with reconnection
pub struct SocketTransport {
    url: String,
    base_delay_ms: u64,
    max_attempts: u32,
    events_tx: mpsc::Sender<SourceEvent>,
    status: Arc<RwLock<SocketStatus>>,
    conn: Mutex<Option<Connection>>,
}

impl SocketTransport {
    pub fn new(
        socket_base_url: impl Into<String>,
        base_delay_ms: u64,
        max_attempts: u32,
        events_tx: mpsc::Sender<SourceEvent>,
    ) -> Self {
        Self {
            url: socket_base_url.into(),
            base_delay_ms,
            max_attempts,
            events_tx,
            status: Arc::new(RwLock::new(SocketStatus::default())),
            conn: Mutex::new(None),
        }
    }

    /// Open the connection for `identity`.
    ///
    /// Idempotent: a second call while connecting or connected is a no-op
    /// unless the identity changed, in which case the old connection is
    /// closed with code 1000 first.
    pub async fn connect(&self, identity: &str) {
        let mut conn = self.conn.lock().await;

        if let Some(existing) = conn.as_ref() {
            if existing.identity == identity && !existing.task.is_finished() {
                return;
            }
            existing.cancel.cancel();
        }

        let cancel = CancellationToken::new();
        let (outbound_tx, outbound_rx) = mpsc::channel(100);
        let task = tokio::spawn(run_connection(
            connection_url(&self.url, identity),
            self.base_delay_ms,
            self.max_attempts,
            self.events_tx.clone(),
            outbound_rx,
            cancel.clone(),
            Arc::clone(&self.status),
        ));

        {
            let mut status = self.status.write().expect("status lock poisoned");
            *status = SocketStatus {
                identity: Some(identity.to_string()),
                ..SocketStatus::default()
            };
        }

        *conn = Some(Connection {
            identity: identity.to_string(),
            cancel,
            outbound_tx,
            task,
        });
    }

    /// Send a JSON frame over the connection
    pub async fn send_json(&self, value: serde_json::Value) -> CoreResult<()> {
        let outbound_tx = {
            let conn = self.conn.lock().await;
            match conn.as_ref() {
                Some(c) if !c.cancel.is_cancelled() => c.outbound_tx.clone(),
                _ => return Err(CoreError::transport("socket not connected")),
            }
        };
        outbound_tx
            .send(value)
            .await
            .map_err(|_| CoreError::transport("socket writer gone"))
    }

    /// Canonical shutdown: close with code 1000, never reconnect
    pub async fn close(&self) {
        let mut conn = self.conn.lock().await;
        if let Some(existing) = conn.take() {
            existing.cancel.cancel();
        }
        let mut status = self.status.write().expect("status lock poisoned");
        status.connected = false;
        status.reconnecting = false;
    }

    pub fn status(&self) -> SocketStatus {
        self.status.read().expect("status lock poisoned").clone()
    }
}

fn connection_url(base: &str, identity: &str) -> String {
    let separator = if base.contains('?') { '&' } else { '?' };
    format!("{}{}clientId={}", base, separator, identity)
}

async fn run_connection(
    url: String,
    base_delay_ms: u64,
    max_attempts: u32,
    events_tx: mpsc::Sender<SourceEvent>,
    mut outbound_rx: mpsc::Receiver<serde_json::Value>,
    cancel: CancellationToken,
    status: Arc<RwLock<SocketStatus>>,
) {
    let mut attempt: u32 = 0;

    'outer: loop {
        if cancel.is_cancelled() {
            break;
        }

        match connect_async(url.as_str()).await {
            Ok((ws, _)) => {
                attempt = 0;
                set_status(&status, |s| {
                    s.connected = true;
                    s.reconnecting = false;
                    s.attempts = 0;
                });
                tracing::debug!("socket connected");

                let (mut sink, mut reader) = ws.split();
                let clean = loop {
                    tokio::select! {
                        _ = cancel.cancelled() => {
                            let _ = sink.send(close_frame()).await;
                            break 'outer;
                        }
                        outbound = outbound_rx.recv() => match outbound {
                            Some(value) => {
                                let text = value.to_string();
                                if let Err(e) = sink.send(Message::Text(text)).await {
                                    tracing::warn!(error = %e, "socket send failed");
                                }
                            }
                            // All senders gone means the transport was dropped
                            None => {
                                let _ = sink.send(close_frame()).await;
                                break 'outer;
                            }
                        },
                        inbound = reader.next() => match inbound {
                            Some(Ok(Message::Text(text))) => {
                                match classify_frame(&text) {
                                    Ok(frame) => {
                                        if events_tx
                                            .send(SourceEvent::Inbound {
                                                origin: EventOrigin::Socket,
                                                frame,
                                            })
                                            .await
                                            .is_err()
                                        {
                                            // Orchestrator gone, nothing left to feed
                                            break 'outer;
                                        }
                                    }
                                    Err(e) => {
                                        tracing::warn!(error = %e, "dropping unrecognized socket frame");
                                    }
                                }
                            }
                            Some(Ok(Message::Ping(payload))) => {
                                let _ = sink.send(Message::Pong(payload)).await;
                            }
                            Some(Ok(Message::Close(frame))) => {
                                break is_clean_close(frame.as_ref());
                            }
                            Some(Ok(_)) => {}
                            Some(Err(e)) => {
                                tracing::warn!(error = %e, "socket read error");
                                break false;
                            }
                            None => break false,
                        },
                    }
                };

                set_status(&status, |s| s.connected = false);
                if clean {
                    tracing::debug!("socket closed cleanly");
                    break 'outer;
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "socket connect failed");
            }
        }

        attempt += 1;
        if attempt > max_attempts {
            tracing::error!(attempts = attempt - 1, "socket reconnect attempts exhausted");
            set_status(&status, |s| s.reconnecting = false);
            break;
        }

        let delay = backoff_delay_ms(base_delay_ms, attempt);
        set_status(&status, |s| {
            s.reconnecting = true;
            s.attempts = attempt;
        });
        tracing::debug!(attempt, delay_ms = delay, "socket reconnecting");

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(std::time::Duration::from_millis(delay)) => {}
        }
    }

    set_status(&status, |s| {
        s.connected = false;
        s.reconnecting = false;
    });
}

fn close_frame() -> Message {
    Message::Close(Some(CloseFrame {
        code: CloseCode::Normal,
        reason: "".into(),
    }))
}

fn is_clean_close(frame: Option<&CloseFrame>) -> bool {
    match frame {
        Some(frame) => matches!(u16::from(frame.code), 1000 | 1001),
        None => false,
    }
}

fn set_status(status: &RwLock<SocketStatus>, f: impl FnOnce(&mut SocketStatus)) {
    f(&mut status.write().expect("status lock poisoned"));
}
