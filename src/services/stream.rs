//! Request Stream
//!
//! Each submission opens a unidirectional server-push channel: the submit
//! response body, read as newline-delimited JSON envelopes. Parsed frames
//! are forwarded into the orchestrator's queue tagged with the stream's
//! local id; read errors become a `StreamFailed` control event the
//! orchestrator translates into a synthetic task error. Streams are
//! non-restartable.

use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::models::protocol::{classify_frame, EventOrigin, SourceEvent};

/// Handle to a live per-submission stream.
///
/// Closing is idempotent and detaches the reader; the stream cannot be
/// reopened.
#[derive(Debug)]
pub struct StreamHandle {
    stream_id: String,
    cancel: CancellationToken,
}

impl StreamHandle {
    pub(crate) fn new(stream_id: String, cancel: CancellationToken) -> Self {
        Self { stream_id, cancel }
    }

    /// A handle with no reader behind it, for injecting events in tests
    pub fn idle(stream_id: impl Into<String>) -> Self {
        Self {
            stream_id: stream_id.into(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn stream_id(&self) -> &str {
        &self.stream_id
    }

    /// Stop the reader; safe to call more than once
    pub fn close(&self) {
        self.cancel.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl Drop for StreamHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Spawn the reader task for a submit response body.
pub(crate) fn spawn_reader(
    response: reqwest::Response,
    stream_id: String,
    events_tx: mpsc::Sender<SourceEvent>,
    cancel: CancellationToken,
) {
    tokio::spawn(async move {
        let mut body = response.bytes_stream();
        let mut buffer = String::new();

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::debug!(stream_id = %stream_id, "request stream closed");
                    return;
                }
                chunk = body.next() => match chunk {
                    Some(Ok(bytes)) => {
                        buffer.push_str(&String::from_utf8_lossy(&bytes));
                        while let Some(line_end) = buffer.find('\n') {
                            let line = buffer[..line_end].to_string();
                            buffer = buffer[line_end + 1..].to_string();
                            forward_line(&line, &stream_id, &events_tx).await;
                        }
                    }
                    Some(Err(e)) => {
                        let _ = events_tx
                            .send(SourceEvent::StreamFailed {
                                stream_id: stream_id.clone(),
                                error: e.to_string(),
                            })
                            .await;
                        return;
                    }
                    None => {
                        // Trailing envelope without a newline terminator
                        let rest = std::mem::take(&mut buffer);
                        forward_line(&rest, &stream_id, &events_tx).await;
                        let _ = events_tx
                            .send(SourceEvent::StreamEnded {
                                stream_id: stream_id.clone(),
                            })
                            .await;
                        return;
                    }
                }
            }
        }
    });
}

async fn forward_line(line: &str, stream_id: &str, events_tx: &mpsc::Sender<SourceEvent>) {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return;
    }
    match classify_frame(trimmed) {
        Ok(frame) => {
            let _ = events_tx
                .send(SourceEvent::Inbound {
                    origin: EventOrigin::Stream {
                        stream_id: stream_id.to_string(),
                    },
                    frame,
                })
                .await;
        }
        Err(e) => {
            tracing::warn!(stream_id = %stream_id, error = %e, "dropping unrecognized stream envelope");
        }
    }
}
