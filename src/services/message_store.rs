//! Message Store
//!
//! The ordered chat timeline. Append-mostly: the only mutable entry is the
//! single message currently accumulating a streamed thought or reply.
//! Retention keeps the newest N messages after every add, cleanup drops
//! entries past the age limit, and the filter carries a last-applied guard
//! plus a debounce so re-entrant filter requests are no-ops.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use chrono::Utc;

use crate::models::message::{FilterMode, Message, MessageKind, MessagePatch, MessageRole};
use crate::services::store::{Store, SubscriberId};

const FILTER_DEBOUNCE: Duration = Duration::from_millis(100);

/// Snapshot of the timeline and its filter mode
#[derive(Debug, Clone)]
pub struct MessagesState {
    pub timeline: Vec<Message>,
    pub filter: FilterMode,
}

impl Default for MessagesState {
    fn default() -> Self {
        Self {
            timeline: Vec::new(),
            filter: FilterMode::All,
        }
    }
}

/// Store for the chat timeline
pub struct MessageStore {
    store: Store<MessagesState>,
    retention: usize,
    max_age: chrono::Duration,
    last_filter_pass: Mutex<Option<Instant>>,
    /// Id of the message currently accumulating streamed content
    active_stream: Mutex<Option<String>>,
}

impl MessageStore {
    pub fn new(retention: usize, max_age_days: i64) -> Self {
        Self {
            store: Store::new(MessagesState::default()),
            retention,
            max_age: chrono::Duration::days(max_age_days),
            last_filter_pass: Mutex::new(None),
            active_stream: Mutex::new(None),
        }
    }

    /// Seed the timeline from a previously loaded history
    pub fn with_history(retention: usize, max_age_days: i64, history: Vec<Message>) -> Self {
        let store = Self::new(retention, max_age_days);
        store.store.update(|state| {
            state.timeline = history;
            let retain = store.retention;
            if state.timeline.len() > retain {
                let overflow = state.timeline.len() - retain;
                state.timeline.drain(0..overflow);
            }
        });
        store
    }

    /// Append a message, enforcing the retention cap
    pub fn add_message(&self, message: Message) {
        let retention = self.retention;
        self.store.update(|state| {
            state.timeline.push(message.clone());
            if state.timeline.len() > retention {
                let overflow = state.timeline.len() - retention;
                state.timeline.drain(0..overflow);
            }
        });
    }

    /// Create and append a message, returning its id
    pub fn create_message(
        &self,
        role: MessageRole,
        kind: MessageKind,
        content: impl Into<String>,
        id: Option<String>,
    ) -> String {
        let message = match id {
            Some(id) => Message::with_id(id, role, kind, content),
            None => Message::new(role, kind, content),
        };
        let id = message.id.clone();
        self.add_message(message);
        id
    }

    /// Patch a message in place. Returns whether the message was found.
    pub fn update_message(&self, id: &str, patch: MessagePatch) -> bool {
        self.store.update(|state| {
            match state.timeline.iter_mut().find(|m| m.id == id) {
                Some(message) => {
                    if let Some(content) = &patch.content {
                        message.content = content.clone();
                    }
                    if let Some(chunk) = &patch.append {
                        message.content.push_str(chunk);
                    }
                    if let Some(kind) = patch.kind {
                        message.kind = kind;
                    }
                    if patch.restamp {
                        message.timestamp = Utc::now();
                    }
                    true
                }
                None => false,
            }
        })
    }

    /// Append a chunk of streamed content, creating the accumulating
    /// message on the first token. Returns the message id.
    pub fn append_streaming(&self, kind: MessageKind, chunk: &str) -> String {
        let mut active = self.active_stream.lock().expect("stream lock poisoned");

        if let Some(id) = active.clone() {
            let same_kind = self
                .store
                .get()
                .timeline
                .iter()
                .any(|m| m.id == id && m.kind == kind);
            if same_kind {
                self.update_message(
                    &id,
                    MessagePatch {
                        append: Some(chunk.to_string()),
                        ..Default::default()
                    },
                );
                return id;
            }
            // Kind switched mid-stream: finalize the old accumulator first
            self.finalize_message(&id);
        }

        let id = self.create_message(MessageRole::Assistant, kind, chunk, None);
        *active = Some(id.clone());
        id
    }

    /// Finalize the accumulating message: a thought flips to chat, and the
    /// timestamp is stamped. Returns the id and final content.
    pub fn finalize_streaming(&self) -> Option<(String, String)> {
        let id = self
            .active_stream
            .lock()
            .expect("stream lock poisoned")
            .take()?;
        self.finalize_message(&id);
        let content = self
            .store
            .get()
            .timeline
            .iter()
            .find(|m| m.id == id)
            .map(|m| m.content.clone())
            .unwrap_or_default();
        Some((id, content))
    }

    fn finalize_message(&self, id: &str) {
        self.update_message(
            id,
            MessagePatch {
                kind: Some(MessageKind::Chat),
                restamp: true,
                ..Default::default()
            },
        );
    }

    /// Whether a message is still accumulating streamed content
    pub fn has_active_stream(&self) -> bool {
        self.active_stream
            .lock()
            .expect("stream lock poisoned")
            .is_some()
    }

    /// Switch the filter mode.
    ///
    /// A request for the current mode is a no-op, and a request within the
    /// debounce window updates the mode without a classification pass.
    /// Returns whether a classification pass ran.
    pub fn filter(&self, mode: FilterMode) -> bool {
        if self.store.get().filter == mode {
            return false;
        }

        let debounced = {
            let mut last = self.last_filter_pass.lock().expect("filter lock poisoned");
            match *last {
                Some(at) if at.elapsed() < FILTER_DEBOUNCE => true,
                _ => {
                    *last = Some(Instant::now());
                    false
                }
            }
        };

        self.store.update(|state| state.filter = mode);
        !debounced
    }

    /// The timeline as seen through the current filter
    pub fn visible(&self) -> Vec<Message> {
        let state = self.store.get();
        state
            .timeline
            .into_iter()
            .filter(|m| state.filter.matches(m))
            .collect()
    }

    /// Drop messages older than the age limit. Returns how many were
    /// removed.
    pub fn cleanup(&self) -> usize {
        let cutoff = Utc::now() - self.max_age;
        self.store.update(|state| {
            let before = state.timeline.len();
            state.timeline.retain(|m| m.timestamp >= cutoff);
            before - state.timeline.len()
        })
    }

    pub fn snapshot(&self) -> MessagesState {
        self.store.get()
    }

    pub fn subscribe(
        &self,
        listener: impl Fn(&MessagesState) + Send + Sync + 'static,
    ) -> SubscriberId {
        self.store.subscribe(listener)
    }

    pub fn unsubscribe(&self, id: SubscriberId) {
        self.store.unsubscribe(id)
    }
}
