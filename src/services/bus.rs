//! Event Bus
//!
//! In-process publish/subscribe for coarse-grained UI signals. Dispatch is
//! synchronous in registration order; a panicking handler is isolated and
//! logged so the remaining handlers still run. There is no replay for late
//! subscribers.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::models::notification::Notification;

/// Coarse-grained signals emitted for UI views
#[derive(Debug, Clone)]
pub enum UiEvent {
    TaskStart {
        task_id: String,
    },
    StepProgress {
        task_id: String,
        progress: u8,
    },
    TaskComplete {
        task_id: String,
        result: Option<serde_json::Value>,
    },
    TaskError {
        task_id: String,
        error: Option<String>,
    },
    Notification(Notification),
    SettingsModalRequested,
}

impl UiEvent {
    pub fn kind(&self) -> UiEventKind {
        match self {
            UiEvent::TaskStart { .. } => UiEventKind::TaskStart,
            UiEvent::StepProgress { .. } => UiEventKind::StepProgress,
            UiEvent::TaskComplete { .. } => UiEventKind::TaskComplete,
            UiEvent::TaskError { .. } => UiEventKind::TaskError,
            UiEvent::Notification(_) => UiEventKind::Notification,
            UiEvent::SettingsModalRequested => UiEventKind::SettingsModalRequested,
        }
    }
}

/// Subscription key for [`UiEvent`] variants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UiEventKind {
    TaskStart,
    StepProgress,
    TaskComplete,
    TaskError,
    Notification,
    SettingsModalRequested,
}

impl std::fmt::Display for UiEventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UiEventKind::TaskStart => write!(f, "taskStart"),
            UiEventKind::StepProgress => write!(f, "stepProgress"),
            UiEventKind::TaskComplete => write!(f, "taskComplete"),
            UiEventKind::TaskError => write!(f, "taskError"),
            UiEventKind::Notification => write!(f, "notification"),
            UiEventKind::SettingsModalRequested => write!(f, "settings-modal-requested"),
        }
    }
}

/// Identifier returned by `on`/`once`, used with `off`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

type Handler = Arc<dyn Fn(&UiEvent) + Send + Sync>;

struct Registration {
    id: HandlerId,
    kind: UiEventKind,
    once: bool,
    handler: Handler,
}

/// In-process publish/subscribe bus
#[derive(Default)]
pub struct EventBus {
    handlers: Mutex<Vec<Registration>>,
    next_id: AtomicU64,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            handlers: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register a handler for every emission of `kind`
    pub fn on(&self, kind: UiEventKind, handler: impl Fn(&UiEvent) + Send + Sync + 'static) -> HandlerId {
        self.register(kind, false, handler)
    }

    /// Register a handler removed after its first invocation
    pub fn once(
        &self,
        kind: UiEventKind,
        handler: impl Fn(&UiEvent) + Send + Sync + 'static,
    ) -> HandlerId {
        self.register(kind, true, handler)
    }

    /// Remove a handler; unknown ids are ignored
    pub fn off(&self, id: HandlerId) {
        self.handlers
            .lock()
            .expect("bus lock poisoned")
            .retain(|r| r.id != id);
    }

    /// Dispatch an event to matching handlers, in registration order
    pub fn emit(&self, event: UiEvent) {
        let kind = event.kind();
        let batch: Vec<Handler> = {
            let mut handlers = self.handlers.lock().expect("bus lock poisoned");
            let batch = handlers
                .iter()
                .filter(|r| r.kind == kind)
                .map(|r| Arc::clone(&r.handler))
                .collect();
            // Once-handlers are consumed before dispatch so a re-entrant
            // emit cannot fire them twice
            handlers.retain(|r| !(r.once && r.kind == kind));
            batch
        };

        for handler in batch {
            if catch_unwind(AssertUnwindSafe(|| handler(&event))).is_err() {
                tracing::error!(event = %kind, "event handler panicked, continuing dispatch");
            }
        }
    }

    fn register(
        &self,
        kind: UiEventKind,
        once: bool,
        handler: impl Fn(&UiEvent) + Send + Sync + 'static,
    ) -> HandlerId {
        let id = HandlerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.handlers
            .lock()
            .expect("bus lock poisoned")
            .push(Registration {
                id,
                kind,
                once,
                handler: Arc::new(handler),
            });
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn start_event() -> UiEvent {
        UiEvent::TaskStart {
            task_id: "A".to_string(),
        }
    }

    #[test]
    fn test_on_and_emit() {
        let bus = EventBus::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let counted = Arc::clone(&calls);
        bus.on(UiEventKind::TaskStart, move |_| {
            counted.fetch_add(1, Ordering::SeqCst);
        });

        bus.emit(start_event());
        bus.emit(start_event());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_emit_only_matching_kind() {
        let bus = EventBus::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let counted = Arc::clone(&calls);
        bus.on(UiEventKind::TaskComplete, move |_| {
            counted.fetch_add(1, Ordering::SeqCst);
        });

        bus.emit(start_event());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_once_fires_a_single_time() {
        let bus = EventBus::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let counted = Arc::clone(&calls);
        bus.once(UiEventKind::TaskStart, move |_| {
            counted.fetch_add(1, Ordering::SeqCst);
        });

        bus.emit(start_event());
        bus.emit(start_event());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_off_removes_handler() {
        let bus = EventBus::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let counted = Arc::clone(&calls);
        let id = bus.on(UiEventKind::TaskStart, move |_| {
            counted.fetch_add(1, Ordering::SeqCst);
        });

        bus.off(id);
        bus.emit(start_event());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_panicking_handler_does_not_stop_dispatch() {
        let bus = EventBus::new();
        let calls = Arc::new(AtomicUsize::new(0));

        bus.on(UiEventKind::TaskStart, |_| panic!("boom"));
        let counted = Arc::clone(&calls);
        bus.on(UiEventKind::TaskStart, move |_| {
            counted.fetch_add(1, Ordering::SeqCst);
        });

        bus.emit(start_event());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_dispatch_in_registration_order() {
        let bus = EventBus::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        for tag in ["a", "b", "c"] {
            let order = Arc::clone(&order);
            bus.on(UiEventKind::TaskStart, move |_| {
                order.lock().unwrap().push(tag);
            });
        }

        bus.emit(start_event());
        assert_eq!(*order.lock().unwrap(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_kind_display() {
        assert_eq!(UiEventKind::TaskStart.to_string(), "taskStart");
        assert_eq!(
            UiEventKind::SettingsModalRequested.to_string(),
            "settings-modal-requested"
        );
    }
}
