//! Reactive Store
//!
//! Generic state container with immutable-snapshot reads and synchronous,
//! registration-ordered subscriber notification. The task and message
//! stores are built on top of this.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

/// Identifier returned by [`Store::subscribe`], used to unsubscribe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(u64);

type Listener<S> = Arc<dyn Fn(&S) + Send + Sync>;

struct Subscriber<S> {
    id: SubscriberId,
    listener: Listener<S>,
}

/// A generic reactive state container.
///
/// `get` returns a cloned snapshot; mutating the snapshot never touches the
/// store. `update` applies a mutation atomically, then notifies subscribers
/// synchronously in registration order with a fresh snapshot. Notification
/// is not coalesced, and subscribing does not imply an initial call.
pub struct Store<S> {
    state: RwLock<S>,
    subscribers: Mutex<Vec<Subscriber<S>>>,
    next_id: AtomicU64,
}

impl<S: Clone + Send + Sync + 'static> Store<S> {
    /// Create a store with the given initial state
    pub fn new(initial: S) -> Self {
        Self {
            state: RwLock::new(initial),
            subscribers: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Snapshot the current state
    pub fn get(&self) -> S {
        self.state.read().expect("store lock poisoned").clone()
    }

    /// Mutate the state atomically, then notify subscribers.
    ///
    /// The closure's return value is passed through, so operations can
    /// report what they changed.
    pub fn update<R>(&self, f: impl FnOnce(&mut S) -> R) -> R {
        let (result, snapshot) = {
            let mut state = self.state.write().expect("store lock poisoned");
            let result = f(&mut state);
            (result, state.clone())
        };
        self.notify(&snapshot);
        result
    }

    /// Register a listener; it is not called until the next mutation
    pub fn subscribe(&self, listener: impl Fn(&S) + Send + Sync + 'static) -> SubscriberId {
        let id = SubscriberId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.subscribers
            .lock()
            .expect("subscriber lock poisoned")
            .push(Subscriber {
                id,
                listener: Arc::new(listener),
            });
        id
    }

    /// Remove a listener; unknown ids are ignored
    pub fn unsubscribe(&self, id: SubscriberId) {
        self.subscribers
            .lock()
            .expect("subscriber lock poisoned")
            .retain(|s| s.id != id);
    }

    fn notify(&self, snapshot: &S) {
        // Clone the listener list so handlers can subscribe/unsubscribe
        // without deadlocking
        let listeners: Vec<Listener<S>> = self
            .subscribers
            .lock()
            .expect("subscriber lock poisoned")
            .iter()
            .map(|s| Arc::clone(&s.listener))
            .collect();
        for listener in listeners {
            listener(snapshot);
        }
    }
}

impl<S: Clone + Send + Sync + Default + 'static> Default for Store<S> {
    fn default() -> Self {
        Self::new(S::default())
    }
}
