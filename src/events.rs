//! Publish/subscribe bus for connection, auth and domain lifecycle signals.
//!
//! Listeners are plain shared closures. Identity is the `Arc` itself, so
//! the handle passed to [`EventBus::on`] is the one to pass to
//! [`EventBus::off`]. Each [`crate::Client`] owns its own bus; nothing here
//! is process-wide.
//!
//! ```
//! use std::sync::Arc;
//! use modelhub::events::{EventBus, EventPayload, Listener};
//!
//! let bus = EventBus::new();
//! let listener: Listener = Arc::new(|payload: &EventPayload| {
//!     println!("got {:?}", payload);
//! });
//! bus.on("model_uploaded", listener.clone());
//! bus.emit("model_uploaded", EventPayload::Empty);
//! bus.off("model_uploaded", &listener);
//! ```

use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;

use crate::error::ClientError;

/// Emitted once for every normalized error raised to a caller.
pub const ERROR: &str = "error";
/// Emitted by [`EventBus::close`] to the listeners registered before the call.
pub const DISCONNECTED: &str = "disconnected";
/// Emitted when the active bearer identity changes.
pub const IDENTITY_CHANGED: &str = "identity_changed";

/// Value handed to every listener of an emission.
#[derive(Debug, Clone)]
pub enum EventPayload {
    Empty,
    Data(Value),
    Error(ClientError),
}

impl EventPayload {
    pub fn as_error(&self) -> Option<&ClientError> {
        match self {
            EventPayload::Error(err) => Some(err),
            _ => None,
        }
    }

    pub fn as_data(&self) -> Option<&Value> {
        match self {
            EventPayload::Data(value) => Some(value),
            _ => None,
        }
    }
}

/// A registered callback. Registration and removal compare by pointer.
pub type Listener = Arc<dyn Fn(&EventPayload) + Send + Sync>;

type Registry = BTreeMap<String, Vec<Listener>>;

/// Ordered listener registry with synchronous dispatch.
#[derive(Clone, Default)]
pub struct EventBus {
    listeners: Arc<Mutex<Registry>>,
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let registry = self.listeners.lock();
        let counts: BTreeMap<&str, usize> = registry
            .iter()
            .map(|(event, list)| (event.as_str(), list.len()))
            .collect();
        f.debug_struct("EventBus").field("listeners", &counts).finish()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `listener` for `event`. The same handle may be registered
    /// more than once and is then invoked once per registration.
    pub fn on(&self, event: impl Into<String>, listener: Listener) {
        self.listeners
            .lock()
            .entry(event.into())
            .or_default()
            .push(listener);
    }

    /// Remove the most recent registration of `listener` for `event`.
    /// Returns whether anything was removed.
    pub fn off(&self, event: &str, listener: &Listener) -> bool {
        let mut registry = self.listeners.lock();
        let Some(list) = registry.get_mut(event) else {
            return false;
        };
        let Some(pos) = list.iter().rposition(|l| Arc::ptr_eq(l, listener)) else {
            return false;
        };
        list.remove(pos);
        if list.is_empty() {
            registry.remove(event);
        }
        true
    }

    /// Invoke every listener registered for `event`, in registration order.
    ///
    /// The registry is snapshotted first so listeners may call back into the
    /// bus. A panicking listener is logged and skipped; the remaining
    /// listeners still run. Returns the number of listeners invoked.
    pub fn emit(&self, event: &str, payload: EventPayload) -> usize {
        let snapshot: Vec<Listener> = match self.listeners.lock().get(event) {
            Some(list) => list.clone(),
            None => return 0,
        };
        dispatch(event, &snapshot, &payload)
    }

    pub fn listener_count(&self, event: &str) -> usize {
        self.listeners.lock().get(event).map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.lock().is_empty()
    }

    /// Deregister every listener, then deliver one final `disconnected`
    /// emission to the `disconnected` listeners that existed before the call.
    pub fn close(&self) {
        let previous = std::mem::take(&mut *self.listeners.lock());
        if let Some(list) = previous.get(DISCONNECTED) {
            dispatch(DISCONNECTED, list, &EventPayload::Empty);
        }
        tracing::debug!(events = previous.len(), "event bus closed");
    }
}

fn dispatch(event: &str, listeners: &[Listener], payload: &EventPayload) -> usize {
    for listener in listeners {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| listener(payload)));
        if outcome.is_err() {
            tracing::error!(event, "event listener panicked; continuing with remaining listeners");
        }
    }
    listeners.len()
}
