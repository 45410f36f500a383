//! Listener registry for lifecycle and server events.
//!
//! The registry knows a fixed set of event names: the lifecycle events
//! ([`LifecycleEvent`]) plus whatever server events the session was
//! configured with. Registering for any other name fails.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde_json::Value;
use tracing::trace;

use crate::error::{Error, Result};
use crate::identifiers::{Counter, ListenerId};

// ============================================================================
// Types
// ============================================================================

/// Event listener. Receives the event payload.
pub type Listener = Arc<dyn Fn(&Value) + Send + Sync>;

// ============================================================================
// LifecycleEvent
// ============================================================================

/// Events the session announces about its transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleEvent {
    /// A transport opened.
    Connect,
    /// A transport closed.
    Disconnect,
    /// A transport failed. Payload is the detail string.
    Error,
}

impl LifecycleEvent {
    /// Every lifecycle event.
    pub const ALL: [Self; 3] = [Self::Connect, Self::Disconnect, Self::Error];

    /// Returns the event name.
    #[inline]
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Connect => "connect",
            Self::Disconnect => "disconnect",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for LifecycleEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// EventRegistry
// ============================================================================

#[derive(Default)]
struct Listeners {
    ids: Counter,
    by_event: FxHashMap<String, Vec<(ListenerId, Listener)>>,
}

/// Registry of listeners keyed by event name.
pub struct EventRegistry {
    listeners: Mutex<Listeners>,
}

impl fmt::Debug for EventRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let listeners = self.listeners.lock();
        let mut events: Vec<_> = listeners.by_event.keys().collect();
        events.sort();
        f.debug_struct("EventRegistry")
            .field("events", &events)
            .finish_non_exhaustive()
    }
}

impl EventRegistry {
    /// Creates a registry knowing the lifecycle events plus `server_events`.
    pub fn new<I, S>(server_events: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut by_event: FxHashMap<String, Vec<(ListenerId, Listener)>> = FxHashMap::default();
        for event in LifecycleEvent::ALL {
            by_event.insert(event.as_str().to_owned(), Vec::new());
        }
        for event in server_events {
            by_event.entry(event.into()).or_default();
        }

        Self {
            listeners: Mutex::new(Listeners {
                ids: Counter::new(),
                by_event,
            }),
        }
    }

    /// Returns `true` if `event` may be listened to.
    #[must_use]
    pub fn is_known(&self, event: &str) -> bool {
        self.listeners.lock().by_event.contains_key(event)
    }

    /// Registers `listener` for `event`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownEvent`] if `event` is not known.
    pub fn add(&self, event: &str, listener: Listener) -> Result<ListenerId> {
        let mut listeners = self.listeners.lock();
        let id = listeners.ids.issue();

        let slot = listeners
            .by_event
            .get_mut(event)
            .ok_or_else(|| Error::unknown_event(event))?;
        slot.push((id, listener));

        trace!(%event, listener = %id, "Listener added");
        Ok(id)
    }

    /// Removes listener `id` from `event`. Returns `false` if it was not registered.
    pub fn remove(&self, event: &str, id: ListenerId) -> bool {
        let mut listeners = self.listeners.lock();
        let Some(slot) = listeners.by_event.get_mut(event) else {
            return false;
        };

        let before = slot.len();
        slot.retain(|(existing, _)| *existing != id);
        before != slot.len()
    }

    /// Calls every listener of `event` with `payload`, in registration order.
    ///
    /// Listeners run outside the registry lock and may add or remove
    /// listeners. Unknown events are ignored.
    pub fn emit(&self, event: &str, payload: &Value) {
        let snapshot: Vec<Listener> = {
            let listeners = self.listeners.lock();
            match listeners.by_event.get(event) {
                Some(slot) => slot.iter().map(|(_, l)| Arc::clone(l)).collect(),
                None => {
                    trace!(%event, "No such event, emit ignored");
                    return;
                }
            }
        };

        for listener in snapshot {
            listener(payload);
        }
    }

    /// Returns the number of listeners on `event`.
    #[must_use]
    pub fn listener_count(&self, event: &str) -> usize {
        self.listeners
            .lock()
            .by_event
            .get(event)
            .map_or(0, Vec::len)
    }
}

// ============================================================================
// Subscription
// ============================================================================

/// Handle to one registered listener.
///
/// Dropping it leaves the listener registered; call
/// [`Subscription::unsubscribe`] to remove it.
#[derive(Debug, Clone)]
pub struct Subscription {
    event: String,
    id: ListenerId,
    registry: Weak<EventRegistry>,
}

impl Subscription {
    pub(crate) fn new(event: impl Into<String>, id: ListenerId, registry: &Arc<EventRegistry>) -> Self {
        Self {
            event: event.into(),
            id,
            registry: Arc::downgrade(registry),
        }
    }

    /// Returns the event name.
    #[inline]
    #[must_use]
    pub fn event(&self) -> &str {
        &self.event
    }

    /// Returns the listener id.
    #[inline]
    #[must_use]
    pub fn id(&self) -> ListenerId {
        self.id
    }

    /// Removes the listener. Returns `false` if it was already removed.
    pub fn unsubscribe(&self) -> bool {
        self.registry
            .upgrade()
            .is_some_and(|registry| registry.remove(&self.event, self.id))
    }
}

// ============================================================================
// Tests
// ============================================================================
