//! Session behaviour options.
//!
//! # Example
//!
//! ```ignore
//! use std::time::Duration;
//! use rpc_session::SessionOptions;
//!
//! let options = SessionOptions::new()
//!     .with_rpc_timeout(Duration::from_secs(10))
//!     .with_event("presence");
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

// ============================================================================
// SessionOptions
// ============================================================================

/// Options controlling request handling and event names.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionOptions {
    /// Reject an RPC with `RequestTimeout` if it is not answered in time.
    ///
    /// The timer starts when the RPC is issued, not when it is first
    /// awaited. RPC results are then tokio timers and must be polled inside
    /// a tokio runtime. `None` waits until a response or a transport
    /// teardown.
    pub rpc_timeout: Option<Duration>,

    /// Server event names listeners may register for, in addition to the
    /// lifecycle events.
    pub events: Vec<String>,
}

// ============================================================================
// Builder Methods
// ============================================================================

impl SessionOptions {
    /// Creates options with no RPC timeout and no server events.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self {
            rpc_timeout: None,
            events: Vec::new(),
        }
    }

    /// Sets the RPC timeout.
    #[inline]
    #[must_use]
    pub fn with_rpc_timeout(mut self, timeout: Duration) -> Self {
        self.rpc_timeout = Some(timeout);
        self
    }

    /// Declares one server event name.
    #[inline]
    #[must_use]
    pub fn with_event(mut self, event: impl Into<String>) -> Self {
        self.events.push(event.into());
        self
    }

    /// Declares several server event names.
    #[must_use]
    pub fn with_events<I, S>(mut self, events: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.events.extend(events.into_iter().map(Into::into));
        self
    }
}

// ============================================================================
// Tests
// ============================================================================
