//! Network reachability adapter.
//!
//! Turns online/offline edges into session calls: regaining reachability
//! reconnects a session that was ever connected, losing it closes the
//! current transport. No retry is scheduled here; recovery waits for the
//! next online edge.
//!
//! # Example
//!
//! ```ignore
//! use tokio::sync::watch;
//! use rpc_session::Reachability;
//!
//! let (online_tx, online_rx) = watch::channel(true);
//! let task = Reachability::spawn(&session, online_rx);
//!
//! online_tx.send(false)?; // closes the transport
//! online_tx.send(true)?;  // reconnects
//! ```

// ============================================================================
// Imports
// ============================================================================

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::session::{Session, WeakSession};

// ============================================================================
// Reachability
// ============================================================================

/// Reacts to reachability edges on behalf of a session.
///
/// Holds the session weakly.
#[derive(Debug, Clone)]
pub struct Reachability {
    session: WeakSession,
}

impl Reachability {
    /// Creates an adapter for `session`.
    #[inline]
    #[must_use]
    pub fn new(session: &Session) -> Self {
        Self {
            session: session.downgrade(),
        }
    }

    /// Reachability restored: reconnects if a transport was ever created.
    ///
    /// Returns `true` if a reconnect was issued.
    pub fn online(&self) -> bool {
        let Some(session) = self.session.upgrade() else {
            return false;
        };
        if !session.has_connected() {
            debug!("Online before any connect, nothing to restore");
            return false;
        }

        info!(host = %session.host(), "Network online, reconnecting");
        session.reconnect()
    }

    /// Reachability lost: closes the current transport, if any.
    ///
    /// Returns `true` if a transport was closed.
    pub fn offline(&self) -> bool {
        let Some(session) = self.session.upgrade() else {
            return false;
        };
        if !session.has_transport() {
            return false;
        }

        info!(host = %session.host(), "Network offline, closing transport");
        session.close();
        true
    }

    /// Spawns a task that follows `online` edges.
    ///
    /// The initial value is not treated as an edge. The task ends when the
    /// sender is dropped or the session is gone.
    pub fn spawn(session: &Session, mut online: watch::Receiver<bool>) -> JoinHandle<()> {
        let adapter = Self::new(session);

        tokio::spawn(async move {
            let mut last = *online.borrow_and_update();

            while online.changed().await.is_ok() {
                if adapter.session.upgrade().is_none() {
                    break;
                }

                let now = *online.borrow_and_update();
                if now == last {
                    continue;
                }
                last = now;

                if now {
                    adapter.online();
                } else {
                    adapter.offline();
                }
            }

            debug!("Reachability task finished");
        })
    }
}

// ============================================================================
// Tests
// ============================================================================
