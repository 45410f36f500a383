//! Type-safe identifiers for session entities.
//!
//! Newtype wrappers keep RPC serials, scope serials, transport epochs,
//! queue entries and listeners from being mixed up at compile time.
//!
//! | Type | Scope | Allocated by |
//! |------|-------|--------------|
//! | [`RpcSerial`] | Session lifetime | RPC correlation table |
//! | [`ScopeSerial`] | Session lifetime | Scope correlation table |
//! | [`TransportId`] | Session lifetime | Connection lifecycle |
//! | [`QueueKey`] | Session lifetime | Pending-send queue |
//! | [`ListenerId`] | Registry lifetime | Event registry |

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use serde::{Deserialize, Serialize};

// ============================================================================
// Serial
// ============================================================================

/// A counter-issued identifier.
///
/// Implemented by every identifier that a monotonic counter hands out.
pub trait Serial: Copy + Eq + std::hash::Hash + fmt::Debug {
    /// Wraps a raw counter value.
    fn from_raw(raw: u64) -> Self;

    /// Returns the raw counter value.
    fn raw(self) -> u64;
}

macro_rules! serial_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(u64);

        impl $name {
            /// Creates an identifier from a raw value.
            #[inline]
            #[must_use]
            pub const fn new(raw: u64) -> Self {
                Self(raw)
            }

            /// Returns the raw value.
            #[inline]
            #[must_use]
            pub const fn as_u64(self) -> u64 {
                self.0
            }
        }

        impl Serial for $name {
            #[inline]
            fn from_raw(raw: u64) -> Self {
                Self(raw)
            }

            #[inline]
            fn raw(self) -> u64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

serial_id!(
    /// Correlation serial of an RPC request.
    RpcSerial
);

serial_id!(
    /// Correlation serial of a scope request.
    ScopeSerial
);

serial_id!(
    /// Epoch of one physical transport.
    ///
    /// Events tagged with a superseded id are ignored.
    TransportId
);

serial_id!(
    /// Handle of one not-yet-transmitted frame.
    QueueKey
);

serial_id!(
    /// Handle of one registered listener.
    ListenerId
);

// ============================================================================
// Counter
// ============================================================================

/// Monotonic counter. The first issued value is 1; 0 is never issued.
#[derive(Debug, Default, Clone)]
pub struct Counter {
    last: u64,
}

impl Counter {
    /// Creates a counter starting at 0.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self { last: 0 }
    }

    /// Issues the next identifier.
    #[inline]
    pub fn issue<S: Serial>(&mut self) -> S {
        self.last += 1;
        S::from_raw(self.last)
    }

    /// Returns the last issued raw value (0 if none).
    #[inline]
    #[must_use]
    pub const fn last(&self) -> u64 {
        self.last
    }
}

// ============================================================================
// Tests
// ============================================================================
