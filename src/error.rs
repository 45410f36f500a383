//! Error types for the session.
//!
//! This module defines all error types used throughout the crate.
//!
//! # Usage
//!
//! All fallible operations return [`Result<T>`] which uses [`Error`]:
//!
//! ```ignore
//! use rpc_session::{Result, Session};
//!
//! async fn example(session: &Session) -> Result<()> {
//!     let profile = session.rpc("user", "getProfile", vec![42.into()]).await?;
//!     println!("{:?}", profile.into_value()?);
//!     Ok(())
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Configuration | [`Error::Config`], [`Error::InvalidHost`], [`Error::UnknownEvent`] |
//! | Connection | [`Error::ConnectionTerminated`], [`Error::Transport`], [`Error::ConnectionTimeout`], [`Error::SessionClosed`] |
//! | Remote | [`Error::Remote`], [`Error::UnknownOperation`], [`Error::RequestTimeout`] |
//! | Protocol | [`Error::Protocol`] |
//! | External | [`Error::Json`], [`Error::WebSocket`], [`Error::Url`] |

// ============================================================================
// Imports
// ============================================================================

use std::result::Result as StdResult;
use std::time::Duration;

use serde_json::Value;
use thiserror::Error;
use tokio_tungstenite::tungstenite::Error as WsError;

use crate::identifiers::RpcSerial;

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
///
/// All fallible operations in this crate return this type.
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
///
/// Each variant includes relevant context for debugging.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration error.
    ///
    /// Returned when session configuration is invalid.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    /// Host does not use a WebSocket scheme.
    #[error("Invalid host {host}. Host should start with ws:// or wss://")]
    InvalidHost {
        /// The rejected host.
        host: String,
    },

    /// Listener registered for an event the session never emits.
    #[error("Unknown event: {event}")]
    UnknownEvent {
        /// The unrecognized event name.
        event: String,
    },

    // ========================================================================
    // Connection Errors
    // ========================================================================
    /// Transport closed while work was outstanding.
    ///
    /// Recoverable: the application may call `reconnect`.
    #[error("Connection terminated")]
    ConnectionTerminated,

    /// Transport reported an error.
    ///
    /// Outstanding work is rejected with the reported detail.
    #[error("Transport error: {message}")]
    Transport {
        /// Detail reported by the transport.
        message: String,
    },

    /// Transport did not open within the connect timeout.
    #[error("Connection timeout after {timeout_ms}ms")]
    ConnectionTimeout {
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    /// The session was dropped before the result settled.
    #[error("Session closed")]
    SessionClosed,

    // ========================================================================
    // Remote Errors
    // ========================================================================
    /// Remote side answered with a failure.
    ///
    /// Carries the server-supplied payload verbatim.
    #[error("Remote error: {payload}")]
    Remote {
        /// Error payload from the server.
        payload: Value,
    },

    /// Operation is not part of the capability.
    #[error("Unknown operation {operation} in scope {scope}")]
    UnknownOperation {
        /// Scope the capability belongs to.
        scope: String,
        /// The rejected operation name.
        operation: String,
    },

    /// RPC was not answered within the configured timeout.
    #[error("Request {serial} timed out after {timeout_ms}ms")]
    RequestTimeout {
        /// The serial that timed out.
        serial: RpcSerial,
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    // ========================================================================
    // Protocol Errors
    // ========================================================================
    /// Protocol violation or unexpected packet.
    #[error("Protocol error: {message}")]
    Protocol {
        /// Description of the protocol violation.
        message: String,
    },

    // ========================================================================
    // External Errors
    // ========================================================================
    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] WsError),

    /// URL parse error.
    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a configuration error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates an invalid host error.
    #[inline]
    pub fn invalid_host(host: impl Into<String>) -> Self {
        Self::InvalidHost { host: host.into() }
    }

    /// Creates an unknown event error.
    #[inline]
    pub fn unknown_event(event: impl Into<String>) -> Self {
        Self::UnknownEvent {
            event: event.into(),
        }
    }

    /// Creates a transport error.
    #[inline]
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Creates a connection timeout error.
    #[inline]
    pub fn connection_timeout(after: Duration) -> Self {
        Self::ConnectionTimeout {
            timeout_ms: saturating_millis(after),
        }
    }

    /// Creates a remote error.
    #[inline]
    pub fn remote(payload: Value) -> Self {
        Self::Remote { payload }
    }

    /// Creates an unknown operation error.
    #[inline]
    pub fn unknown_operation(scope: impl Into<String>, operation: impl Into<String>) -> Self {
        Self::UnknownOperation {
            scope: scope.into(),
            operation: operation.into(),
        }
    }

    /// Creates a request timeout error.
    #[inline]
    pub fn request_timeout(serial: RpcSerial, after: Duration) -> Self {
        Self::RequestTimeout {
            serial,
            timeout_ms: saturating_millis(after),
        }
    }

    /// Creates a protocol error.
    #[inline]
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if this is a timeout error.
    #[inline]
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            Self::ConnectionTimeout { .. } | Self::RequestTimeout { .. }
        )
    }

    /// Returns `true` if this is a connection error.
    #[inline]
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::ConnectionTerminated
                | Self::Transport { .. }
                | Self::ConnectionTimeout { .. }
                | Self::WebSocket(_)
        )
    }

    /// Returns `true` if the server rejected the request.
    #[inline]
    #[must_use]
    pub fn is_remote(&self) -> bool {
        matches!(self, Self::Remote { .. })
    }

    /// Returns `true` if this error is recoverable.
    ///
    /// Recoverable errors may succeed after a reconnect or retry.
    #[inline]
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::ConnectionTerminated
                | Self::Transport { .. }
                | Self::ConnectionTimeout { .. }
                | Self::RequestTimeout { .. }
        )
    }
}

/// Whole milliseconds in `duration`, saturating at `u64::MAX`.
fn saturating_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

// ============================================================================
// Tests
// ============================================================================
