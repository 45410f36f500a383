//! RPC Session - reconnection-safe RPC and scopes over WebSocket.
//!
//! This library keeps one logical client-to-server session alive across
//! any number of physical WebSocket connections.
//!
//! # Architecture
//!
//! The session sits between the application and a replaceable transport:
//!
//! - **Application**: issues calls, RPCs and scope requests, listens to events
//! - **Session**: correlates responses, queues sends while offline, caches scopes
//! - **Transport**: one physical channel per connection epoch
//!
//! Key design principles:
//!
//! - Responses are matched by serial, never by arrival order
//! - Sends issued while offline are flushed in order on the next open
//! - Every close or error settles all outstanding work before returning
//! - Scope capabilities are cached per connection epoch and shared by identity
//!
//! # Quick Start
//!
//! ```no_run
//! use rpc_session::{Result, Session};
//! use serde_json::Value;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let session = Session::builder("ws://localhost:9000")
//!         .store(|action: Value| println!("action: {action}"))
//!         .build()?;
//!
//!     session.on("connect", |_| println!("online"))?;
//!     session.connect("/app")?;
//!
//!     // Issued before the transport opens: queued, then flushed
//!     let profile = session.rpc("user", "getProfile", vec![42.into()]).await?;
//!     println!("{:?}", profile.into_value()?);
//!
//!     let chat = session.scope("chat", None).await?;
//!     chat.invoke("send", vec!["hello".into()]).await?;
//!
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`session`] | [`Session`], builder, scopes and deferred results |
//! | [`network`] | Reachability adapter |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`identifiers`] | Type-safe ID wrappers |
//! | [`protocol`] | Packet types and codec |
//! | [`transport`] | Transport seam, WebSocket and in-memory transports |

// ============================================================================
// Modules
// ============================================================================

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Type-safe identifiers for session entities.
///
/// Newtype wrappers prevent mixing incompatible IDs at compile time.
pub mod identifiers;

/// Network reachability adapter.
pub mod network;

/// Packet types and frame codec.
pub mod protocol;

/// Session: lifecycle, correlation, queue and scope cache.
///
/// Use [`Session::builder()`] to create a configured session.
pub mod session;

/// Transport layer.
///
/// The [`transport::Connector`] seam plus WebSocket and in-memory transports.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

// Session types
pub use session::{
    ActionSink, Capability, ConnectionStatus, Deferred, LifecycleEvent, Manifest, Reply,
    SendHandle, Session, SessionBuilder, SessionOptions, Subscription, WeakSession,
};

// Network types
pub use network::Reachability;

// Error types
pub use error::{Error, Result};

// Identifier types
pub use identifiers::{ListenerId, QueueKey, RpcSerial, ScopeSerial, TransportId};

// Protocol types
pub use protocol::{Codec, Inbound, JsonCodec, Outbound};

// Transport types
pub use transport::{Connector, MemoryConnector, MemoryPeer, Transport, TransportEvents, WsConnector};
