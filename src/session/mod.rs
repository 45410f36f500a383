//! Session module.
//!
//! This module provides the main entry point: a [`Session`] that carries
//! RPCs, fire-and-forget calls and scope negotiation over a transport that
//! may drop and come back at any time.
//!
//! # Components
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Session`] | Connection lifecycle and request façade |
//! | [`SessionBuilder`] | Fluent configuration builder |
//! | [`SessionOptions`] | RPC timeout and server event names |
//! | [`Capability`] | Resolved scope or proxy reply |
//! | [`Deferred`] | Result that settles exactly once |
//! | [`EventRegistry`] | Lifecycle and server event listeners |
//!
//! # Example
//!
//! ```ignore
//! use rpc_session::{Manifest, Result, Session};
//!
//! # async fn example() -> Result<()> {
//! let session = Session::builder("ws://localhost:9000")
//!     .store(|_action: serde_json::Value| {})
//!     .build()?;
//!
//! session.on("disconnect", |_| println!("offline"))?;
//! session.connect("/app")?;
//!
//! let chat = session.scope("chat", Some(Manifest::new(["send", "history"]))).await?;
//! let history = chat.invoke("history", vec![]).await?.into_value()?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Submodules
// ============================================================================

/// Fluent builder pattern for session configuration.
pub mod builder;

/// Correlation tables for in-flight requests.
pub mod correlation;

/// Core session implementation.
pub mod core;

/// Deferred results.
pub mod deferred;

/// Listener registry.
pub mod events;

/// Session options.
pub mod options;

/// Pending-send queue.
pub mod queue;

/// Scope capabilities and cache.
pub mod scope;

/// Action dispatch target.
pub mod store;

// ============================================================================
// Re-exports
// ============================================================================

pub use builder::SessionBuilder;
pub use core::{ConnectionStatus, SendHandle, Session, WeakSession};
pub use deferred::{Deferred, Reply};
pub use events::{EventRegistry, LifecycleEvent, Listener, Subscription};
pub use options::SessionOptions;
pub use scope::{Capability, Manifest};
pub use store::ActionSink;
