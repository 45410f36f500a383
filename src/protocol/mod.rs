//! Session protocol message types.
//!
//! This module defines the packets exchanged between the session (client)
//! and the server, and the codec that turns them into frames.
//!
//! # Protocol Overview
//!
//! | Packet | Direction | Purpose |
//! |--------|-----------|---------|
//! | `Call` | Client → Server | Fire-and-forget invocation |
//! | `Rpc` | Client → Server | Correlated invocation |
//! | `Scope` | Client → Server | Capability negotiation |
//! | `RpcResponse` | Server → Client | RPC result, proxy list, or failure |
//! | `ScopeResponse` | Server → Client | Scope operation list or failure |
//! | `Event` | Server → Client | Named notification for listeners |
//! | `Action` | Server → Client | State-store action |
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `codec` | Codec trait and JSON codec |
//! | `packet` | Outbound and inbound packet types |

// ============================================================================
// Submodules
// ============================================================================

/// Frame codec.
pub mod codec;

/// Packet types.
pub mod packet;

// ============================================================================
// Re-exports
// ============================================================================

pub use codec::{Codec, JsonCodec};
pub use packet::{Inbound, Outbound, RpcOutcome, RpcStatus, operation_names};
