//! Packet vocabulary exchanged with the server.
//!
//! Outbound packets are produced by the session; inbound packets are
//! produced by the codec and dispatched by the session.
//!
//! # Format
//!
//! Every packet is a JSON object tagged by `type`:
//!
//! ```json
//! {"type": "call", "scope": "chat", "operation": "typing", "args": []}
//! {"type": "rpc", "serial": 1, "scope": "user", "operation": "getProfile", "args": [42]}
//! {"type": "scope", "serial": 1, "name": "chat", "needsManifest": true}
//! {"type": "rpcResponse", "serial": 1, "status": "ok", "result": {"name": "Ann"}}
//! {"type": "scopeResponse", "serial": 1, "success": true, "result": ["send", "history"]}
//! {"type": "event", "name": "chat.message", "payload": {...}}
//! {"type": "action", "payload": {"type": "USER_LOADED"}}
//! ```

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::identifiers::{RpcSerial, ScopeSerial};

// ============================================================================
// Outbound
// ============================================================================

/// A packet sent from the session to the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Outbound {
    /// Fire-and-forget invocation.
    Call {
        /// Target scope.
        scope: String,
        /// Operation within the scope.
        operation: String,
        /// Positional arguments.
        args: Vec<Value>,
    },

    /// Correlated invocation.
    Rpc {
        /// Correlation serial.
        serial: RpcSerial,
        /// Target scope.
        scope: String,
        /// Operation within the scope.
        operation: String,
        /// Positional arguments.
        args: Vec<Value>,
    },

    /// Capability negotiation.
    Scope {
        /// Correlation serial.
        serial: ScopeSerial,
        /// Scope name.
        name: String,
        /// Whether the server must supply the operation list.
        #[serde(rename = "needsManifest")]
        needs_manifest: bool,
    },
}

impl Outbound {
    /// Creates a call packet.
    #[inline]
    #[must_use]
    pub fn call(scope: impl Into<String>, operation: impl Into<String>, args: Vec<Value>) -> Self {
        Self::Call {
            scope: scope.into(),
            operation: operation.into(),
            args,
        }
    }

    /// Creates an RPC request packet.
    #[inline]
    #[must_use]
    pub fn rpc(
        serial: RpcSerial,
        scope: impl Into<String>,
        operation: impl Into<String>,
        args: Vec<Value>,
    ) -> Self {
        Self::Rpc {
            serial,
            scope: scope.into(),
            operation: operation.into(),
            args,
        }
    }

    /// Creates a scope request packet.
    #[inline]
    #[must_use]
    pub fn scope(serial: ScopeSerial, name: impl Into<String>, needs_manifest: bool) -> Self {
        Self::Scope {
            serial,
            name: name.into(),
            needs_manifest,
        }
    }
}

// ============================================================================
// Inbound
// ============================================================================

/// A packet sent from the server to the session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Inbound {
    /// Answer to an RPC request.
    RpcResponse {
        /// Serial of the request being answered.
        serial: RpcSerial,
        /// Outcome discriminator.
        status: RpcStatus,
        /// Result, proxy operation list, or error payload.
        #[serde(default)]
        result: Value,
    },

    /// Answer to a scope request.
    ScopeResponse {
        /// Serial of the request being answered.
        serial: ScopeSerial,
        /// Whether the scope resolved.
        success: bool,
        /// Server-declared operations, or the error payload on failure.
        #[serde(default)]
        result: Value,
    },

    /// Unsolicited named event.
    Event {
        /// Event name.
        name: String,
        /// Event data.
        #[serde(default)]
        payload: Value,
    },

    /// Unsolicited state-store action.
    Action {
        /// Action forwarded to the store verbatim.
        payload: Value,
    },
}

impl Inbound {
    /// Creates a successful RPC response.
    #[inline]
    #[must_use]
    pub fn rpc_ok(serial: RpcSerial, result: Value) -> Self {
        Self::RpcResponse {
            serial,
            status: RpcStatus::Ok,
            result,
        }
    }

    /// Creates a proxy RPC response carrying operation names.
    #[must_use]
    pub fn rpc_proxy<I, S>(serial: RpcSerial, operations: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: Vec<Value> = operations
            .into_iter()
            .map(|name| Value::String(name.into()))
            .collect();
        Self::RpcResponse {
            serial,
            status: RpcStatus::Proxy,
            result: Value::Array(names),
        }
    }

    /// Creates a failed RPC response.
    #[inline]
    #[must_use]
    pub fn rpc_error(serial: RpcSerial, payload: Value) -> Self {
        Self::RpcResponse {
            serial,
            status: RpcStatus::Error,
            result: payload,
        }
    }

    /// Creates a scope response.
    #[inline]
    #[must_use]
    pub fn scope_response(serial: ScopeSerial, success: bool, result: Value) -> Self {
        Self::ScopeResponse {
            serial,
            success,
            result,
        }
    }
}

// ============================================================================
// RpcStatus / RpcOutcome
// ============================================================================

/// Wire discriminator of an RPC response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RpcStatus {
    /// Ordinary result.
    Ok,
    /// Result is a list of operation names to forward.
    Proxy,
    /// Remote failure.
    Error,
}

/// Decoded outcome of an RPC response.
#[derive(Debug, Clone, PartialEq)]
pub enum RpcOutcome {
    /// Ordinary result, delivered verbatim.
    Ok(Value),
    /// Forwardable operation names.
    Proxy(Vec<String>),
    /// Remote failure payload.
    Err(Value),
}

impl RpcOutcome {
    /// Builds the outcome from its wire parts.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] if a proxy result is not a list of strings.
    pub fn from_wire(status: RpcStatus, result: Value) -> Result<Self> {
        match status {
            RpcStatus::Ok => Ok(Self::Ok(result)),
            RpcStatus::Error => Ok(Self::Err(result)),
            RpcStatus::Proxy => operation_names(&result)
                .map(Self::Proxy)
                .ok_or_else(|| Error::protocol("proxy result must be a list of operation names")),
        }
    }
}

/// Reads a JSON array of strings.
///
/// Returns `None` if the value is not an array or holds a non-string.
#[must_use]
pub fn operation_names(value: &Value) -> Option<Vec<String>> {
    value
        .as_array()?
        .iter()
        .map(|v| v.as_str().map(str::to_owned))
        .collect()
}

// ============================================================================
// Tests
// ============================================================================
