//! Dispatch target for server actions.

use serde_json::Value;

/// Receives `Action` payloads pushed by the server.
///
/// Called after the session's state lock is released, so implementations
/// may call back into the session.
pub trait ActionSink: Send + Sync + 'static {
    /// Dispatches one action verbatim.
    fn dispatch(&self, action: Value);
}

impl<F> ActionSink for F
where
    F: Fn(Value) + Send + Sync + 'static,
{
    #[inline]
    fn dispatch(&self, action: Value) {
        self(action);
    }
}
