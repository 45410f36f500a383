//! Scopes: named capability groups and their cache.
//!
//! Resolving a scope yields a [`Capability`]: the scope name plus the set of
//! operations that may be invoked on it. Invoking an operation is an RPC
//! against that scope. Resolved capabilities are cached per scope name for
//! the lifetime of one transport epoch.

// ============================================================================
// Imports
// ============================================================================

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use rustc_hash::FxHashMap;
use serde_json::Value;

use crate::error::{Error, Result};

use super::core::{SendHandle, WeakSession};
use super::deferred::{Deferred, Reply};

// ============================================================================
// Manifest
// ============================================================================

/// Caller-declared operation list for a scope.
///
/// Supplying one tells the server it does not need to send the list back.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Manifest {
    operations: Vec<String>,
}

impl Manifest {
    /// Creates a manifest from operation names.
    #[must_use]
    pub fn new<I, S>(operations: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            operations: operations.into_iter().map(Into::into).collect(),
        }
    }

    /// Returns the declared operations.
    #[inline]
    #[must_use]
    pub fn operations(&self) -> &[String] {
        &self.operations
    }

    /// Consumes the manifest, returning its operations.
    #[inline]
    #[must_use]
    pub fn into_operations(self) -> Vec<String> {
        self.operations
    }
}

impl<S: Into<String>> FromIterator<S> for Manifest {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self::new(iter)
    }
}

// ============================================================================
// Capability
// ============================================================================

/// A remote capability: a scope and the operations callable on it.
///
/// Every invocation forwards to the session as an RPC (or call) against
/// [`Capability::scope`]. Capabilities hold the session weakly.
pub struct Capability {
    scope: String,
    operations: BTreeSet<String>,
    session: WeakSession,
}

impl fmt::Debug for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Capability")
            .field("scope", &self.scope)
            .field("operations", &self.operations)
            .finish_non_exhaustive()
    }
}

impl Capability {
    /// Creates a capability bound to `session`.
    pub(crate) fn new<I>(scope: impl Into<String>, operations: I, session: WeakSession) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        Self {
            scope: scope.into(),
            operations: operations.into_iter().collect(),
            session,
        }
    }

    /// Returns the scope this capability forwards to.
    #[inline]
    #[must_use]
    pub fn scope(&self) -> &str {
        &self.scope
    }

    /// Returns the callable operations in sorted order.
    pub fn operations(&self) -> impl Iterator<Item = &str> {
        self.operations.iter().map(String::as_str)
    }

    /// Returns `true` if `operation` is callable.
    #[inline]
    #[must_use]
    pub fn contains(&self, operation: &str) -> bool {
        self.operations.contains(operation)
    }

    /// Returns the number of callable operations.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.operations.len()
    }

    /// Returns `true` if no operation is callable.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Invokes `operation` as an RPC against this scope.
    ///
    /// Rejects with [`Error::UnknownOperation`] if the operation is not part
    /// of the capability, and with [`Error::SessionClosed`] if the session
    /// is gone.
    pub fn invoke(&self, operation: &str, args: Vec<Value>) -> Deferred<Reply> {
        if !self.contains(operation) {
            return Deferred::rejected(Error::unknown_operation(&self.scope, operation));
        }

        match self.session.upgrade() {
            Some(session) => session.rpc(&self.scope, operation, args),
            None => Deferred::rejected(Error::SessionClosed),
        }
    }

    /// Invokes `operation` fire-and-forget against this scope.
    ///
    /// # Errors
    ///
    /// - [`Error::UnknownOperation`] if the operation is not part of the capability
    /// - [`Error::SessionClosed`] if the session is gone
    pub fn call(&self, operation: &str, args: Vec<Value>) -> Result<SendHandle> {
        if !self.contains(operation) {
            return Err(Error::unknown_operation(&self.scope, operation));
        }

        let session = self.session.upgrade().ok_or(Error::SessionClosed)?;
        session.call(&self.scope, operation, args)
    }
}

// ============================================================================
// ScopeCache
// ============================================================================

/// Resolved capabilities by scope name.
#[derive(Debug, Default)]
pub struct ScopeCache {
    entries: FxHashMap<String, Arc<Capability>>,
}

impl ScopeCache {
    /// Creates an empty cache.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached capability for `name`.
    #[inline]
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<Capability>> {
        self.entries.get(name).cloned()
    }

    /// Caches `capability` under its scope name, replacing any previous entry.
    pub fn insert(&mut self, capability: Arc<Capability>) {
        self.entries
            .insert(capability.scope().to_owned(), capability);
    }

    /// Drops every entry. Returns how many were dropped.
    pub fn clear(&mut self) -> usize {
        let count = self.entries.len();
        self.entries.clear();
        count
    }

    /// Returns the number of cached scopes.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nothing is cached.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use futures_util::FutureExt;

    fn detached(scope: &str, operations: &[&str]) -> Capability {
        Capability::new(
            scope,
            operations.iter().map(|s| s.to_string()),
            WeakSession::new(),
        )
    }

    #[test]
    fn test_manifest_from_iter() {
        let manifest: Manifest = ["send", "history"].into_iter().collect();
        assert_eq!(manifest.operations(), ["send", "history"]);
    }

    #[test]
    fn test_capability_operations_sorted_and_deduped() {
        let cap = detached("chat", &["send", "history", "send"]);

        assert_eq!(cap.scope(), "chat");
        assert_eq!(cap.len(), 2);
        assert_eq!(cap.operations().collect::<Vec<_>>(), vec!["history", "send"]);
        assert!(cap.contains("send"));
        assert!(!cap.contains("delete"));
    }

    #[test]
    fn test_invoke_unknown_operation() {
        let cap = detached("chat", &["send"]);

        let result = cap.invoke("delete", vec![]).now_or_never().expect("ready");
        assert!(matches!(
            result,
            Err(Error::UnknownOperation { ref scope, ref operation })
                if scope == "chat" && operation == "delete"
        ));
    }

    #[test]
    fn test_invoke_without_session() {
        let cap = detached("chat", &["send"]);

        let result = cap.invoke("send", vec![]).now_or_never().expect("ready");
        assert!(matches!(result, Err(Error::SessionClosed)));

        assert!(matches!(cap.call("send", vec![]), Err(Error::SessionClosed)));
    }

    #[test]
    fn test_cache_identity() {
        let mut cache = ScopeCache::new();
        let cap = Arc::new(detached("chat", &["send"]));
        cache.insert(Arc::clone(&cap));

        let cached = cache.get("chat").expect("cached");
        assert!(Arc::ptr_eq(&cap, &cached));
        assert!(cache.get("user").is_none());
    }

    #[test]
    fn test_cache_clear() {
        let mut cache = ScopeCache::new();
        cache.insert(Arc::new(detached("chat", &["send"])));
        cache.insert(Arc::new(detached("user", &["get"])));

        assert_eq!(cache.clear(), 2);
        assert!(cache.is_empty());
    }
}
