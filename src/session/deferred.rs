//! Deferred results of RPC and scope requests.
//!
//! A [`Deferred`] is the caller's side of a one-shot settlement: it
//! completes exactly once, with the matching response, with the bulk
//! rejection issued on transport teardown, or with a timeout when one is
//! configured. The session keeps the other side ([`Settle`]) in its
//! correlation tables.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use serde_json::Value;
use tokio::sync::oneshot;
use tokio::time::{Instant, Sleep};

use crate::error::{Error, Result};

use super::scope::Capability;

// ============================================================================
// Types
// ============================================================================

/// Cleanup run when a deferred result times out; returns the error to yield.
type OnExpire = Box<dyn FnOnce() -> Error + Send>;

/// Deadline used when a timeout overflows the clock (about 30 years).
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

// ============================================================================
// Reply
// ============================================================================

/// Successful result of an RPC.
#[derive(Debug, Clone)]
pub enum Reply {
    /// Ordinary result, delivered verbatim.
    Value(Value),
    /// Remote capability described by the server.
    Proxy(Arc<Capability>),
}

impl Reply {
    /// Returns the plain value.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] if the reply is a proxy.
    pub fn into_value(self) -> Result<Value> {
        match self {
            Self::Value(value) => Ok(value),
            Self::Proxy(cap) => Err(Error::protocol(format!(
                "expected a value, got a proxy for scope {}",
                cap.scope()
            ))),
        }
    }

    /// Returns the proxy capability.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] if the reply is a plain value.
    pub fn into_capability(self) -> Result<Arc<Capability>> {
        match self {
            Self::Proxy(cap) => Ok(cap),
            Self::Value(_) => Err(Error::protocol("expected a proxy, got a value")),
        }
    }

    /// Returns the plain value, if any.
    #[inline]
    #[must_use]
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Self::Value(value) => Some(value),
            Self::Proxy(_) => None,
        }
    }

    /// Returns `true` if the reply is a proxy.
    #[inline]
    #[must_use]
    pub fn is_proxy(&self) -> bool {
        matches!(self, Self::Proxy(_))
    }
}

// ============================================================================
// Settle
// ============================================================================

/// Settling side of a [`Deferred`]. Consumed by settlement.
pub(crate) struct Settle<T> {
    tx: oneshot::Sender<Result<T>>,
}

impl<T> Settle<T> {
    /// Settles with `result`. A dropped caller is ignored.
    #[inline]
    pub(crate) fn settle(self, result: Result<T>) {
        let _ = self.tx.send(result);
    }

    /// Resolves with `value`.
    #[inline]
    pub(crate) fn resolve(self, value: T) {
        self.settle(Ok(value));
    }

    /// Rejects with `error`.
    #[inline]
    pub(crate) fn reject(self, error: Error) {
        self.settle(Err(error));
    }
}

impl<T> fmt::Debug for Settle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settle")
            .field("caller_alive", &!self.tx.is_closed())
            .finish()
    }
}

// ============================================================================
// Deferred
// ============================================================================

/// Timer that rejects a deferred result after a delay.
struct Expiry {
    after: Duration,
    deadline: Instant,
    /// Created on first poll, inside the runtime.
    sleep: Option<Pin<Box<Sleep>>>,
    on_expire: Option<OnExpire>,
}

/// Result that settles exactly once.
///
/// Await it to get the outcome. If the session is dropped first, it
/// completes with [`Error::SessionClosed`].
///
/// A result with a timeout must be polled inside a tokio runtime.
#[must_use = "a deferred result does nothing unless awaited"]
pub struct Deferred<T> {
    rx: oneshot::Receiver<Result<T>>,
    expiry: Option<Expiry>,
}

impl<T> fmt::Debug for Deferred<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Deferred")
            .field("timeout", &self.expiry.as_ref().map(|e| e.after))
            .finish_non_exhaustive()
    }
}

impl<T> Deferred<T> {
    /// Creates a connected settle/deferred pair.
    pub(crate) fn channel() -> (Settle<T>, Self) {
        let (tx, rx) = oneshot::channel();
        (Settle { tx }, Self { rx, expiry: None })
    }

    /// Creates an already-resolved result.
    pub fn resolved(value: T) -> Self {
        let (settle, deferred) = Self::channel();
        settle.resolve(value);
        deferred
    }

    /// Creates an already-rejected result.
    pub fn rejected(error: Error) -> Self {
        let (settle, deferred) = Self::channel();
        settle.reject(error);
        deferred
    }

    /// Rejects with the error returned by `on_expire` if not settled within
    /// `after`, counted from this call.
    pub(crate) fn with_expiry(
        mut self,
        after: Duration,
        on_expire: impl FnOnce() -> Error + Send + 'static,
    ) -> Self {
        self.expiry = Some(Expiry {
            after,
            deadline: Instant::now()
                .checked_add(after)
                .unwrap_or_else(|| Instant::now() + FAR_FUTURE),
            sleep: None,
            on_expire: Some(Box::new(on_expire)),
        });
        self
    }
}

impl<T> Future for Deferred<T> {
    type Output = Result<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();

        match Pin::new(&mut this.rx).poll(cx) {
            Poll::Ready(Ok(result)) => return Poll::Ready(result),
            Poll::Ready(Err(_)) => return Poll::Ready(Err(Error::SessionClosed)),
            Poll::Pending => {}
        }

        if let Some(expiry) = this.expiry.as_mut() {
            let deadline = expiry.deadline;
            let sleep = expiry
                .sleep
                .get_or_insert_with(|| Box::pin(tokio::time::sleep_until(deadline)));

            if sleep.as_mut().poll(cx).is_ready() {
                let on_expire = expiry.on_expire.take();
                this.expiry = None;
                this.rx.close();

                let error = match on_expire {
                    Some(on_expire) => on_expire(),
                    None => Error::SessionClosed,
                };
                return Poll::Ready(Err(error));
            }
        }

        Poll::Pending
    }
}

// ============================================================================
// Tests
// ============================================================================
