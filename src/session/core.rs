//! Session: connection lifecycle, correlation and façade.
//!
//! The [`Session`] coordinates one logical connection across any number of
//! physical transports. All mutable state sits in one mutex-guarded block;
//! every reaction (a transport event or a façade call) runs under that lock
//! as one unit. Listener callbacks, action dispatch and transport closes are
//! collected as effects and applied after the lock is released.
//!
//! # Example
//!
//! ```ignore
//! use rpc_session::Session;
//!
//! # async fn example() -> rpc_session::Result<()> {
//! let session = Session::builder("ws://localhost:9000")
//!     .store(|action: serde_json::Value| println!("action: {action}"))
//!     .build()?;
//!
//! session.connect("/app")?;
//!
//! let profile = session.rpc("user", "getProfile", vec![42.into()]).await?;
//! let chat = session.scope("chat", None).await?;
//! chat.invoke("send", vec!["hello".into()]).await?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde_json::Value;
use tokio::sync::watch;
use tracing::{debug, info, trace, warn};
use url::Url;

use crate::error::{Error, Result};
use crate::identifiers::{Counter, QueueKey, RpcSerial, ScopeSerial, TransportId};
use crate::protocol::{Codec, Inbound, Outbound, RpcOutcome, RpcStatus, operation_names};
use crate::transport::{
    Connector, Transport, TransportEvent, TransportEvents, TransportObserver,
};

use super::builder::SessionBuilder;
use super::correlation::CorrelationTable;
use super::deferred::{Deferred, Reply, Settle};
use super::events::{EventRegistry, LifecycleEvent, Listener, Subscription};
use super::options::SessionOptions;
use super::queue::PendingQueue;
use super::scope::{Capability, Manifest, ScopeCache};
use super::store::ActionSink;

// ============================================================================
// ConnectionStatus
// ============================================================================

/// Externally observable connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionStatus {
    /// No transport.
    #[default]
    Offline,
    /// A transport exists but has not opened yet.
    Connecting,
    /// The current transport is open.
    Online,
}

impl ConnectionStatus {
    fn of(transport: Option<&ActiveTransport>) -> Self {
        match transport {
            None => Self::Offline,
            Some(active) if active.open => Self::Online,
            Some(_) => Self::Connecting,
        }
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Offline => "offline",
            Self::Connecting => "connecting",
            Self::Online => "online",
        })
    }
}

// ============================================================================
// Internal State
// ============================================================================

/// The transport of the current epoch.
struct ActiveTransport {
    id: TransportId,
    url: Url,
    link: Box<dyn Transport>,
    open: bool,
}

struct PendingRpc {
    settle: Settle<Reply>,
    /// Scope proxied capabilities forward to.
    scope: String,
}

struct PendingScope {
    /// First caller plus everyone who joined while in flight.
    waiters: Vec<Settle<Arc<Capability>>>,
    name: String,
    manifest: Option<Manifest>,
}

/// Everything mutated by reactions.
struct SessionState {
    transport: Option<ActiveTransport>,
    /// URL of the most recently created transport; survives teardown.
    last_url: Option<Url>,
    transport_ids: Counter,
    rpcs: CorrelationTable<RpcSerial, PendingRpc>,
    scopes: CorrelationTable<ScopeSerial, PendingScope>,
    /// Scope name to the serial of its in-flight request.
    inflight_scopes: FxHashMap<String, ScopeSerial>,
    queue: PendingQueue,
    cache: ScopeCache,
}

/// Side effect applied after the state lock is released.
enum Effect {
    Emit(String, Value),
    Dispatch(Value),
    Close(Box<dyn Transport>),
}

impl Effect {
    fn lifecycle(event: LifecycleEvent, payload: Value) -> Self {
        Self::Emit(event.as_str().to_owned(), payload)
    }
}

/// Why an epoch ended.
enum Teardown {
    Closed,
    Failed(String),
}

impl Teardown {
    fn error(&self) -> Error {
        match self {
            Self::Closed => Error::ConnectionTerminated,
            Self::Failed(detail) => Error::transport(detail.clone()),
        }
    }

    /// Lifecycle events for the end of an epoch. A failure is reported as
    /// `error(detail)` followed by `disconnect`.
    fn announce(self, effects: &mut Vec<Effect>) {
        if let Self::Failed(detail) = self {
            effects.push(Effect::lifecycle(LifecycleEvent::Error, Value::String(detail)));
        }
        effects.push(Effect::lifecycle(LifecycleEvent::Disconnect, Value::Null));
    }
}

// ============================================================================
// SessionInner
// ============================================================================

pub(crate) struct SessionInner {
    host: String,
    options: SessionOptions,
    connector: Arc<dyn Connector>,
    codec: Arc<dyn Codec>,
    store: Arc<dyn ActionSink>,
    registry: Arc<EventRegistry>,
    status: watch::Sender<ConnectionStatus>,
    state: Mutex<SessionState>,
    this: Weak<SessionInner>,
}

impl SessionInner {
    fn weak(&self) -> WeakSession {
        WeakSession {
            inner: self.this.clone(),
        }
    }

    /// Runs effects in order. Must be called without the state lock.
    fn apply(&self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::Emit(event, payload) => self.registry.emit(&event, &payload),
                Effect::Dispatch(action) => self.store.dispatch(action),
                Effect::Close(link) => link.close(),
            }
        }
    }

    fn publish_status(&self, state: &SessionState) {
        let status = ConnectionStatus::of(state.transport.as_ref());
        let changed = self.status.send_if_modified(|current| {
            if *current == status {
                return false;
            }
            *current = status;
            true
        });

        if changed {
            debug!(%status, "Connection status changed");
        }
    }
}

// ============================================================================
// SessionInner - Lifecycle
// ============================================================================

impl SessionInner {
    /// Creates a transport for `url`, superseding the current one.
    ///
    /// Without `force`, an open transport already bound to `url` is kept.
    /// A transport still connecting is always replaced.
    fn open_transport(&self, url: Url, force: bool) {
        let mut effects = Vec::new();
        {
            let mut guard = self.state.lock();
            let state = &mut *guard;

            if !force && state.transport.as_ref().is_some_and(|t| t.open && t.url == url) {
                debug!(%url, "Already connected to url, connect ignored");
                return;
            }

            self.teardown(state, Teardown::Closed, &mut effects);

            let id = state.transport_ids.issue();
            let observer: Weak<dyn TransportObserver> = self.this.clone();
            let link = self
                .connector
                .connect(&url, TransportEvents::new(id, observer));

            info!(transport = %id, %url, "Transport created");
            state.last_url = Some(url.clone());
            state.transport = Some(ActiveTransport {
                id,
                url,
                link,
                open: false,
            });
            self.publish_status(state);
        }
        self.apply(effects);
    }

    /// Ends the current epoch: settles all outstanding work, clears the
    /// queue and cache, and schedules the transport close and announcement.
    fn teardown(&self, state: &mut SessionState, cause: Teardown, effects: &mut Vec<Effect>) {
        let Some(active) = state.transport.take() else {
            return;
        };

        let dropped = state.queue.clear();
        let rpcs = state.rpcs.drain();
        let scopes = state.scopes.drain();
        state.inflight_scopes.clear();
        let cached = state.cache.clear();

        debug!(
            transport = %active.id,
            rpcs = rpcs.len(),
            scopes = scopes.len(),
            dropped,
            cached,
            "Transport torn down"
        );

        for (_, rpc) in rpcs {
            rpc.settle.reject(cause.error());
        }
        for (_, scope) in scopes {
            for waiter in scope.waiters {
                waiter.reject(cause.error());
            }
        }

        effects.push(Effect::Close(active.link));
        cause.announce(effects);
    }

    fn close(&self) {
        let mut effects = Vec::new();
        {
            let mut guard = self.state.lock();
            let state = &mut *guard;
            if state.transport.is_some() {
                info!("Closing transport");
            }
            self.teardown(state, Teardown::Closed, &mut effects);
            self.publish_status(state);
        }
        self.apply(effects);
    }
}

// ============================================================================
// SessionInner - Reactions
// ============================================================================

impl TransportObserver for SessionInner {
    fn on_transport_event(&self, id: TransportId, event: TransportEvent) {
        let mut effects = Vec::new();
        {
            let mut guard = self.state.lock();
            let state = &mut *guard;

            if state.transport.as_ref().map(|t| t.id) != Some(id) {
                trace!(transport = %id, ?event, "Stale transport event ignored");
                return;
            }

            match event {
                TransportEvent::Open => self.on_open(state, &mut effects),
                TransportEvent::Message(frame) => self.on_message(state, &frame, &mut effects),
                TransportEvent::Close => {
                    info!(transport = %id, "Transport closed");
                    self.teardown(state, Teardown::Closed, &mut effects);
                }
                TransportEvent::Error(detail) => {
                    warn!(transport = %id, error = %detail, "Transport failed");
                    self.teardown(state, Teardown::Failed(detail), &mut effects);
                }
            }
            self.publish_status(state);
        }
        self.apply(effects);
    }
}

impl SessionInner {
    fn on_open(&self, state: &mut SessionState, effects: &mut Vec<Effect>) {
        let Some(active) = state.transport.as_mut() else {
            return;
        };
        if active.open {
            return;
        }
        active.open = true;

        let frames = state.queue.drain();
        let count = frames.len();
        for frame in frames {
            if let Err(e) = active.link.send(frame) {
                warn!(transport = %active.id, error = %e, "Queued frame not sent");
            }
        }

        info!(transport = %active.id, url = %active.url, flushed = count, "Transport open");
        effects.push(Effect::lifecycle(LifecycleEvent::Connect, Value::Null));
    }

    fn on_message(&self, state: &mut SessionState, frame: &str, effects: &mut Vec<Effect>) {
        let packet = match self.codec.decode(frame) {
            Ok(packet) => packet,
            Err(e) => {
                warn!(error = %e, "Undecodable frame dropped");
                return;
            }
        };

        match packet {
            Inbound::RpcResponse {
                serial,
                status,
                result,
            } => self.resolve_rpc(state, serial, status, result),
            Inbound::ScopeResponse {
                serial,
                success,
                result,
            } => self.resolve_scope(state, serial, success, result),
            Inbound::Event { name, payload } => {
                if LifecycleEvent::ALL.iter().any(|e| e.as_str() == name) {
                    warn!(event = %name, "Server event shadows a lifecycle event, dropped");
                    return;
                }
                trace!(event = %name, "Server event");
                effects.push(Effect::Emit(name, payload));
            }
            Inbound::Action { payload } => effects.push(Effect::Dispatch(payload)),
        }
    }

    fn resolve_rpc(&self, state: &mut SessionState, serial: RpcSerial, status: RpcStatus, result: Value) {
        let Some(entry) = state.rpcs.take(serial) else {
            debug!(%serial, "Response for unknown rpc serial ignored");
            return;
        };

        trace!(%serial, ?status, "RPC response");
        match RpcOutcome::from_wire(status, result) {
            Ok(RpcOutcome::Ok(value)) => entry.settle.resolve(Reply::Value(value)),
            Ok(RpcOutcome::Proxy(operations)) => {
                let capability = Capability::new(entry.scope, operations, self.weak());
                entry.settle.resolve(Reply::Proxy(Arc::new(capability)));
            }
            Ok(RpcOutcome::Err(payload)) => entry.settle.reject(Error::remote(payload)),
            Err(e) => entry.settle.reject(e),
        }
    }

    fn resolve_scope(&self, state: &mut SessionState, serial: ScopeSerial, success: bool, result: Value) {
        let Some(entry) = state.scopes.take(serial) else {
            debug!(%serial, "Response for unknown scope serial ignored");
            return;
        };
        if state.inflight_scopes.get(&entry.name) == Some(&serial) {
            state.inflight_scopes.remove(&entry.name);
        }

        if !success {
            debug!(%serial, scope = %entry.name, "Scope rejected");
            for waiter in entry.waiters {
                waiter.reject(Error::remote(result.clone()));
            }
            return;
        }

        let operations = if result.is_null() {
            entry.manifest.map(Manifest::into_operations)
        } else {
            operation_names(&result)
        };
        let Some(operations) = operations else {
            warn!(%serial, scope = %entry.name, "Scope resolved without an operation list");
            for waiter in entry.waiters {
                waiter.reject(Error::protocol(format!(
                    "scope {} resolved without an operation list",
                    entry.name
                )));
            }
            return;
        };

        let capability = Arc::new(Capability::new(entry.name, operations, self.weak()));
        state.cache.insert(Arc::clone(&capability));
        debug!(%serial, scope = %capability.scope(), waiters = entry.waiters.len(), "Scope resolved");

        for waiter in entry.waiters {
            waiter.resolve(Arc::clone(&capability));
        }
    }
}

// ============================================================================
// SessionInner - Requests
// ============================================================================

impl SessionInner {
    /// Sends `frame` if the transport is open, queues it otherwise.
    ///
    /// Returns the queue key when queued.
    fn transmit_or_queue(state: &mut SessionState, frame: String) -> Option<QueueKey> {
        match state.transport.as_ref() {
            Some(active) if active.open => {
                if let Err(e) = active.link.send(frame) {
                    warn!(transport = %active.id, error = %e, "Frame not sent");
                }
                None
            }
            _ => Some(state.queue.enqueue(frame)),
        }
    }

    fn rpc(&self, scope: &str, operation: &str, args: Vec<Value>) -> Deferred<Reply> {
        let (settle, deferred) = Deferred::channel();

        let (serial, queued) = {
            let mut guard = self.state.lock();
            let state = &mut *guard;

            let serial = state.rpcs.insert(PendingRpc {
                settle,
                scope: scope.to_owned(),
            });

            let frame = match self.codec.encode(&Outbound::rpc(serial, scope, operation, args)) {
                Ok(frame) => frame,
                Err(e) => {
                    if let Some(entry) = state.rpcs.take(serial) {
                        entry.settle.reject(e);
                    }
                    return deferred;
                }
            };

            let queued = Self::transmit_or_queue(state, frame);
            trace!(%serial, %scope, %operation, queued = queued.is_some(), "RPC issued");
            (serial, queued)
        };

        let Some(after) = self.options.rpc_timeout else {
            return deferred;
        };

        let session = self.weak();
        deferred.with_expiry(after, move || {
            if let Some(inner) = session.inner.upgrade() {
                inner.expire_rpc(serial, queued);
            }
            Error::request_timeout(serial, after)
        })
    }

    fn expire_rpc(&self, serial: RpcSerial, queued: Option<QueueKey>) {
        let mut state = self.state.lock();
        if state.rpcs.take(serial).is_some() {
            let unsent = queued.is_some_and(|key| state.queue.cancel(key));
            debug!(%serial, unsent, "RPC timed out");
        }
    }

    fn call(&self, scope: &str, operation: &str, args: Vec<Value>) -> Result<Option<QueueKey>> {
        let frame = self.codec.encode(&Outbound::call(scope, operation, args))?;
        let queued = Self::transmit_or_queue(&mut self.state.lock(), frame);
        trace!(%scope, %operation, queued = queued.is_some(), "Call issued");
        Ok(queued)
    }

    fn cancel_send(&self, key: QueueKey) -> bool {
        self.state.lock().queue.cancel(key)
    }

    fn scope(&self, name: &str, manifest: Option<Manifest>) -> Deferred<Arc<Capability>> {
        let mut guard = self.state.lock();
        let state = &mut *guard;

        if let Some(capability) = state.cache.get(name) {
            trace!(scope = %name, "Scope cache hit");
            return Deferred::resolved(capability);
        }

        let (settle, deferred) = Deferred::channel();

        if let Some(serial) = state.inflight_scopes.get(name).copied()
            && let Some(entry) = state.scopes.get_mut(serial)
        {
            trace!(%serial, scope = %name, "Joined in-flight scope request");
            entry.waiters.push(settle);
            return deferred;
        }

        let needs_manifest = manifest.is_none();
        let serial = state.scopes.insert(PendingScope {
            waiters: vec![settle],
            name: name.to_owned(),
            manifest,
        });

        match self.codec.encode(&Outbound::scope(serial, name, needs_manifest)) {
            Ok(frame) => {
                state.inflight_scopes.insert(name.to_owned(), serial);
                let queued = Self::transmit_or_queue(state, frame);
                trace!(%serial, scope = %name, needs_manifest, queued = queued.is_some(), "Scope requested");
            }
            Err(e) => {
                if let Some(entry) = state.scopes.take(serial) {
                    for waiter in entry.waiters {
                        waiter.reject(Error::protocol(e.to_string()));
                    }
                }
            }
        }

        deferred
    }
}

impl Drop for SessionInner {
    fn drop(&mut self) {
        if let Some(active) = self.state.get_mut().transport.take() {
            debug!(transport = %active.id, "Session dropped, closing transport");
            active.link.close();
        }
    }
}

// ============================================================================
// Session
// ============================================================================

/// Client session over a reconnectable transport.
///
/// Cheap to clone; clones share one connection. The session owns its
/// transport exclusively and replaces it on `connect`/`reconnect`.
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("host", &self.inner.host)
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Creates a builder for a session against `host`.
    ///
    /// `host` must start with `ws://` or `wss://`.
    #[inline]
    #[must_use]
    pub fn builder(host: impl Into<String>) -> SessionBuilder {
        SessionBuilder::new(host)
    }

    pub(crate) fn from_parts(
        host: String,
        options: SessionOptions,
        connector: Arc<dyn Connector>,
        codec: Arc<dyn Codec>,
        store: Arc<dyn ActionSink>,
    ) -> Self {
        let registry = Arc::new(EventRegistry::new(options.events.iter().cloned()));
        let (status, _) = watch::channel(ConnectionStatus::Offline);

        let inner = Arc::new_cyclic(|this| SessionInner {
            host,
            options,
            connector,
            codec,
            store,
            registry,
            status,
            state: Mutex::new(SessionState {
                transport: None,
                last_url: None,
                transport_ids: Counter::new(),
                rpcs: CorrelationTable::new(),
                scopes: CorrelationTable::new(),
                inflight_scopes: FxHashMap::default(),
                queue: PendingQueue::new(),
                cache: ScopeCache::new(),
            }),
            this: this.clone(),
        });

        Self { inner }
    }

    /// Returns the host URLs are resolved against.
    #[inline]
    #[must_use]
    pub fn host(&self) -> &str {
        &self.inner.host
    }

    /// Returns the session options.
    #[inline]
    #[must_use]
    pub fn options(&self) -> &SessionOptions {
        &self.inner.options
    }

    /// Returns a handle that does not keep the session alive.
    #[inline]
    #[must_use]
    pub fn downgrade(&self) -> WeakSession {
        self.inner.weak()
    }
}

// ============================================================================
// Session - Lifecycle
// ============================================================================

impl Session {
    /// Connects to `path` resolved against the host.
    ///
    /// A no-op if the current transport is already bound to the same URL.
    /// Otherwise the current transport is torn down and a new one created.
    /// Returns once the transport is created; opening is reported through
    /// the `connect` event and [`Session::status`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::Url`] if `host + path` is not a valid URL.
    pub fn connect(&self, path: &str) -> Result<()> {
        let url = Url::parse(&format!("{}{}", self.inner.host, path))?;
        self.inner.open_transport(url, false);
        Ok(())
    }

    /// Recreates the transport against the last URL used.
    ///
    /// Returns `false`, creating nothing, if no transport was ever created.
    pub fn reconnect(&self) -> bool {
        let last_url = self.inner.state.lock().last_url.clone();
        match last_url {
            Some(url) => {
                self.inner.open_transport(url, true);
                true
            }
            None => {
                debug!("Reconnect before any connect ignored");
                false
            }
        }
    }

    /// Closes the current transport.
    ///
    /// Outstanding RPC and scope results reject with
    /// [`Error::ConnectionTerminated`]. The last URL is kept for
    /// [`Session::reconnect`].
    pub fn close(&self) {
        self.inner.close();
    }

    /// Returns `true` if the current transport is open.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.status() == ConnectionStatus::Online
    }

    /// Returns the connection status.
    #[must_use]
    pub fn status(&self) -> ConnectionStatus {
        *self.inner.status.borrow()
    }

    /// Returns a receiver that observes status changes.
    #[must_use]
    pub fn watch_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.inner.status.subscribe()
    }

    /// Returns the URL of the current transport.
    #[must_use]
    pub fn url(&self) -> Option<Url> {
        self.inner
            .state
            .lock()
            .transport
            .as_ref()
            .map(|t| t.url.clone())
    }

    /// Returns `true` if a transport was ever created.
    #[must_use]
    pub fn has_connected(&self) -> bool {
        self.inner.state.lock().last_url.is_some()
    }

    /// Returns `true` if a transport currently exists, open or not.
    #[must_use]
    pub fn has_transport(&self) -> bool {
        self.inner.state.lock().transport.is_some()
    }
}

// ============================================================================
// Session - Events
// ============================================================================

impl Session {
    /// Registers `listener` for `event`.
    ///
    /// Known events are `connect`, `disconnect`, `error` and the server
    /// events declared in [`SessionOptions::events`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownEvent`] for any other name.
    pub fn on<F>(&self, event: &str, listener: F) -> Result<Subscription>
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        let listener: Listener = Arc::new(listener);
        let id = self.inner.registry.add(event, listener)?;
        Ok(Subscription::new(event, id, &self.inner.registry))
    }
}

// ============================================================================
// Session - Requests
// ============================================================================

impl Session {
    /// Invokes `operation` on `scope` without waiting for a reply.
    ///
    /// Sent immediately when connected, queued otherwise. The returned
    /// handle cancels the send while it is still queued.
    ///
    /// # Errors
    ///
    /// Returns an error if the packet cannot be encoded.
    pub fn call(&self, scope: &str, operation: &str, args: Vec<Value>) -> Result<SendHandle> {
        let key = self.inner.call(scope, operation, args)?;
        Ok(SendHandle {
            key,
            session: self.downgrade(),
        })
    }

    /// Invokes `operation` on `scope` and waits for the reply.
    ///
    /// The result settles exactly once: with the matching response, with
    /// the teardown error if the transport ends first, or with
    /// [`Error::RequestTimeout`] if [`SessionOptions::rpc_timeout`] elapses.
    pub fn rpc(&self, scope: &str, operation: &str, args: Vec<Value>) -> Deferred<Reply> {
        self.inner.rpc(scope, operation, args)
    }

    /// Resolves the capability for scope `name`.
    ///
    /// A cached scope resolves immediately to the cached object. A request
    /// already in flight for `name` is joined rather than repeated. With a
    /// `manifest`, the server is told it need not send the operation list.
    pub fn scope(&self, name: &str, manifest: Option<Manifest>) -> Deferred<Arc<Capability>> {
        self.inner.scope(name, manifest)
    }
}

// ============================================================================
// Session - Introspection
// ============================================================================

impl Session {
    /// Returns the number of unanswered RPCs.
    #[must_use]
    pub fn pending_rpcs(&self) -> usize {
        self.inner.state.lock().rpcs.len()
    }

    /// Returns the number of unanswered scope requests.
    #[must_use]
    pub fn pending_scopes(&self) -> usize {
        self.inner.state.lock().scopes.len()
    }

    /// Returns the number of frames waiting for a transport.
    #[must_use]
    pub fn queued_sends(&self) -> usize {
        self.inner.state.lock().queue.len()
    }

    /// Returns the number of cached scopes.
    #[must_use]
    pub fn cached_scopes(&self) -> usize {
        self.inner.state.lock().cache.len()
    }
}

// ============================================================================
// WeakSession
// ============================================================================

/// Non-owning session handle.
#[derive(Clone, Default)]
pub struct WeakSession {
    inner: Weak<SessionInner>,
}

impl fmt::Debug for WeakSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakSession")
            .field("alive", &(self.inner.strong_count() > 0))
            .finish()
    }
}

impl WeakSession {
    /// Creates a handle that never upgrades.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the session if it is still alive.
    #[must_use]
    pub fn upgrade(&self) -> Option<Session> {
        self.inner.upgrade().map(|inner| Session { inner })
    }
}

// ============================================================================
// SendHandle
// ============================================================================

/// Handle to a fire-and-forget send.
#[derive(Debug, Clone)]
pub struct SendHandle {
    key: Option<QueueKey>,
    session: WeakSession,
}

impl SendHandle {
    /// Removes the send from the queue if it has not been transmitted.
    ///
    /// Returns `false` if it was sent immediately, already flushed, cleared
    /// by a teardown, or already cancelled.
    pub fn cancel(&self) -> bool {
        match (self.key, self.session.inner.upgrade()) {
            (Some(key), Some(inner)) => inner.cancel_send(key),
            _ => false,
        }
    }

    /// Returns `true` if the send is still waiting for a transport.
    #[must_use]
    pub fn is_queued(&self) -> bool {
        match (self.key, self.session.inner.upgrade()) {
            (Some(key), Some(inner)) => inner.state.lock().queue.contains(key),
            _ => false,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Duration;

    use futures_util::FutureExt;
    use serde_json::json;

    use crate::protocol::JsonCodec;
    use crate::transport::{MemoryConnector, MemoryPeer};

    fn session() -> (Session, MemoryConnector) {
        let connector = MemoryConnector::new();
        let session = Session::from_parts(
            "ws://server".into(),
            SessionOptions::new().with_event("presence"),
            Arc::new(connector.clone()),
            Arc::new(JsonCodec),
            Arc::new(|_: Value| {}),
        );
        (session, connector)
    }

    fn open(session: &Session, connector: &MemoryConnector) -> MemoryPeer {
        session.connect("/app").expect("valid url");
        let peer = connector.last().expect("transport created");
        peer.open();
        peer
    }

    #[test]
    fn test_status_transitions() {
        let (session, connector) = session();
        assert_eq!(session.status(), ConnectionStatus::Offline);

        session.connect("/app").expect("valid url");
        assert_eq!(session.status(), ConnectionStatus::Connecting);
        assert!(!session.is_connected());

        connector.last().expect("transport").open();
        assert_eq!(session.status(), ConnectionStatus::Online);
        assert!(session.is_connected());

        session.close();
        assert_eq!(session.status(), ConnectionStatus::Offline);
        assert!(session.url().is_none());
    }

    #[test]
    fn test_connect_same_url_is_noop() {
        let (session, connector) = session();
        let peer = open(&session, &connector);
        session.connect("/app").expect("valid url");
        assert_eq!(connector.connect_count(), 1);
        assert!(!peer.is_closed());
        assert!(session.is_connected());

        session.connect("/other").expect("valid url");
        assert_eq!(connector.connect_count(), 2);
        assert!(connector.peers()[0].is_closed());
    }

    #[test]
    fn test_connect_replaces_connecting_transport() {
        let (session, connector) = session();
        let seen = Arc::new(Mutex::new(Vec::new()));
        {
            let seen = Arc::clone(&seen);
            session
                .on("disconnect", move |_| seen.lock().push("disconnect"))
                .expect("known event");
        }

        session.connect("/app").expect("valid url");
        let rpc = session.rpc("user", "get", vec![]);
        session.connect("/app").expect("valid url");

        assert_eq!(connector.connect_count(), 2);
        let peers = connector.peers();
        assert!(peers[0].is_closed());
        assert_eq!(peers[1].url().as_str(), "ws://server/app");
        assert_eq!(session.status(), ConnectionStatus::Connecting);
        assert_eq!(*seen.lock(), vec!["disconnect"]);

        let err = rpc.now_or_never().expect("settled").expect_err("rejected");
        assert!(matches!(err, Error::ConnectionTerminated));
    }

    #[test]
    fn test_reconnect_without_connect() {
        let (session, connector) = session();
        assert!(!session.reconnect());
        assert_eq!(connector.connect_count(), 0);
    }

    #[test]
    fn test_reconnect_reuses_last_url() {
        let (session, connector) = session();
        open(&session, &connector);
        session.close();

        assert!(session.reconnect());
        let peer = connector.last().expect("transport");
        assert_eq!(connector.connect_count(), 2);
        assert_eq!(peer.url().as_str(), "ws://server/app");
    }

    #[test]
    fn test_stale_events_ignored() {
        let (session, connector) = session();
        session.connect("/a").expect("valid url");
        let stale = connector.last().expect("transport");
        session.connect("/b").expect("valid url");

        stale.open();
        assert_eq!(session.status(), ConnectionStatus::Connecting);
        stale.fail("late");
        assert_eq!(session.status(), ConnectionStatus::Connecting);
    }

    #[test]
    fn test_rpc_resolves_by_serial() {
        let (session, connector) = session();
        let peer = open(&session, &connector);

        let first = session.rpc("user", "get", vec![json!(1)]);
        let second = session.rpc("user", "get", vec![json!(2)]);

        peer.deliver_packet(&Inbound::rpc_ok(RpcSerial::new(2), json!("two")))
            .expect("encodable");
        peer.deliver_packet(&Inbound::rpc_ok(RpcSerial::new(1), json!("one")))
            .expect("encodable");

        let first = first.now_or_never().expect("settled").expect("resolved");
        let second = second.now_or_never().expect("settled").expect("resolved");
        assert_eq!(first.as_value(), Some(&json!("one")));
        assert_eq!(second.as_value(), Some(&json!("two")));
        assert_eq!(session.pending_rpcs(), 0);
    }

    #[test]
    fn test_duplicate_response_ignored() {
        let (session, connector) = session();
        let peer = open(&session, &connector);

        let rpc = session.rpc("user", "get", vec![]);
        let response = Inbound::rpc_ok(RpcSerial::new(1), json!(1));
        peer.deliver_packet(&response).expect("encodable");
        peer.deliver_packet(&response).expect("encodable");

        assert!(rpc.now_or_never().expect("settled").is_ok());
    }

    #[test]
    fn test_remote_error_rejects() {
        let (session, connector) = session();
        let peer = open(&session, &connector);

        let rpc = session.rpc("user", "get", vec![]);
        peer.deliver_packet(&Inbound::rpc_error(RpcSerial::new(1), json!({"code": 403})))
            .expect("encodable");

        let err = rpc.now_or_never().expect("settled").expect_err("rejected");
        assert!(matches!(err, Error::Remote { ref payload } if payload["code"] == 403));
    }

    #[test]
    fn test_proxy_reply_forwards_to_scope() {
        let (session, connector) = session();
        let peer = open(&session, &connector);

        let rpc = session.rpc("files", "open", vec![json!("a.txt")]);
        peer.deliver_packet(&Inbound::rpc_proxy(RpcSerial::new(1), ["read", "close"]))
            .expect("encodable");

        let handle = rpc
            .now_or_never()
            .expect("settled")
            .expect("resolved")
            .into_capability()
            .expect("proxy");
        assert_eq!(handle.scope(), "files");

        let _read = handle.invoke("read", vec![]);
        let sent = peer.sent_packets().expect("decodable");
        assert_eq!(
            sent.last(),
            Some(&Outbound::rpc(RpcSerial::new(2), "files", "read", vec![]))
        );
    }

    #[test]
    fn test_undecodable_frame_dropped() {
        let (session, connector) = session();
        let peer = open(&session, &connector);

        let rpc = session.rpc("user", "get", vec![]);
        peer.deliver("not json");
        assert_eq!(session.pending_rpcs(), 1);
        assert!(session.is_connected());
        drop(rpc);
    }

    #[test]
    fn test_call_cancel_while_queued() {
        let (session, connector) = session();

        let handle = session.call("log", "write", vec![json!("a")]).expect("encodable");
        session.call("log", "write", vec![json!("b")]).expect("encodable");
        assert!(handle.is_queued());
        assert!(handle.cancel());
        assert!(!handle.cancel());

        let peer = open(&session, &connector);
        assert_eq!(
            peer.sent_packets().expect("decodable"),
            vec![Outbound::call("log", "write", vec![json!("b")])]
        );
    }

    #[test]
    fn test_call_when_connected_is_not_queued() {
        let (session, connector) = session();
        let peer = open(&session, &connector);

        let handle = session.call("log", "write", vec![]).expect("encodable");
        assert!(!handle.is_queued());
        assert!(!handle.cancel());
        assert_eq!(peer.sent().len(), 1);
    }

    #[test]
    fn test_scope_requests_coalesce() {
        let (session, connector) = session();
        let peer = open(&session, &connector);

        let first = session.scope("chat", None);
        let second = session.scope("chat", None);
        assert_eq!(peer.sent().len(), 1);

        peer.deliver_packet(&Inbound::scope_response(
            ScopeSerial::new(1),
            true,
            json!(["send"]),
        ))
        .expect("encodable");

        let first = first.now_or_never().expect("settled").expect("resolved");
        let second = second.now_or_never().expect("settled").expect("resolved");
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_scope_with_manifest() {
        let (session, connector) = session();
        let peer = open(&session, &connector);

        let scope = session.scope("chat", Some(Manifest::new(["send", "history"])));
        assert_eq!(
            peer.sent_packets().expect("decodable"),
            vec![Outbound::scope(ScopeSerial::new(1), "chat", false)]
        );

        peer.deliver_packet(&Inbound::scope_response(ScopeSerial::new(1), true, Value::Null))
            .expect("encodable");

        let capability = scope.now_or_never().expect("settled").expect("resolved");
        assert!(capability.contains("history"));
        assert_eq!(session.cached_scopes(), 1);
    }

    #[test]
    fn test_server_list_overrides_manifest() {
        let (session, connector) = session();
        let peer = open(&session, &connector);

        let scope = session.scope("chat", Some(Manifest::new(["a"])));
        peer.deliver_packet(&Inbound::scope_response(ScopeSerial::new(1), true, json!(["b"])))
            .expect("encodable");

        let capability = scope.now_or_never().expect("settled").expect("resolved");
        assert!(capability.contains("b"));
        assert!(!capability.contains("a"));
        assert!(matches!(
            capability.invoke("a", vec![]).now_or_never(),
            Some(Err(Error::UnknownOperation { .. }))
        ));
    }

    #[test]
    fn test_scope_failure_not_cached() {
        let (session, connector) = session();
        let peer = open(&session, &connector);

        let scope = session.scope("admin", None);
        peer.deliver_packet(&Inbound::scope_response(
            ScopeSerial::new(1),
            false,
            json!("forbidden"),
        ))
        .expect("encodable");

        let err = scope.now_or_never().expect("settled").expect_err("rejected");
        assert!(err.is_remote());
        assert_eq!(session.cached_scopes(), 0);

        let _retry = session.scope("admin", None);
        assert_eq!(peer.sent().len(), 2);
    }

    #[test]
    fn test_error_rejects_with_detail() {
        let (session, connector) = session();
        let peer = open(&session, &connector);

        let rpc = session.rpc("user", "get", vec![]);
        let scope = session.scope("chat", None);
        peer.fail("connection reset");

        let err = rpc.now_or_never().expect("settled").expect_err("rejected");
        assert!(matches!(err, Error::Transport { ref message } if message == "connection reset"));
        let err = scope.now_or_never().expect("settled").expect_err("rejected");
        assert!(matches!(err, Error::Transport { .. }));
        assert_eq!(session.status(), ConnectionStatus::Offline);
        assert!(session.has_connected());
        assert!(!session.has_transport());
    }

    #[test]
    fn test_error_clears_scope_cache() {
        let (session, connector) = session();
        let peer = open(&session, &connector);

        let chat = session.scope("chat", None);
        peer.deliver_packet(&Inbound::scope_response(ScopeSerial::new(1), true, json!(["send"])))
            .expect("encodable");
        chat.now_or_never().expect("settled").expect("resolved");
        assert_eq!(session.cached_scopes(), 1);

        peer.fail("connection reset");
        assert_eq!(session.cached_scopes(), 0);

        assert!(session.reconnect());
        let peer = connector.last().expect("transport");
        peer.open();
        let _chat = session.scope("chat", None);
        assert_eq!(
            peer.sent_packets().expect("decodable"),
            vec![Outbound::scope(ScopeSerial::new(2), "chat", true)]
        );
    }

    #[test]
    fn test_error_announces_error_then_disconnect() {
        let (session, connector) = session();
        let seen = Arc::new(Mutex::new(Vec::new()));

        for event in ["connect", "disconnect", "error"] {
            let seen = Arc::clone(&seen);
            session
                .on(event, move |_| seen.lock().push(event))
                .expect("known event");
        }

        let peer = open(&session, &connector);
        peer.fail("reset");
        // The transport is already gone; a trailing close is stale
        peer.close();

        assert_eq!(*seen.lock(), vec!["connect", "error", "disconnect"]);
    }

    #[test]
    fn test_lifecycle_events_emitted() {
        let (session, connector) = session();
        let seen = Arc::new(Mutex::new(Vec::new()));

        for event in ["connect", "disconnect", "error"] {
            let seen = Arc::clone(&seen);
            session
                .on(event, move |payload| seen.lock().push((event, payload.clone())))
                .expect("known event");
        }

        let peer = open(&session, &connector);
        peer.fail("boom");
        session.reconnect();
        connector.last().expect("transport").close();

        assert_eq!(
            *seen.lock(),
            vec![
                ("connect", Value::Null),
                ("error", json!("boom")),
                ("disconnect", Value::Null),
                ("disconnect", Value::Null),
            ]
        );
    }

    #[test]
    fn test_server_events_and_actions() {
        let actions = Arc::new(Mutex::new(Vec::new()));
        let connector = MemoryConnector::new();
        let session = Session::from_parts(
            "ws://server".into(),
            SessionOptions::new().with_event("presence"),
            Arc::new(connector.clone()),
            Arc::new(JsonCodec),
            Arc::new({
                let actions = Arc::clone(&actions);
                move |action: Value| actions.lock().push(action)
            }),
        );
        let presence = Arc::new(Mutex::new(Vec::new()));
        {
            let presence = Arc::clone(&presence);
            session
                .on("presence", move |payload| presence.lock().push(payload.clone()))
                .expect("declared event");
        }

        let peer = open(&session, &connector);
        peer.deliver_packet(&Inbound::Event {
            name: "presence".into(),
            payload: json!({"user": 7}),
        })
        .expect("encodable");
        peer.deliver_packet(&Inbound::Action {
            payload: json!({"type": "chat/received"}),
        })
        .expect("encodable");

        assert_eq!(*presence.lock(), vec![json!({"user": 7})]);
        assert_eq!(*actions.lock(), vec![json!({"type": "chat/received"})]);
    }

    #[test]
    fn test_listener_may_reenter_session() {
        let (session, connector) = session();
        let weak = session.downgrade();
        session
            .on("disconnect", move |_| {
                if let Some(session) = weak.upgrade() {
                    session.reconnect();
                }
            })
            .expect("known event");

        open(&session, &connector).close();
        assert_eq!(connector.connect_count(), 2);
        assert_eq!(session.status(), ConnectionStatus::Connecting);
    }

    #[test]
    fn test_drop_rejects_with_session_closed() {
        let (session, connector) = session();
        let peer = open(&session, &connector);
        let rpc = session.rpc("user", "get", vec![]);

        drop(session);
        assert!(peer.is_closed());
        let err = rpc.now_or_never().expect("settled").expect_err("rejected");
        assert!(matches!(err, Error::SessionClosed));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rpc_timeout_removes_queued_frame() {
        let connector = MemoryConnector::new();
        let session = Session::from_parts(
            "ws://server".into(),
            SessionOptions::new().with_rpc_timeout(Duration::from_millis(50)),
            Arc::new(connector.clone()),
            Arc::new(JsonCodec),
            Arc::new(|_: Value| {}),
        );

        let rpc = session.rpc("user", "get", vec![]);
        assert_eq!(session.queued_sends(), 1);

        let err = rpc.await.expect_err("timed out");
        assert!(matches!(err, Error::RequestTimeout { serial, timeout_ms: 50 } if serial == RpcSerial::new(1)));
        assert_eq!(session.pending_rpcs(), 0);
        assert_eq!(session.queued_sends(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rpc_timeout_counts_from_issue() {
        let connector = MemoryConnector::new();
        let session = Session::from_parts(
            "ws://server".into(),
            SessionOptions::new().with_rpc_timeout(Duration::from_millis(50)),
            Arc::new(connector.clone()),
            Arc::new(JsonCodec),
            Arc::new(|_: Value| {}),
        );

        let rpc = session.rpc("user", "get", vec![]);
        tokio::time::advance(Duration::from_millis(60)).await;

        let err = rpc.now_or_never().expect("expired").expect_err("timed out");
        assert!(err.is_timeout());
        assert_eq!(session.pending_rpcs(), 0);
    }

    #[tokio::test]
    async fn test_watch_status() {
        let (session, connector) = session();
        let mut status = session.watch_status();

        session.connect("/app").expect("valid url");
        status.changed().await.expect("sender alive");
        assert_eq!(*status.borrow_and_update(), ConnectionStatus::Connecting);

        connector.last().expect("transport").open();
        status.changed().await.expect("sender alive");
        assert_eq!(*status.borrow_and_update(), ConnectionStatus::Online);
    }
}
