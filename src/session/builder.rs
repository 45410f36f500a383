//! Builder pattern for session configuration.
//!
//! Provides a fluent API for configuring and creating [`Session`] instances.
//!
//! # Example
//!
//! ```ignore
//! use std::time::Duration;
//! use rpc_session::Session;
//!
//! # fn example() -> rpc_session::Result<()> {
//! let session = Session::builder("ws://localhost:9000")
//!     .store(|action: serde_json::Value| println!("{action}"))
//!     .event("presence")
//!     .rpc_timeout(Duration::from_secs(10))
//!     .build()?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;
use url::Url;

use crate::error::{Error, Result};
use crate::protocol::{Codec, JsonCodec};
use crate::transport::{Connector, WsConnector};

use super::core::Session;
use super::options::SessionOptions;
use super::store::ActionSink;

// ============================================================================
// SessionBuilder
// ============================================================================

/// Builder for configuring a [`Session`].
///
/// Use [`Session::builder()`] to create a new builder.
pub struct SessionBuilder {
    /// Host every connect path is resolved against.
    host: String,
    /// Action dispatch target. Required.
    store: Option<Arc<dyn ActionSink>>,
    /// Transport factory. Defaults to [`WsConnector`].
    connector: Option<Arc<dyn Connector>>,
    /// Frame codec. Defaults to [`JsonCodec`].
    codec: Option<Arc<dyn Codec>>,
    /// Connect timeout for the default connector.
    connect_timeout: Option<Duration>,
    options: SessionOptions,
}

impl fmt::Debug for SessionBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionBuilder")
            .field("host", &self.host)
            .field("has_store", &self.store.is_some())
            .field("custom_connector", &self.connector.is_some())
            .field("custom_codec", &self.codec.is_some())
            .field("connect_timeout", &self.connect_timeout)
            .field("options", &self.options)
            .finish()
    }
}

// ============================================================================
// SessionBuilder Implementation
// ============================================================================

impl SessionBuilder {
    /// Creates a builder for `host`.
    #[must_use]
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            store: None,
            connector: None,
            codec: None,
            connect_timeout: None,
            options: SessionOptions::new(),
        }
    }

    /// Sets the target for server `Action` packets.
    #[must_use]
    pub fn store(mut self, store: impl ActionSink) -> Self {
        self.store = Some(Arc::new(store));
        self
    }

    /// Sets the transport factory.
    #[must_use]
    pub fn connector(mut self, connector: impl Connector) -> Self {
        self.connector = Some(Arc::new(connector));
        self
    }

    /// Sets the frame codec.
    #[must_use]
    pub fn codec(mut self, codec: impl Codec) -> Self {
        self.codec = Some(Arc::new(codec));
        self
    }

    /// Replaces all session options.
    #[inline]
    #[must_use]
    pub fn options(mut self, options: SessionOptions) -> Self {
        self.options = options;
        self
    }

    /// Rejects RPCs not answered within `timeout`.
    #[inline]
    #[must_use]
    pub fn rpc_timeout(mut self, timeout: Duration) -> Self {
        self.options.rpc_timeout = Some(timeout);
        self
    }

    /// Declares a server event listeners may register for.
    #[inline]
    #[must_use]
    pub fn event(mut self, event: impl Into<String>) -> Self {
        self.options.events.push(event.into());
        self
    }

    /// Sets the connect timeout of the default WebSocket connector.
    #[inline]
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Builds the session with validation.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidHost`] if the host is not `ws://` or `wss://`
    /// - [`Error::Url`] if the host does not parse
    /// - [`Error::Config`] if no store was set
    /// - [`Error::Config`] if a connect timeout is combined with a custom connector
    pub fn build(self) -> Result<Session> {
        self.validate_host()?;
        let store = self.validate_store()?;
        let connector = self.resolve_connector()?;
        let codec = self.codec.unwrap_or_else(|| Arc::new(JsonCodec));

        debug!(host = %self.host, events = self.options.events.len(), "Session built");
        Ok(Session::from_parts(
            self.host,
            self.options,
            connector,
            codec,
            store,
        ))
    }
}

// ============================================================================
// Validation
// ============================================================================

impl SessionBuilder {
    fn validate_host(&self) -> Result<()> {
        if !(self.host.starts_with("ws://") || self.host.starts_with("wss://")) {
            return Err(Error::invalid_host(&self.host));
        }
        Url::parse(&self.host)?;
        Ok(())
    }

    fn validate_store(&self) -> Result<Arc<dyn ActionSink>> {
        self.store.clone().ok_or_else(|| {
            Error::config(
                "Invalid store. Use .store() to set the action dispatch target.\n\
                 Example: Session::builder(\"ws://localhost:9000\").store(|action| { /* ... */ })",
            )
        })
    }

    fn resolve_connector(&self) -> Result<Arc<dyn Connector>> {
        match (&self.connector, self.connect_timeout) {
            (Some(_), Some(_)) => Err(Error::config(
                "connect_timeout applies to the default WebSocket connector only. \
                 Configure the timeout on the custom connector instead.",
            )),
            (Some(connector), None) => Ok(Arc::clone(connector)),
            (None, Some(timeout)) => Ok(Arc::new(WsConnector::new().with_connect_timeout(timeout))),
            (None, None) => Ok(Arc::new(WsConnector::new())),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
