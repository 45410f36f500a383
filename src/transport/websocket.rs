//! WebSocket transport and event loop.
//!
//! Each transport spawns a tokio task that connects to the server and then
//! handles:
//!
//! - Incoming text frames (reported as `message`)
//! - Outgoing frames queued by the session
//! - Close requests from the session
//! - Remote close and socket errors (reported as `closed` / `failed`)
//!
//! Outgoing frames go through one unbounded channel, so they reach the
//! socket in the order the session queued them.

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, trace, warn};
use url::Url;

use crate::error::{Error, Result};

use super::{Connector, Transport, TransportEvents};

// ============================================================================
// Constants
// ============================================================================

/// Default timeout for the WebSocket handshake.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

// ============================================================================
// SocketCommand
// ============================================================================

/// Internal commands for the event loop.
enum SocketCommand {
    /// Transmit a text frame.
    Send(String),
    /// Close the socket.
    Close,
}

// ============================================================================
// WsConnector
// ============================================================================

/// Connector producing WebSocket transports.
///
/// Requires a tokio runtime at `connect` time; without one the transport
/// reports `failed` immediately.
#[derive(Debug, Clone, Copy)]
pub struct WsConnector {
    /// Maximum time allowed for the handshake.
    connect_timeout: Duration,
}

impl Default for WsConnector {
    fn default() -> Self {
        Self::new()
    }
}

impl WsConnector {
    /// Creates a connector with the default handshake timeout (30s).
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    /// Sets the handshake timeout.
    #[inline]
    #[must_use]
    pub const fn with_connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }

    /// Returns the handshake timeout.
    #[inline]
    #[must_use]
    pub const fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }
}

impl Connector for WsConnector {
    fn connect(&self, url: &Url, events: TransportEvents) -> Box<dyn Transport> {
        let (command_tx, command_rx) = mpsc::unbounded_channel();

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(run_event_loop(
                    url.clone(),
                    self.connect_timeout,
                    command_rx,
                    events,
                ));
            }
            Err(e) => {
                error!(error = %e, "No tokio runtime, transport cannot start");
                // Report from a thread so the session is not re-entered mid-reaction
                std::thread::spawn(move || events.failed(format!("no tokio runtime: {e}")));
            }
        }

        Box::new(WsTransport { command_tx })
    }
}

// ============================================================================
// WsTransport
// ============================================================================

/// Handle to a running WebSocket event loop.
///
/// Dropping the handle closes the socket.
struct WsTransport {
    /// Channel for sending commands to the event loop.
    command_tx: mpsc::UnboundedSender<SocketCommand>,
}

impl Transport for WsTransport {
    fn send(&self, frame: String) -> Result<()> {
        self.command_tx
            .send(SocketCommand::Send(frame))
            .map_err(|_| Error::transport("WebSocket event loop has stopped"))
    }

    fn close(&self) {
        let _ = self.command_tx.send(SocketCommand::Close);
    }
}

// ============================================================================
// Event Loop
// ============================================================================

/// Event loop that owns one WebSocket.
async fn run_event_loop(
    url: Url,
    connect_timeout: Duration,
    mut command_rx: mpsc::UnboundedReceiver<SocketCommand>,
    events: TransportEvents,
) {
    let transport = events.id();

    let ws_stream = match timeout(connect_timeout, connect_async(url.as_str())).await {
        Ok(Ok((ws_stream, _response))) => ws_stream,
        Ok(Err(e)) => {
            warn!(%transport, %url, error = %e, "WebSocket connect failed");
            events.failed(Error::from(e).to_string());
            return;
        }
        Err(_) => {
            warn!(%transport, %url, "WebSocket connect timed out");
            events.failed(Error::connection_timeout(connect_timeout).to_string());
            return;
        }
    };

    debug!(%transport, %url, "WebSocket connected");
    events.opened();

    let (mut ws_write, mut ws_read) = ws_stream.split();

    loop {
        tokio::select! {
            // Incoming frames from the server
            message = ws_read.next() => {
                match message {
                    Some(Ok(Message::Text(text))) => {
                        trace!(%transport, len = text.len(), "Frame received");
                        events.message(text.as_str());
                    }

                    Some(Ok(Message::Close(_))) => {
                        debug!(%transport, "WebSocket closed by remote");
                        events.closed();
                        break;
                    }

                    Some(Err(e)) => {
                        error!(%transport, error = %e, "WebSocket error");
                        events.failed(Error::from(e).to_string());
                        break;
                    }

                    None => {
                        debug!(%transport, "WebSocket stream ended");
                        events.closed();
                        break;
                    }

                    // Ignore Binary, Ping, Pong
                    _ => {}
                }
            }

            // Commands from the session
            command = command_rx.recv() => {
                match command {
                    Some(SocketCommand::Send(frame)) => {
                        if let Err(e) = ws_write.send(Message::Text(frame.into())).await {
                            warn!(%transport, error = %e, "Failed to send frame");
                            events.failed(Error::from(e).to_string());
                            break;
                        }
                        trace!(%transport, "Frame sent");
                    }

                    Some(SocketCommand::Close) | None => {
                        debug!(%transport, "Close requested");
                        let _ = ws_write.close().await;
                        events.closed();
                        break;
                    }
                }
            }
        }
    }

    debug!(%transport, "Event loop terminated");
}

// ============================================================================
// Tests
// ============================================================================
