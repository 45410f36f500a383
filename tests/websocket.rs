//! Session over a real WebSocket against a local server.

use std::time::Duration;

use anyhow::{Context, Result};
use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;

use rpc_session::{ConnectionStatus, Error, Inbound, Outbound, Session};

const WAIT: Duration = Duration::from_secs(5);

// ============================================================================
// Server
// ============================================================================

/// Accepts one connection and answers every packet.
///
/// - `rpc` echoes operation and args
/// - `scope` resolves with `["send", "history"]`
/// - `call` pushes a `presence` event and an action
async fn serve_one(listener: TcpListener) -> Result<()> {
    let (stream, _) = listener.accept().await?;
    let mut ws = accept_async(stream).await?;

    while let Some(Ok(message)) = ws.next().await {
        let Message::Text(text) = message else {
            continue;
        };

        let replies = match serde_json::from_str::<Outbound>(text.as_str())? {
            Outbound::Rpc {
                serial,
                operation,
                args,
                ..
            } => vec![Inbound::rpc_ok(serial, json!({"operation": operation, "args": args}))],
            Outbound::Scope { serial, .. } => vec![Inbound::scope_response(
                serial,
                true,
                json!(["send", "history"]),
            )],
            Outbound::Call { operation, .. } => vec![
                Inbound::Event {
                    name: "presence".into(),
                    payload: json!({"operation": operation}),
                },
                Inbound::Action {
                    payload: json!({"type": "called"}),
                },
            ],
        };

        for reply in replies {
            let frame = serde_json::to_string(&reply)?;
            ws.send(Message::Text(frame.into())).await?;
        }
    }

    Ok(())
}

async fn spawn_server() -> Result<(String, JoinHandle<Result<()>>)> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let host = format!("ws://{}", listener.local_addr()?);
    Ok((host, tokio::spawn(serve_one(listener))))
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn test_rpc_and_scope_over_websocket() -> Result<()> {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();

    let (host, server) = spawn_server().await?;
    let session = Session::builder(host)
        .store(|_: Value| {})
        .connect_timeout(WAIT)
        .build()?;

    session.connect("/")?;
    // Issued while the handshake is in progress
    let reply = session.rpc("user", "getProfile", vec![json!(42)]);

    let reply = timeout(WAIT, reply).await??.into_value()?;
    assert_eq!(reply, json!({"operation": "getProfile", "args": [42]}));
    assert_eq!(session.status(), ConnectionStatus::Online);

    let chat = timeout(WAIT, session.scope("chat", None)).await??;
    let sent = timeout(WAIT, chat.invoke("history", vec![json!(10)])).await??;
    assert_eq!(sent.into_value()?["operation"], "history");

    session.close();
    timeout(WAIT, server).await???;
    Ok(())
}

#[tokio::test]
async fn test_events_and_actions_over_websocket() -> Result<()> {
    let (host, server) = spawn_server().await?;
    let (action_tx, mut action_rx) = mpsc::unbounded_channel();
    let (event_tx, mut event_rx) = mpsc::unbounded_channel();

    let session = Session::builder(host)
        .store(move |action: Value| {
            let _ = action_tx.send(action);
        })
        .event("presence")
        .build()?;
    session.on("presence", move |payload| {
        let _ = event_tx.send(payload.clone());
    })?;

    session.connect("/")?;
    session.call("chat", "typing", vec![])?;

    let event = timeout(WAIT, event_rx.recv()).await?.context("event channel closed")?;
    assert_eq!(event, json!({"operation": "typing"}));
    let action = timeout(WAIT, action_rx.recv()).await?.context("action channel closed")?;
    assert_eq!(action, json!({"type": "called"}));

    session.close();
    timeout(WAIT, server).await???;
    Ok(())
}

#[tokio::test]
async fn test_refused_connection_rejects_queued_rpc() -> Result<()> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let host = format!("ws://{}", listener.local_addr()?);
    drop(listener);

    let session = Session::builder(host)
        .store(|_: Value| {})
        .connect_timeout(WAIT)
        .build()?;

    let (event_tx, mut event_rx) = mpsc::unbounded_channel();
    for event in ["error", "disconnect"] {
        let event_tx = event_tx.clone();
        session.on(event, move |payload| {
            let _ = event_tx.send((event, payload.clone()));
        })?;
    }

    session.connect("/")?;
    let rpc = session.rpc("user", "get", vec![]);

    let err = timeout(WAIT, rpc).await?.expect_err("connection refused");
    assert!(matches!(err, Error::Transport { .. }));
    assert!(err.is_recoverable());

    let (event, detail) = timeout(WAIT, event_rx.recv()).await?.context("event channel closed")?;
    assert_eq!(event, "error");
    assert!(detail.is_string());
    let (event, _) = timeout(WAIT, event_rx.recv()).await?.context("event channel closed")?;
    assert_eq!(event, "disconnect");
    assert_eq!(session.status(), ConnectionStatus::Offline);
    Ok(())
}
