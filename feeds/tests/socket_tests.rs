//! ResilientSocket tests against a local in-process WebSocket server

use feeds::{ResilientSocket, SocketConfig, SocketEvent};
use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

/// Echo server that abruptly drops the connection on "drop".
///
/// Keeps accepting, so a reconnecting client finds it again.
async fn spawn_server() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            tokio::spawn(async move {
                let Ok(mut ws) = tokio_tungstenite::accept_async(stream).await else {
                    return;
                };
                while let Some(Ok(msg)) = ws.next().await {
                    match msg {
                        Message::Text(text) if text == "drop" => return,
                        Message::Text(text) => {
                            if ws.send(Message::Text(format!("echo:{text}"))).await.is_err() {
                                return;
                            }
                        }
                        Message::Close(_) => return,
                        _ => {}
                    }
                }
            });
        }
    });

    addr
}

fn config(addr: SocketAddr) -> SocketConfig {
    SocketConfig::new(format!("ws://{addr}"))
        .with_retry_delay(Duration::from_millis(100))
        .with_retry_jitter(Duration::ZERO)
}

async fn next_event(events: &mut mpsc::UnboundedReceiver<SocketEvent>) -> SocketEvent {
    tokio::time::timeout(Duration::from_secs(5), events.recv())
        .await
        .expect("timed out waiting for a socket event")
        .expect("socket event channel closed")
}

/// Wait for a specific lifecycle event, skipping messages and errors.
async fn wait_for(
    events: &mut mpsc::UnboundedReceiver<SocketEvent>,
    want: fn(&SocketEvent) -> bool,
) -> SocketEvent {
    loop {
        let event = next_event(events).await;
        if want(&event) {
            return event;
        }
    }
}

#[tokio::test]
async fn test_connects_and_echoes() {
    let addr = spawn_server().await;
    let (socket, mut events) = ResilientSocket::spawn(config(addr));

    socket.connect();
    wait_for(&mut events, |e| matches!(e, SocketEvent::Connecting)).await;
    wait_for(&mut events, |e| matches!(e, SocketEvent::Connected)).await;

    socket.send("hello".to_string());
    let event = wait_for(&mut events, |e| matches!(e, SocketEvent::Message(_))).await;
    match event {
        SocketEvent::Message(Message::Text(text)) => assert_eq!(text, "echo:hello"),
        other => panic!("expected text message, got {other:?}"),
    }

    socket.close();
    wait_for(&mut events, |e| matches!(e, SocketEvent::Closed)).await;
}

#[tokio::test]
async fn test_reconnects_after_abrupt_disconnect() {
    let addr = spawn_server().await;
    let (socket, mut events) = ResilientSocket::spawn(config(addr));

    socket.connect();
    wait_for(&mut events, |e| matches!(e, SocketEvent::Connected)).await;

    // The server kills this connection without a close handshake.
    socket.send("drop".to_string());
    wait_for(&mut events, |e| matches!(e, SocketEvent::Disconnected)).await;
    wait_for(&mut events, |e| matches!(e, SocketEvent::Reconnecting)).await;

    // Without any further calls the socket comes back on its own.
    wait_for(&mut events, |e| matches!(e, SocketEvent::Connected)).await;

    // And the new connection works.
    socket.send("again".to_string());
    let event = wait_for(&mut events, |e| matches!(e, SocketEvent::Message(_))).await;
    match event {
        SocketEvent::Message(Message::Text(text)) => assert_eq!(text, "echo:again"),
        other => panic!("expected text message, got {other:?}"),
    }

    socket.close();
    wait_for(&mut events, |e| matches!(e, SocketEvent::Closed)).await;
}

#[tokio::test]
async fn test_close_during_backoff_cancels_retry() {
    // No server at all: the connect fails and the socket sits in backoff.
    let (socket, mut events) = ResilientSocket::spawn(
        SocketConfig::new("ws://127.0.0.1:9".to_string())
            .with_retry_delay(Duration::from_secs(60))
            .with_retry_jitter(Duration::ZERO),
    );

    socket.connect();
    wait_for(&mut events, |e| matches!(e, SocketEvent::Reconnecting)).await;

    // Closing mid-backoff must cancel the pending retry, not ignore it.
    socket.close();
    wait_for(&mut events, |e| matches!(e, SocketEvent::Closed)).await;

    // The task exited: the event stream ends instead of reviving.
    let end = tokio::time::timeout(Duration::from_secs(1), events.recv()).await;
    assert!(matches!(end, Ok(None)), "socket task kept running");
}

#[tokio::test]
async fn test_send_while_disconnected_is_dropped() {
    let addr = spawn_server().await;
    let (socket, mut events) = ResilientSocket::spawn(config(addr));

    // Not connected yet: these go nowhere, and must not error or panic.
    socket.send("into the void".to_string());

    socket.connect();
    wait_for(&mut events, |e| matches!(e, SocketEvent::Connected)).await;

    // Only traffic sent after the connect echoes back.
    socket.send("first-real".to_string());
    let event = wait_for(&mut events, |e| matches!(e, SocketEvent::Message(_))).await;
    match event {
        SocketEvent::Message(Message::Text(text)) => assert_eq!(text, "echo:first-real"),
        other => panic!("expected text message, got {other:?}"),
    }

    socket.close();
    wait_for(&mut events, |e| matches!(e, SocketEvent::Closed)).await;
}
