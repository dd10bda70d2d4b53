//! Integration tests for WebSocketPushChannel
//!
//! Runs a local WebSocket server and checks the observer contract:
//! open before frames, server close reported once, user close not
//! reported at all.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use livesync_core::domain::{OutboundMessage, SessionId};
use livesync_core::ports::IPushChannel;
use livesync_transport::WebSocketPushChannel;
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;

use crate::common::{self, Seen};

#[tokio::test]
async fn test_open_then_frames() {
    let (url, mut accepted) = common::start_ws_server().await;
    let channel = WebSocketPushChannel::new(&url).unwrap();
    let (observer, mut seen) = common::recorder();

    channel.connect(observer).await.expect("connect failed");
    assert_eq!(common::next_seen(&mut seen).await, Seen::Open);

    let mut server = accepted.recv().await.unwrap();
    let frame = r#"{"type":"stats_update","data":{"cpu":1}}"#;
    server.send(Message::Text(frame.to_string())).await.unwrap();

    assert_eq!(
        common::next_seen(&mut seen).await,
        Seen::Frame(frame.to_string())
    );
}

#[tokio::test]
async fn test_send_reaches_server_as_json_text() {
    let (url, mut accepted) = common::start_ws_server().await;
    let channel = WebSocketPushChannel::new(&url).unwrap();
    let (observer, _seen) = common::recorder();
    channel.connect(observer).await.unwrap();
    let mut server = accepted.recv().await.unwrap();

    channel
        .send(&OutboundMessage::request_refresh_all())
        .await
        .unwrap();
    channel
        .send(&OutboundMessage::Authenticate {
            session_id: SessionId::new("abc123").unwrap(),
        })
        .await
        .unwrap();

    let Some(Ok(Message::Text(first))) = server.next().await else {
        panic!("expected a text frame");
    };
    let first: serde_json::Value = serde_json::from_str(&first).unwrap();
    assert_eq!(
        first,
        serde_json::json!({"event": "request_refresh", "data": {"type": "all"}})
    );

    let Some(Ok(Message::Text(second))) = server.next().await else {
        panic!("expected a text frame");
    };
    let second: serde_json::Value = serde_json::from_str(&second).unwrap();
    assert_eq!(second["event"], "authenticate");
    assert_eq!(second["data"]["session_id"], "abc123");
}

#[tokio::test]
async fn test_server_close_reported_with_reason() {
    let (url, mut accepted) = common::start_ws_server().await;
    let channel = WebSocketPushChannel::new(&url).unwrap();
    let (observer, mut seen) = common::recorder();
    channel.connect(observer).await.unwrap();
    assert_eq!(common::next_seen(&mut seen).await, Seen::Open);

    let mut server = accepted.recv().await.unwrap();
    server
        .close(Some(CloseFrame {
            code: CloseCode::Normal,
            reason: "server restart".into(),
        }))
        .await
        .unwrap();

    assert_eq!(
        common::next_seen(&mut seen).await,
        Seen::Close(Some("server restart".to_string()))
    );
}

#[tokio::test]
async fn test_disconnect_is_not_reported() {
    let (url, mut accepted) = common::start_ws_server().await;
    let channel = WebSocketPushChannel::new(&url).unwrap();
    let (observer, mut seen) = common::recorder();
    // Held here so the recorder's channel outlives the reader task
    let _observer = observer.clone();
    channel.connect(observer).await.unwrap();
    assert_eq!(common::next_seen(&mut seen).await, Seen::Open);
    let mut server = accepted.recv().await.unwrap();

    channel.disconnect().await.unwrap();

    // The server sees the close frame
    let frame = tokio::time::timeout(Duration::from_secs(1), server.next())
        .await
        .unwrap();
    assert!(matches!(frame, Some(Ok(Message::Close(_))) | None));

    // The observer hears nothing
    let heard = tokio::time::timeout(Duration::from_millis(200), seen.recv()).await;
    assert!(heard.is_err(), "unexpected callback: {heard:?}");

    assert!(channel
        .send(&OutboundMessage::request_refresh_all())
        .await
        .is_err());
}

#[tokio::test]
async fn test_connect_refused_is_an_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let channel = WebSocketPushChannel::new(&format!("ws://{addr}/ws")).unwrap();
    let (observer, mut seen) = common::recorder();

    assert!(channel.connect(observer).await.is_err());
    assert!(seen.try_recv().is_err());
}

#[tokio::test]
async fn test_reconnect_replaces_connection() {
    let (url, mut accepted) = common::start_ws_server().await;
    let channel = WebSocketPushChannel::new(&url).unwrap();

    let (first, mut first_seen) = common::recorder();
    channel.connect(first).await.unwrap();
    assert_eq!(common::next_seen(&mut first_seen).await, Seen::Open);
    let _old_server = accepted.recv().await.unwrap();

    let (second, mut second_seen) = common::recorder();
    channel.connect(second).await.unwrap();
    assert_eq!(common::next_seen(&mut second_seen).await, Seen::Open);
    let mut server = accepted.recv().await.unwrap();

    server
        .send(Message::Text(r#"{"type":"ping"}"#.to_string()))
        .await
        .unwrap();
    assert_eq!(
        common::next_seen(&mut second_seen).await,
        Seen::Frame(r#"{"type":"ping"}"#.to_string())
    );

    // The replaced connection's reader was aborted, not closed
    assert!(first_seen.try_recv().is_err());
}
