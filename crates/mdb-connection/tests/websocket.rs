//! End-to-end tests against a real loopback WebSocket server.

mod support;

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use mdb_connection::{Connection, ConnectionConfig, ConnectionState, TransportError};
use serde_json::{Value, json};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;

use support::{Recorder, TIMEOUT, accept_ws, bind, wait_state};

fn config(url: &str) -> ConnectionConfig {
    ConnectionConfig::new(url).without_watchdog()
}

/// Answer requests and broadcasts like the MusicDB server does: echo
/// `fncname`, `fncsig` and `pass`, wrap the arguments.
fn answer(frame: &str) -> Option<String> {
    let request: Value = serde_json::from_str(frame).ok()?;
    if request["method"] == "call" {
        return None;
    }
    Some(
        json!({
            "method": request["method"],
            "fncname": request["fncname"],
            "fncsig": request["fncsig"],
            "arguments": {"echo": request["arguments"], "key": request["key"]},
            "pass": request["pass"],
        })
        .to_string(),
    )
}

#[tokio::test]
async fn request_round_trip_over_websocket() {
    let (listener, url) = bind().await;
    let server = tokio::spawn(async move {
        let mut ws = accept_ws(&listener).await;
        while let Some(Ok(Message::Text(text))) = ws.next().await {
            if let Some(reply) = answer(text.as_str()) {
                ws.send(Message::text(reply)).await.unwrap();
            }
        }
    });

    let conn = Connection::new(config(&url).with_api_key("s3cret"));
    let recorder = Recorder::attach(&conn);
    conn.connect();
    wait_state(&conn, ConnectionState::Connected).await;

    assert!(conn.call("SetAudioStreamState", Some(json!({"state": "play"}))));
    assert!(conn.request(
        "GetSong",
        "ShowSong",
        Some(json!({"songid": 42})),
        Some(json!({"origin": "test", "ids": [1, 2, 3]})),
    ));

    timeout(TIMEOUT, async {
        while recorder.messages().is_empty() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();

    let messages = recorder.messages();
    assert_eq!(messages.len(), 1);
    let response = &messages[0];
    assert!(response.matches("GetSong", "ShowSong"));
    assert_eq!(response.arguments["echo"], json!({"songid": 42}));
    assert_eq!(response.arguments["key"], "s3cret");
    assert_eq!(response.pass, json!({"origin": "test", "ids": [1, 2, 3]}));

    conn.disconnect();
    wait_state(&conn, ConnectionState::Disconnected).await;
    timeout(TIMEOUT, server).await.unwrap().unwrap();
}

#[tokio::test]
async fn server_notification_and_clean_close() {
    let (listener, url) = bind().await;
    let server = tokio::spawn(async move {
        let mut ws = accept_ws(&listener).await;
        let note = json!({
            "method": "notification",
            "fncname": "MusicDB:AudioStream",
            "fncsig": "onStatusChanged",
            "arguments": "playing",
        });
        ws.send(Message::text(note.to_string())).await.unwrap();
        ws.close(Some(CloseFrame {
            code: CloseCode::Normal,
            reason: "server shutdown".to_string().into(),
        }))
        .await
        .unwrap();
        // Drain until the client acknowledges the close.
        while let Some(Ok(_)) = ws.next().await {}
    });

    let conn = Connection::new(config(&url));
    let recorder = Recorder::attach(&conn);
    conn.connect();
    wait_state(&conn, ConnectionState::Disconnected).await;

    let notes = recorder.notifications();
    assert_eq!(notes.len(), 1);
    assert!(notes[0].matches("MusicDB:AudioStream", "onStatusChanged"));
    assert_eq!(notes[0].arguments, json!("playing"));
    assert!(recorder.errors().is_empty());
    assert!(recorder
        .seen()
        .contains(&support::Seen::Disconnect("server shutdown".into())));
    timeout(TIMEOUT, server).await.unwrap().unwrap();
}

#[tokio::test]
async fn refused_connection_is_reported_as_error() {
    let (listener, url) = bind().await;
    drop(listener);

    let conn = Connection::new(config(&url));
    let recorder = Recorder::attach(&conn);
    conn.connect();
    wait_state(&conn, ConnectionState::Failed).await;

    assert!(matches!(
        recorder.errors().as_slice(),
        [TransportError::Dial { endpoint, .. }] if *endpoint == url
    ));
    assert!(!conn.call("Bounce", None));
}

#[tokio::test]
async fn silent_server_triggers_watchdog_reconnect() {
    let (listener, url) = bind().await;
    let (accepted_tx, mut accepted_rx) = tokio::sync::mpsc::unbounded_channel();
    let server = tokio::spawn(async move {
        // Accept connections but never send anything.
        let mut held = Vec::new();
        loop {
            let ws = accept_ws(&listener).await;
            held.push(ws);
            if accepted_tx.send(held.len()).is_err() {
                break;
            }
        }
    });

    let config = ConnectionConfig::new(&url)
        .with_watchdog_interval(Duration::from_millis(200))
        .with_max_reconnects(Some(1));
    let conn = Connection::new(config);
    let recorder = Recorder::attach(&conn);
    conn.connect();

    assert_eq!(timeout(TIMEOUT, accepted_rx.recv()).await.unwrap(), Some(1));
    assert_eq!(timeout(TIMEOUT, accepted_rx.recv()).await.unwrap(), Some(2));
    wait_state(&conn, ConnectionState::Failed).await;

    assert_eq!(recorder.timeouts(), 2);
    assert_eq!(
        recorder.errors(),
        vec![TransportError::LivenessExhausted { attempts: 1 }]
    );
    server.abort();
}
