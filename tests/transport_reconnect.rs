//! Integration tests for the transport connection manager
//!
//! Runs a real in-process WebSocket server and exercises connect, event
//! dispatch, room join emission, reconnect backoff exhaustion, and
//! teardown.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::time::timeout;
use tokio_tungstenite::{accept_async, tungstenite::protocol::Message};

use blockpulse::config::SyncConfig;
use blockpulse::transport::{ConnectionManager, ConnectionPhase, RoomSubscriptions};
use blockpulse::types::{Role, ServerEvent, User};

fn test_config(socket_url: String) -> SyncConfig {
    SyncConfig {
        socket_url,
        reconnect_base_delay: Duration::from_millis(10),
        max_reconnect_attempts: 3,
        ..SyncConfig::default()
    }
}

fn cleaner(block: &str) -> User {
    User {
        id: "u1".to_string(),
        name: "Demo Cleaner".to_string(),
        email: "cleaner@demo.com".to_string(),
        role: Role::Cleaner,
        block_id: Some(block.to_string()),
        last_active: None,
    }
}

#[tokio::test]
async fn connects_dispatches_events_and_emits_joins() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    // Server: accept one connection, push a hygiene tick, then echo back
    // the first frame the client sends.
    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(stream).await.unwrap();

        let tick = serde_json::json!({
            "event": "hygiene_tick",
            "data": {
                "blockId": "b9",
                "score": 81.5,
                "timestamp": "2025-06-01T10:00:00Z",
                "sensors": {
                    "cleanliness": 80.0,
                    "odor": 78.0,
                    "usage": 85.0,
                    "maintenance": 83.0
                }
            }
        });
        ws.send(Message::Text(tick.to_string())).await.unwrap();

        // First client frame should be the room join
        loop {
            match ws.next().await {
                Some(Ok(Message::Text(text))) => return text,
                Some(Ok(_)) => continue,
                other => panic!("expected join frame, got {:?}", other),
            }
        }
    });

    let manager = ConnectionManager::new(&test_config(format!("ws://{}", addr)));
    let mut events = manager.subscribe();
    let mut state = manager.state();

    manager.connect("tok-1").await.unwrap();
    timeout(Duration::from_secs(2), state.wait_for(|s| s.is_connected()))
        .await
        .expect("connect timed out")
        .unwrap();

    // Connecting again while connected is a no-op
    manager.connect("tok-1").await.unwrap();

    let event = timeout(Duration::from_secs(2), events.recv())
        .await
        .expect("event dispatch timed out")
        .unwrap();
    match event {
        ServerEvent::HygieneTick(sample) => {
            assert_eq!(sample.block_id, "b9");
            assert_eq!(sample.score, 81.5);
        }
        other => panic!("unexpected event: {:?}", other),
    }

    // Join the role-derived room set: cleaner with a block joins exactly one
    let rooms = RoomSubscriptions::new();
    rooms.join_for(&manager, &cleaner("b9")).await;
    assert_eq!(rooms.joined(), vec!["block:b9".to_string()]);

    let join_frame = timeout(Duration::from_secs(2), server)
        .await
        .expect("server timed out")
        .unwrap();
    let join: serde_json::Value = serde_json::from_str(&join_frame).unwrap();
    assert_eq!(join["event"], "join_room");
    assert_eq!(join["data"]["room"], "block:b9");

    manager.teardown().await;
    assert_eq!(manager.phase(), ConnectionPhase::Disconnected);
}

#[tokio::test]
async fn remote_close_triggers_reconnect_with_reset_attempt() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    // Server: drop the first connection immediately; on the second, push a
    // marker event so the client can prove the reconnect happened, then
    // hold it open.
    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let ws = accept_async(stream).await.unwrap();
        drop(ws);

        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(stream).await.unwrap();
        let marker = serde_json::json!({
            "event": "block_status_changed",
            "data": {
                "blockId": "reconnected",
                "status": "operational",
                "timestamp": "2025-06-01T10:00:00Z"
            }
        });
        ws.send(Message::Text(marker.to_string())).await.unwrap();
        // Hold the connection until the client goes away
        while let Some(Ok(_)) = ws.next().await {}
    });

    let manager = ConnectionManager::new(&test_config(format!("ws://{}", addr)));
    let mut events = manager.subscribe();

    manager.connect("tok-1").await.unwrap();

    // Watch states coalesce, so observe the reconnect through the marker
    // event delivered only on the second connection.
    let event = timeout(Duration::from_secs(5), events.recv())
        .await
        .expect("reconnect never completed")
        .unwrap();
    match event {
        ServerEvent::BlockStatusChanged(ev) => assert_eq!(ev.block_id, "reconnected"),
        other => panic!("unexpected event: {:?}", other),
    }

    // Attempt counter resets on a successful connect
    let state = manager.state().borrow().clone();
    assert!(state.is_connected());
    assert_eq!(state.attempt, 0);

    manager.teardown().await;
    let _ = timeout(Duration::from_secs(2), server).await;
}

#[tokio::test]
async fn backoff_stops_after_max_attempts() {
    // Nothing listens here; every connect attempt fails fast
    let manager = ConnectionManager::new(&test_config("ws://127.0.0.1:9".to_string()));
    let mut state = manager.state();

    manager.connect("tok-1").await.unwrap();

    let offline = timeout(Duration::from_secs(5), state.wait_for(|s| s.is_offline(3)))
        .await
        .expect("offline state never reached")
        .unwrap()
        .clone();
    assert_eq!(offline.phase, ConnectionPhase::Reconnecting);
    assert_eq!(offline.attempt, 4);
    assert!(offline.last_error.is_some());

    // No further attempts are scheduled: the state stays put
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(*manager.state().borrow(), offline);

    // Teardown leaves the terminal offline state cleanly
    manager.teardown().await;
    assert_eq!(manager.phase(), ConnectionPhase::Disconnected);
}

#[tokio::test]
async fn teardown_cancels_pending_retry() {
    let manager = ConnectionManager::new(&test_config("ws://127.0.0.1:9".to_string()));
    let mut state = manager.state();

    manager.connect("tok-1").await.unwrap();
    timeout(
        Duration::from_secs(2),
        state.wait_for(|s| s.phase == ConnectionPhase::Reconnecting),
    )
    .await
    .expect("reconnecting not observed")
    .unwrap();

    manager.teardown().await;
    assert_eq!(manager.phase(), ConnectionPhase::Disconnected);

    // The cancelled task must not resurrect the state afterwards
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(manager.phase(), ConnectionPhase::Disconnected);
}
