//! Integration tests for realtime chat rooms.

mod common;

use common::{TestClient, TestServer};
use serde_json::json;
use std::time::Duration;
use tokio_tungstenite::tungstenite::Message;

const QUIET: Duration = Duration::from_millis(200);

/// Wait until `check` holds, polling the server state.
async fn eventually(mut check: impl FnMut() -> bool) {
    for _ in 0..100 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("condition not reached in time");
}

#[tokio::test]
async fn test_connected_greeting_carries_id() {
    let server = TestServer::spawn().await.expect("Failed to spawn test server");
    let client = TestClient::connect(server.realtime_addr())
        .await
        .expect("Failed to connect");
    assert!(!client.connection_id.is_empty());
    server.server.shutdown("test done").await;
}

#[tokio::test]
async fn test_typing_reaches_room_but_not_sender() {
    let server = TestServer::spawn().await.expect("Failed to spawn test server");
    let mut c1 = TestClient::connect(server.realtime_addr()).await.unwrap();
    let mut c2 = TestClient::connect(server.realtime_addr()).await.unwrap();

    c1.join("chat-1").await.unwrap();
    c2.join("chat-1").await.unwrap();
    let rooms = server.server.rooms().clone();
    eventually(|| rooms.members("chat-1").len() == 2).await;

    c1.send_event(
        "typing",
        json!({"chatId": "chat-1", "userId": "u1", "userName": "Ana"}),
    )
    .await
    .unwrap();

    let data = c2.expect_event("user_typing").await.unwrap();
    assert_eq!(data, json!({"chatId": "chat-1", "userId": "u1", "userName": "Ana"}));
    c1.expect_silence(QUIET).await.unwrap();

    c1.send_event("stop_typing", json!({"chatId": "chat-1", "userId": "u1"}))
        .await
        .unwrap();
    let data = c2.expect_event("user_stopped_typing").await.unwrap();
    assert_eq!(data, json!({"chatId": "chat-1", "userId": "u1"}));
    c1.expect_silence(QUIET).await.unwrap();

    server.server.shutdown("test done").await;
}

#[tokio::test]
async fn test_events_stay_in_their_room() {
    let server = TestServer::spawn().await.expect("Failed to spawn test server");
    let mut c1 = TestClient::connect(server.realtime_addr()).await.unwrap();
    let mut c2 = TestClient::connect(server.realtime_addr()).await.unwrap();

    c1.join("chat-a").await.unwrap();
    c2.join("chat-b").await.unwrap();
    let rooms = server.server.rooms().clone();
    eventually(|| rooms.room_count() == 2).await;

    c1.send_event(
        "typing",
        json!({"chatId": "chat-a", "userId": "u1", "userName": "Ana"}),
    )
    .await
    .unwrap();
    c2.expect_silence(QUIET).await.unwrap();

    server.server.shutdown("test done").await;
}

#[tokio::test]
async fn test_leave_stops_delivery() {
    let server = TestServer::spawn().await.expect("Failed to spawn test server");
    let mut c1 = TestClient::connect(server.realtime_addr()).await.unwrap();
    let mut c2 = TestClient::connect(server.realtime_addr()).await.unwrap();

    c1.join("chat-1").await.unwrap();
    c2.join("chat-1").await.unwrap();
    let rooms = server.server.rooms().clone();
    eventually(|| rooms.members("chat-1").len() == 2).await;

    c2.leave("chat-1").await.unwrap();
    eventually(|| rooms.members("chat-1").len() == 1).await;

    c1.send_event("stop_typing", json!({"chatId": "chat-1", "userId": "u1"}))
        .await
        .unwrap();
    c2.expect_silence(QUIET).await.unwrap();

    server.server.shutdown("test done").await;
}

#[tokio::test]
async fn test_disconnect_removes_memberships() {
    let server = TestServer::spawn().await.expect("Failed to spawn test server");
    let mut c1 = TestClient::connect(server.realtime_addr()).await.unwrap();
    let id = c1.connection_id.clone();

    c1.join("chat-1").await.unwrap();
    c1.join("chat-2").await.unwrap();
    let rooms = server.server.rooms().clone();
    eventually(|| rooms.rooms_of(&id).len() == 2).await;

    c1.close().await.unwrap();
    eventually(|| rooms.rooms_of(&id).is_empty() && rooms.room_count() == 0).await;
    eventually(|| rooms.connection_count() == 0).await;

    server.server.shutdown("test done").await;
}

#[tokio::test]
async fn test_malformed_frames_get_error_events() {
    let server = TestServer::spawn().await.expect("Failed to spawn test server");
    let mut c1 = TestClient::connect(server.realtime_addr()).await.unwrap();

    c1.send_raw(Message::Text("not json".into())).await.unwrap();
    let data = c1.expect_event("error").await.unwrap();
    assert_eq!(data["code"], "INVALID_EVENT");

    c1.send_event("typing", json!({"chatId": "chat-1"})).await.unwrap();
    let data = c1.expect_event("error").await.unwrap();
    assert_eq!(data["code"], "INVALID_EVENT");

    c1.send_raw(Message::Binary(vec![1, 2, 3])).await.unwrap();
    let data = c1.expect_event("error").await.unwrap();
    assert_eq!(data["code"], "UNSUPPORTED_FRAME");

    // The connection survives bad frames.
    c1.join("chat-1").await.unwrap();
    let rooms = server.server.rooms().clone();
    eventually(|| rooms.room_count() == 1).await;

    server.server.shutdown("test done").await;
}

#[tokio::test]
async fn test_idle_connection_is_closed() {
    let server = TestServer::spawn_with(|config| config.server.listen_timeout_ms = 200)
        .await
        .expect("Failed to spawn test server");
    let mut c1 = TestClient::connect(server.realtime_addr()).await.unwrap();

    c1.expect_closed(Duration::from_secs(2)).await.unwrap();
    let rooms = server.server.rooms().clone();
    eventually(|| rooms.connection_count() == 0).await;

    server.server.shutdown("test done").await;
}

#[tokio::test]
async fn test_disallowed_origin_is_rejected() {
    use tokio_tungstenite::tungstenite::client::IntoClientRequest;

    let server = TestServer::spawn_with(|config| {
        config.realtime.allow_origins = vec!["https://app.example".to_string()];
    })
    .await
    .expect("Failed to spawn test server");

    let url = format!("ws://{}/", server.realtime_addr());
    let mut request = url.as_str().into_client_request().unwrap();
    request
        .headers_mut()
        .insert("Origin", "https://evil.example".parse().unwrap());
    assert!(tokio_tungstenite::connect_async(request).await.is_err());

    let mut request = url.as_str().into_client_request().unwrap();
    request
        .headers_mut()
        .insert("Origin", "https://app.example".parse().unwrap());
    assert!(tokio_tungstenite::connect_async(request).await.is_ok());

    server.server.shutdown("test done").await;
}
