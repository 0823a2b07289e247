//! Shared harness for the integration tests: a real server on an ephemeral port backed
//! by a temporary data directory, plus a small JSON-event WebSocket client.

#![allow(dead_code)]

use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use uuid::Uuid;

use echo_server::db::models::{ResetInterval, Room, RoomCategory, RoomKind};
use echo_server::db::DbPool;

pub const RECV_TIMEOUT: Duration = Duration::from_secs(3);

pub struct TestServer {
    pub addr: SocketAddr,
    pub db: DbPool,
    pub jwt_secret: Vec<u8>,
    _data_dir: tempfile::TempDir,
}

/// Start the server on a random port.
pub async fn start_test_server() -> TestServer {
    let tmp_dir = tempfile::tempdir().expect("Failed to create temp dir");
    let data_dir = tmp_dir.path().to_str().unwrap().to_string();

    let db = echo_server::db::init_db(&data_dir).expect("Failed to init DB");
    let jwt_secret = echo_server::auth::jwt::load_or_generate_jwt_secret(&data_dir)
        .expect("Failed to generate JWT secret");

    let state = echo_server::state::AppState::new(db.clone(), jwt_secret.clone());
    let app = echo_server::routes::build_router(state);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .unwrap();
    });

    TestServer {
        addr,
        db,
        jwt_secret,
        _data_dir: tmp_dir,
    }
}

impl TestServer {
    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn ws_url(&self) -> String {
        format!("ws://{}/ws", self.addr)
    }

    /// Create a user and return (user_id, session token).
    pub fn create_user(&self, username: &str) -> (String, String) {
        let user = {
            let conn = self.db.lock().unwrap();
            echo_server::auth::users::create_user(&conn, username).unwrap()
        };
        let token = echo_server::auth::jwt::issue_access_token(&self.jwt_secret, &user.id).unwrap();
        (user.id, token)
    }

    /// Insert an official room directly and return its id.
    pub fn create_room(&self, name: &str, max_participants: u32) -> String {
        let now = Utc::now();
        let room = Room {
            id: Uuid::now_v7().to_string(),
            name: name.to_string(),
            description: None,
            category: RoomCategory::Discussion,
            reset_interval: ResetInterval::Day,
            max_participants,
            participant_count: 0,
            message_count: 0,
            room_type: RoomKind::Official,
            created_by: None,
            next_reset_at: None,
            expires_at: None,
            created_at: now,
            updated_at: now,
            active_participants: Vec::new(),
            participant_history: Vec::new(),
        };
        let conn = self.db.lock().unwrap();
        echo_server::rooms::store::insert_room(&conn, &room).unwrap();
        room.id
    }

    pub fn load_room(&self, room_id: &str) -> Room {
        let conn = self.db.lock().unwrap();
        echo_server::rooms::store::load_room(&conn, room_id)
            .unwrap()
            .expect("room exists")
    }

    pub async fn connect(&self, token: &str) -> WsClient {
        self.try_connect(Some(token))
            .await
            .expect("WebSocket handshake should succeed")
    }

    /// Open a WebSocket carrying the token in the `jwt` cookie. On refusal, returns the
    /// HTTP status of the rejected handshake.
    pub async fn try_connect(&self, token: Option<&str>) -> Result<WsClient, u16> {
        let mut request = self.ws_url().into_client_request().unwrap();
        if let Some(token) = token {
            request
                .headers_mut()
                .insert("Cookie", format!("jwt={}", token).parse().unwrap());
        }

        match tokio_tungstenite::connect_async(request).await {
            Ok((stream, _)) => Ok(WsClient { stream }),
            Err(tokio_tungstenite::tungstenite::Error::Http(response)) => {
                Err(response.status().as_u16())
            }
            Err(e) => panic!("unexpected handshake error: {}", e),
        }
    }
}

pub struct WsClient {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl WsClient {
    pub async fn emit(&mut self, event: &str, data: Value) {
        let frame = json!({ "event": event, "data": data }).to_string();
        self.stream.send(Message::Text(frame.into())).await.unwrap();
    }

    pub async fn send_raw(&mut self, message: Message) {
        self.stream.send(message).await.unwrap();
    }

    /// Next JSON event, skipping control frames.
    pub async fn recv(&mut self) -> Value {
        loop {
            let frame = tokio::time::timeout(RECV_TIMEOUT, self.stream.next())
                .await
                .expect("timed out waiting for an event")
                .expect("stream ended")
                .expect("WebSocket error");
            if let Message::Text(text) = frame {
                return serde_json::from_str(text.as_str()).unwrap();
            }
        }
    }

    /// Next event, asserting its name. Returns the payload.
    pub async fn expect_event(&mut self, name: &str) -> Value {
        let event = self.recv().await;
        assert_eq!(event["event"], name, "unexpected event: {}", event);
        event["data"].clone()
    }

    /// Assert nothing arrives for a short while.
    pub async fn expect_silence(&mut self) {
        let quiet = Duration::from_millis(300);
        loop {
            match tokio::time::timeout(quiet, self.stream.next()).await {
                Err(_) => return,
                Ok(Some(Ok(Message::Text(text)))) => panic!("unexpected event: {}", text),
                Ok(Some(Ok(_))) => continue,
                Ok(other) => panic!("connection ended: {:?}", other),
            }
        }
    }

    pub async fn join(&mut self, room_id: &str) -> Value {
        self.emit("joinRoom", json!({ "roomId": room_id })).await;
        self.expect_event("joinedRoom").await
    }

    /// Close the socket without a close frame.
    pub fn drop_connection(self) {
        drop(self.stream);
    }

    /// Close the socket politely.
    pub async fn close(mut self) {
        let _ = self.stream.close(None).await;
    }
}

pub fn assert_handle_shape(handle: &Value) {
    let handle = handle.as_str().expect("handle is a string");
    let suffix = handle.strip_prefix("user_").expect("handle prefix");
    assert_eq!(suffix.len(), 4);
    assert!(suffix
        .chars()
        .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));
}
