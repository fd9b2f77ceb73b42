use std::net::SocketAddr;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

use emberlink_server::config::ServerConfig;
use emberlink_server::{build_app, spawn_janitor};

pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub struct TestServer {
    pub addr: SocketAddr,
    _server: tokio::task::JoinHandle<()>,
    _janitor: tokio::task::JoinHandle<()>,
}

impl TestServer {
    /// Start a test server with default configuration.
    pub async fn new() -> Self {
        Self::from_config(ServerConfig::default()).await
    }

    pub async fn from_config(config: ServerConfig) -> Self {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let (app, state) = build_app(config);
        let janitor = spawn_janitor(state, CancellationToken::new());

        let server = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        // Give the server a moment to start accepting
        tokio::time::sleep(Duration::from_millis(20)).await;

        Self {
            addr,
            _server: server,
            _janitor: janitor,
        }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn ws_url(&self) -> String {
        format!("ws://{}/ws", self.addr)
    }
}

/// Create a room through the REST API and return its code.
pub async fn create_room(server: &TestServer) -> String {
    let resp = reqwest::Client::new()
        .post(format!("{}/api/rooms", server.base_url()))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);
    let body: Value = resp.json().await.unwrap();
    body["roomId"].as_str().unwrap().to_string()
}

/// Connect a WebSocket client to the given URL.
pub async fn ws_connect(url: &str) -> WsStream {
    let (stream, _) = tokio_tungstenite::connect_async(url).await.unwrap();
    stream
}

pub async fn ws_send_json(stream: &mut WsStream, value: &Value) {
    stream
        .send(Message::Text(value.to_string().into()))
        .await
        .unwrap();
}

/// Read frames until a JSON text frame arrives. Panics after 5 seconds.
pub async fn ws_read_json(stream: &mut WsStream) -> Value {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match stream.next().await {
                Some(Ok(Message::Text(text))) => {
                    return serde_json::from_str(text.as_str()).expect("invalid JSON frame");
                },
                Some(Ok(_)) => continue,
                other => panic!("WebSocket ended while waiting for a frame: {other:?}"),
            }
        }
    })
    .await
    .expect("timed out waiting for a frame")
}

/// Poll briefly for a frame that is not expected to arrive.
pub async fn ws_try_read_json(stream: &mut WsStream, wait: Duration) -> Option<Value> {
    tokio::time::timeout(wait, async {
        loop {
            match stream.next().await {
                Some(Ok(Message::Text(text))) => {
                    return Some(serde_json::from_str::<Value>(text.as_str()).unwrap());
                },
                Some(Ok(_)) => continue,
                _ => return None,
            }
        }
    })
    .await
    .unwrap_or(None)
}

/// Send an `init` envelope and return the server's reply
/// (`init-ack` on success, `error` otherwise).
pub async fn ws_init(stream: &mut WsStream, room: &str, client: &str) -> Value {
    ws_send_json(
        stream,
        &serde_json::json!({ "type": "init", "roomId": room, "clientId": client }),
    )
    .await;
    ws_read_json(stream).await
}

/// Wait for the server to close the connection. Returns `false` if the
/// socket is still open when `wait` elapses.
pub async fn ws_wait_closed(stream: &mut WsStream, wait: Duration) -> bool {
    tokio::time::timeout(wait, async {
        loop {
            match stream.next().await {
                None | Some(Ok(Message::Close(_))) | Some(Err(_)) => return true,
                Some(Ok(_)) => continue,
            }
        }
    })
    .await
    .unwrap_or(false)
}
