//! Shared utilities for integration tests: a scriptable backend, a gateway
//! launcher and a WebSocket client.

#![allow(dead_code)]

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::Router;
use futures_util::StreamExt;
use serde_json::Value;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use swindon_chat::config::GatewayConfig;
use swindon_chat::http::HttpServer;
use swindon_chat::lifecycle::Shutdown;

pub const STEP_TIMEOUT: Duration = Duration::from_secs(5);

pub type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// One request received by the mock backend, waiting for its answer.
pub struct BackendRequest {
    pub path: String,
    pub headers: HeaderMap,
    pub body: String,
    responder: oneshot::Sender<(StatusCode, String)>,
}

impl BackendRequest {
    pub fn json(&self) -> Value {
        serde_json::from_str(&self.body).expect("backend request body is JSON")
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn respond(self, status: u16, body: impl Into<String>) {
        let status = StatusCode::from_u16(status).expect("valid status");
        let _ = self.responder.send((status, body.into()));
    }

    pub fn respond_json(self, status: u16, body: Value) {
        self.respond(status, body.to_string());
    }
}

/// Backend that hands every request to the test and waits for its answer.
pub struct MockBackend {
    pub addr: SocketAddr,
    requests: mpsc::UnboundedReceiver<BackendRequest>,
}

impl MockBackend {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, requests) = mpsc::unbounded_channel();

        let app = Router::new().fallback(capture).with_state(tx);
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Self { addr, requests }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Next request the gateway sent, failing the test after a timeout.
    pub async fn next(&mut self) -> BackendRequest {
        tokio::time::timeout(STEP_TIMEOUT, self.requests.recv())
            .await
            .expect("timed out waiting for a backend request")
            .expect("mock backend stopped")
    }

    /// Answer the handshake with the given identity.
    ///
    /// Returns the headers and body of the handshake request.
    pub async fn authorize(&mut self, identity: Value) -> (HeaderMap, Value) {
        let request = self.next().await;
        assert_eq!(request.path, "/tangle/authorize_connection");
        let seen = (request.headers.clone(), request.json());
        request.respond_json(200, identity);
        seen
    }
}

async fn capture(
    State(tx): State<mpsc::UnboundedSender<BackendRequest>>,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let (responder, answer) = oneshot::channel();
    let request = BackendRequest {
        path: uri.path().to_string(),
        headers,
        body: String::from_utf8_lossy(&body).into_owned(),
        responder,
    };
    if tx.send(request).is_err() {
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    }
    match answer.await {
        Ok((status, body)) => (status, body).into_response(),
        Err(_) => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    }
}

/// Gateway configuration pointed at `backend_url`.
pub fn test_config(backend_url: &str) -> GatewayConfig {
    let mut config = GatewayConfig::default();
    config.listener.bind_address = "127.0.0.1:0".to_string();
    config.backend.base_url = backend_url.to_string();
    config.backend.request_timeout_secs = 5;
    config
}

/// A running gateway.
pub struct Gateway {
    pub addr: SocketAddr,
    pub shutdown: Shutdown,
}

impl Gateway {
    pub async fn start(config: GatewayConfig) -> Self {
        let listener = TcpListener::bind(&config.listener.bind_address).await.unwrap();
        let addr = listener.local_addr().unwrap();
        let shutdown = Shutdown::new();
        let server = HttpServer::new(config, shutdown.clone());
        let (_tx, updates) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            let _ = server.run(listener, updates).await;
        });
        Self { addr, shutdown }
    }

    pub fn chat_url(&self, query: &str) -> String {
        if query.is_empty() {
            format!("ws://{}/swindon-chat", self.addr)
        } else {
            format!("ws://{}/swindon-chat?{}", self.addr, query)
        }
    }

    pub async fn connect(&self) -> Client {
        self.connect_with(&[], "").await
    }

    /// Open a chat connection with extra upgrade headers and a query string.
    pub async fn connect_with(&self, headers: &[(&'static str, &str)], query: &str) -> Client {
        let mut request = self.chat_url(query).into_client_request().unwrap();
        for (name, value) in headers {
            request
                .headers_mut()
                .insert(*name, HeaderValue::from_str(value).unwrap());
        }
        let (client, _) = tokio::time::timeout(STEP_TIMEOUT, tokio_tungstenite::connect_async(request))
            .await
            .expect("timed out connecting")
            .expect("upgrade failed");
        client
    }
}

/// Next text frame, parsed as JSON.
pub async fn recv_json(client: &mut Client) -> Value {
    loop {
        let frame = tokio::time::timeout(STEP_TIMEOUT, client.next())
            .await
            .expect("timed out waiting for a frame")
            .expect("connection ended")
            .expect("websocket error");
        match frame {
            Message::Text(text) => return serde_json::from_str(text.as_str()).unwrap(),
            Message::Ping(_) | Message::Pong(_) => continue,
            other => panic!("expected a text frame, got {other:?}"),
        }
    }
}

/// Wait for the close frame and return its code and reason.
pub async fn recv_close(client: &mut Client) -> (u16, String) {
    loop {
        let frame = tokio::time::timeout(STEP_TIMEOUT, client.next())
            .await
            .expect("timed out waiting for close")
            .expect("connection ended without a close frame")
            .expect("websocket error");
        match frame {
            Message::Close(Some(close)) => {
                return (u16::from(close.code), close.reason.as_str().to_string())
            }
            Message::Close(None) => panic!("close frame without a code"),
            Message::Ping(_) | Message::Pong(_) => continue,
            other => panic!("expected a close frame, got {other:?}"),
        }
    }
}

/// Find the backend request whose `meta.request_id` equals `id`.
pub fn take_by_request_id(requests: &mut Vec<BackendRequest>, id: &Value) -> BackendRequest {
    let index = requests
        .iter()
        .position(|r| &r.json()[0]["request_id"] == id)
        .expect("no request with that id");
    requests.remove(index)
}

/// After the close handshake, assert no further text frame ever arrives.
pub async fn assert_no_more_frames(client: &mut Client) {
    loop {
        match tokio::time::timeout(Duration::from_millis(500), client.next()).await {
            Err(_) | Ok(None) | Ok(Some(Err(_))) => return,
            Ok(Some(Ok(Message::Text(text)))) => panic!("unexpected frame after close: {text}"),
            Ok(Some(Ok(_))) => continue,
        }
    }
}
