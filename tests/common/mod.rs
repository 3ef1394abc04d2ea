//! Shared utilities for integration testing.

#![allow(dead_code)]

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::{Body, Bytes},
    extract::{
        ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade},
        State,
    },
    http::{header, Request, StatusCode},
    response::{IntoResponse, Response},
    routing::{any, get},
    Router,
};
use futures_util::stream;
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

use nextjs_bridge::app::{ForwardApp, NotFound};
use nextjs_bridge::config::NextJsSettings;
use nextjs_bridge::http::HostError;
use nextjs_bridge::protocol::{Application, SharedState};
use nextjs_bridge::{DevProxyMiddleware, HostServer, Shutdown};

/// Close code the mock sends from `/_next/closing`.
pub const UPSTREAM_CLOSE_CODE: u16 = 4000;

/// Handle to a running mock upstream.
#[derive(Clone)]
pub struct MockUpstream {
    pub addr: SocketAddr,
    /// Requests served, websocket upgrades included.
    pub hits: Arc<AtomicUsize>,
    /// Notified when `/_next/silent` sees its peer go away.
    pub silent_closed: Arc<Notify>,
}

impl MockUpstream {
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}

/// Start a mock frontend/application server on an ephemeral port.
///
/// - `/_next/static/chunk.js`: chunked body, `content-type`, two `set-cookie`, `x-powered-by`
/// - `/_next/echo`: JSON description of the request it received
/// - `/api/hello`: plain response with an `x-app` header
/// - `/_next/webpack-hmr`: websocket echo; `ping` is answered with `pong`
/// - `/_next/silent`: websocket that never sends; reports when the peer leaves
/// - `/_next/closing`: websocket that closes with code 4000 after receiving anything
/// - `/dashboard`: server-rendered page carrying the section markers
/// - `/headers`: JSON object of the request headers it received
/// - `/old-dashboard`: 307 to `/dashboard`; `/loop`: redirects to itself
pub async fn start_mock_upstream() -> MockUpstream {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let mock = MockUpstream {
        addr: listener.local_addr().unwrap(),
        hits: Arc::new(AtomicUsize::new(0)),
        silent_closed: Arc::new(Notify::new()),
    };

    let router = Router::new()
        .route("/_next/static/chunk.js", get(chunk))
        .route("/_next/echo", any(echo))
        .route("/api/hello", any(hello))
        .route("/_next/webpack-hmr", get(hmr))
        .route("/_next/silent", get(silent))
        .route("/_next/closing", get(closing))
        .route("/dashboard", get(dashboard))
        .route("/headers", get(request_headers))
        .route("/old-dashboard", get(old_dashboard))
        .route("/loop", get(redirect_loop))
        .with_state(mock.clone());

    tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });
    mock
}

async fn chunk(State(mock): State<MockUpstream>) -> Response {
    mock.hits.fetch_add(1, Ordering::SeqCst);
    let chunks = stream::iter([
        Ok::<_, Infallible>(Bytes::from_static(b"console.log(")),
        Ok(Bytes::from_static(b"'hmr');")),
    ]);
    Response::builder()
        .header(header::CONTENT_TYPE, "application/javascript")
        .header(header::SET_COOKIE, "a=1; Path=/")
        .header(header::SET_COOKIE, "b=2; Path=/")
        .header("x-powered-by", "Next.js")
        .body(Body::from_stream(chunks))
        .unwrap()
}

async fn echo(State(mock): State<MockUpstream>, request: Request<Body>) -> impl IntoResponse {
    mock.hits.fetch_add(1, Ordering::SeqCst);
    let (parts, body) = request.into_parts();
    let body = axum::body::to_bytes(body, usize::MAX).await.unwrap();
    let uri = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str().to_owned())
        .unwrap_or_default();
    axum::Json(json!({
        "method": parts.method.as_str(),
        "uri": uri,
        "body": String::from_utf8_lossy(&body),
        "x-custom": parts.headers.get("x-custom").and_then(|v| v.to_str().ok()),
    }))
}

async fn hello(State(mock): State<MockUpstream>) -> impl IntoResponse {
    mock.hits.fetch_add(1, Ordering::SeqCst);
    (StatusCode::OK, [("x-app", "primary")], "from application")
}

async fn hmr(State(mock): State<MockUpstream>, ws: WebSocketUpgrade) -> Response {
    mock.hits.fetch_add(1, Ordering::SeqCst);
    ws.on_upgrade(|mut socket: WebSocket| async move {
        while let Some(Ok(message)) = socket.recv().await {
            let reply = match message {
                Message::Text(text) if text.as_str() == "ping" => Message::Text("pong".into()),
                Message::Text(text) => Message::Text(text),
                Message::Binary(data) => Message::Binary(data),
                Message::Close(_) => break,
                _ => continue,
            };
            if socket.send(reply).await.is_err() {
                break;
            }
        }
    })
}

async fn silent(State(mock): State<MockUpstream>, ws: WebSocketUpgrade) -> Response {
    mock.hits.fetch_add(1, Ordering::SeqCst);
    let closed = mock.silent_closed.clone();
    ws.on_upgrade(move |mut socket: WebSocket| async move {
        while let Some(message) = socket.recv().await {
            if matches!(message, Ok(Message::Close(_)) | Err(_)) {
                break;
            }
        }
        closed.notify_one();
    })
}

async fn closing(State(mock): State<MockUpstream>, ws: WebSocketUpgrade) -> Response {
    mock.hits.fetch_add(1, Ordering::SeqCst);
    ws.on_upgrade(|mut socket: WebSocket| async move {
        if socket.recv().await.is_some() {
            let _ = socket
                .send(Message::Close(Some(CloseFrame {
                    code: UPSTREAM_CLOSE_CODE,
                    reason: "bye".into(),
                })))
                .await;
        }
    })
}

/// Page served from `/dashboard`.
pub const DASHBOARD: &str = concat!(
    "<!DOCTYPE html><html><head><title>Dashboard</title>",
    "</head><body id=\"__django_nextjs_body\">",
    "<div id=\"__django_nextjs_body_begin\"></div>",
    "<main>dashboard</main>",
    "<div id=\"__django_nextjs_body_end\"></div>",
    "</body></html>",
);

async fn dashboard(State(mock): State<MockUpstream>) -> Response {
    mock.hits.fetch_add(1, Ordering::SeqCst);
    Response::builder()
        .header(header::CONTENT_TYPE, "text/html; charset=utf-8")
        .header(header::VARY, "RSC, Next-Router-State-Tree")
        .header(header::SET_COOKIE, "a=1; Path=/")
        .header("x-powered-by", "Next.js")
        .body(Body::from(DASHBOARD))
        .unwrap()
}

async fn request_headers(State(mock): State<MockUpstream>, headers: header::HeaderMap) -> impl IntoResponse {
    mock.hits.fetch_add(1, Ordering::SeqCst);
    let received: serde_json::Map<String, serde_json::Value> = headers
        .iter()
        .map(|(name, value)| {
            (
                name.as_str().to_owned(),
                json!(String::from_utf8_lossy(value.as_bytes())),
            )
        })
        .collect();
    axum::Json(received)
}

async fn old_dashboard(State(mock): State<MockUpstream>) -> impl IntoResponse {
    mock.hits.fetch_add(1, Ordering::SeqCst);
    (StatusCode::TEMPORARY_REDIRECT, [(header::LOCATION, "/dashboard")])
}

async fn redirect_loop(State(mock): State<MockUpstream>) -> impl IntoResponse {
    mock.hits.fetch_add(1, Ordering::SeqCst);
    (StatusCode::FOUND, [(header::LOCATION, "/loop")])
}

/// A host server running in the background.
pub struct RunningHost {
    pub addr: SocketAddr,
    pub state: SharedState,
    pub shutdown: Shutdown,
    pub task: JoinHandle<Result<(), HostError>>,
}

impl RunningHost {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn ws_url(&self, path: &str) -> String {
        format!("ws://{}{}", self.addr, path)
    }

    /// Trigger shutdown and wait for the host to finish.
    pub async fn stop(self) -> Result<(), HostError> {
        self.shutdown.trigger();
        tokio::time::timeout(Duration::from_secs(10), self.task)
            .await
            .expect("host did not stop")
            .expect("host task panicked")
    }
}

/// Serve `app` on an ephemeral port.
pub async fn start_host<A: Application>(app: A) -> RunningHost {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = HostServer::new(app);
    let state = server.state().clone();
    let shutdown = Shutdown::new();
    let receiver = shutdown.subscribe();
    let task = tokio::spawn(server.run(listener, receiver));
    RunningHost {
        addr,
        state,
        shutdown,
        task,
    }
}

/// Development-mode settings pointing at `server_url`.
pub fn dev_settings(server_url: &str) -> NextJsSettings {
    NextJsSettings {
        server_url: server_url.to_string(),
        dev_mode: true,
        ..NextJsSettings::default()
    }
}

/// Serve the bridge in front of `app_url` (or a 404 application).
pub async fn start_bridge(settings: NextJsSettings, app_url: Option<&str>) -> RunningHost {
    let inner: Arc<dyn Application> = match app_url {
        Some(url) => Arc::new(ForwardApp::new(url).unwrap()),
        None => Arc::new(NotFound),
    };
    let app = DevProxyMiddleware::new(inner, &settings).unwrap();
    start_host(app).await
}

/// An HTTP client that never pools connections, consults proxy settings or
/// follows redirects.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .unwrap()
}

/// An address nothing listens on.
pub async fn closed_port_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{addr}")
}
