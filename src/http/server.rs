//! Host server: runs an [`Application`] behind an axum listener.
//!
//! # Responsibilities
//! - Drive the lifespan scope around the listener's lifetime
//! - Turn each HTTP request into a request/response scope
//! - Turn each websocket upgrade into a bidirectional-stream scope
//! - Wire up middleware (tracing, request ID)
//!
//! # Data Flow
//! ```text
//! request body ──pump──▶ http.request* ──▶ app ──▶ http.response.start
//!                                                  http.response.body* ──▶ streamed response
//! ```

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    body::{Body, Bytes},
    extract::{ws::WebSocketUpgrade, ConnectInfo, FromRequestParts, State},
    http::{header, request::Parts, HeaderMap, Request, Response, StatusCode},
    response::IntoResponse,
    routing::any,
    Router,
};
use futures_util::{stream, StreamExt};
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tower::ServiceBuilder;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

use crate::bridge::BridgeError;
use crate::http::websocket;
use crate::protocol::{
    pipe, AppError, Application, Headers, Inbound, Message, Outbound, Scope, ScopeKind, SharedState,
};

/// Capacity of each per-connection message channel.
pub(crate) const CHANNEL_CAPACITY: usize = 32;

/// Errors that stop the host server.
#[derive(Debug, Error)]
pub enum HostError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The application reported a failed startup; the listener never serves.
    #[error("Application startup failed: {0}")]
    StartupFailed(String),
}

/// State injected into handlers.
#[derive(Clone)]
pub(crate) struct HostState {
    pub app: Arc<dyn Application>,
    pub shared: SharedState,
}

impl HostState {
    /// Build the scope for one inbound request.
    pub fn scope(&self, kind: ScopeKind, parts: &Parts) -> Scope {
        let path = parts.uri.path().to_string();
        let scope = match kind {
            ScopeKind::WebSocket => Scope::websocket(path),
            _ => Scope::http(parts.method.clone(), path),
        };
        let scope = scope
            .with_query(parts.uri.query().unwrap_or_default())
            .with_headers(Headers::from(&parts.headers))
            .with_state(self.shared.clone());
        match parts.extensions.get::<ConnectInfo<SocketAddr>>() {
            Some(ConnectInfo(client)) => scope.with_client(*client),
            None => scope,
        }
    }

    /// Run the application for `scope` on its own task, logging failures.
    pub fn spawn(
        &self,
        scope: Scope,
        inbound: Inbound,
        outbound: Outbound,
    ) -> JoinHandle<Result<(), AppError>> {
        let app = self.app.clone();
        tokio::spawn(async move {
            let connection_id = scope.id;
            let kind = scope.kind;
            let result = app.call(scope, inbound, outbound).await;
            if let Err(e) = &result {
                tracing::error!(%connection_id, %kind, error = %e, "Application failed");
            }
            result
        })
    }
}

/// Host server for one application.
pub struct HostServer {
    state: HostState,
}

impl HostServer {
    pub fn new<A: Application>(app: A) -> Self {
        Self {
            state: HostState {
                app: Arc::new(app),
                shared: SharedState::new(),
            },
        }
    }

    /// Process-wide state handed to every scope.
    pub fn state(&self) -> &SharedState {
        &self.state.shared
    }

    /// Build the Axum router with all middleware layers.
    pub fn router(&self) -> Router {
        Router::new()
            .route("/", any(handle))
            .route("/{*path}", any(handle))
            .with_state(self.state.clone())
            .layer(
                ServiceBuilder::new()
                    .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                    .layer(TraceLayer::new_for_http())
                    .layer(PropagateRequestIdLayer::x_request_id()),
            )
    }

    /// Complete lifespan startup, serve until `shutdown` fires, then complete
    /// lifespan shutdown.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), HostError> {
        let mut lifespan = LifespanTask::spawn(&self.state);
        lifespan.startup().await?;

        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "Host server accepting connections");

        let service = self.router().into_make_service_with_connect_info::<SocketAddr>();
        axum::serve(listener, service)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
            })
            .await?;

        tracing::info!("Host server stopped accepting connections");
        lifespan.shutdown().await;
        Ok(())
    }
}

/// The running lifespan scope.
struct LifespanTask {
    tx: mpsc::Sender<Message>,
    rx: mpsc::Receiver<Message>,
    task: JoinHandle<Result<(), AppError>>,
    supported: bool,
}

impl LifespanTask {
    fn spawn(state: &HostState) -> Self {
        let (tx, inbound) = pipe(4);
        let (out_tx, rx) = mpsc::channel(4);
        let scope = Scope::lifespan().with_state(state.shared.clone());
        let task = state.spawn(scope, inbound, Outbound::from_sender(out_tx));
        Self {
            tx,
            rx,
            task,
            supported: true,
        }
    }

    /// Send one signal and wait for the reply. `None` once the application
    /// has stopped listening.
    async fn signal(&mut self, message: Message) -> Option<Message> {
        if !self.supported || self.tx.send(message).await.is_err() {
            return None;
        }
        self.rx.recv().await
    }

    async fn startup(&mut self) -> Result<(), HostError> {
        match self.signal(Message::LifespanStartup).await {
            Some(Message::LifespanStartupComplete) => {
                tracing::info!("Application startup complete");
                Ok(())
            }
            Some(Message::LifespanStartupFailed { message }) => {
                tracing::error!(%message, "Application startup failed");
                Err(HostError::StartupFailed(message))
            }
            Some(other) => {
                tracing::warn!(kind = other.kind(), "Unexpected reply to lifespan startup");
                Ok(())
            }
            None => {
                tracing::warn!("Application does not support lifespan; continuing without it");
                self.supported = false;
                Ok(())
            }
        }
    }

    async fn shutdown(mut self) {
        match self.signal(Message::LifespanShutdown).await {
            Some(Message::LifespanShutdownComplete) => {
                tracing::info!("Application shutdown complete");
            }
            Some(Message::LifespanShutdownFailed { message }) => {
                tracing::error!(%message, "Application shutdown failed");
            }
            Some(other) => {
                tracing::warn!(kind = other.kind(), "Unexpected reply to lifespan shutdown");
            }
            None => {}
        }

        drop(self.tx);
        if let Err(e) = self.task.await {
            tracing::error!(error = %e, "Lifespan task panicked");
        }
    }
}

fn is_websocket_upgrade(headers: &HeaderMap) -> bool {
    headers
        .get(header::UPGRADE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.eq_ignore_ascii_case("websocket"))
}

/// Catch-all handler.
async fn handle(State(host): State<HostState>, request: Request<Body>) -> Response<Body> {
    let (mut parts, body) = request.into_parts();

    if is_websocket_upgrade(&parts.headers) {
        return match WebSocketUpgrade::from_request_parts(&mut parts, &host).await {
            Ok(upgrade) => websocket::serve(host, parts, upgrade).await,
            Err(rejection) => rejection.into_response(),
        };
    }

    serve_http(host, parts, body).await
}

async fn serve_http(host: HostState, parts: Parts, body: Body) -> Response<Body> {
    let scope = host.scope(ScopeKind::Http, &parts);
    let connection_id = scope.id;

    let (in_tx, inbound) = pipe(CHANNEL_CAPACITY);
    let (out_tx, mut out_rx) = mpsc::channel(CHANNEL_CAPACITY);
    tokio::spawn(pump_body(body, in_tx));
    let task = host.spawn(scope, inbound, Outbound::from_sender(out_tx));

    loop {
        match out_rx.recv().await {
            Some(Message::HttpResponseStart { status, headers }) => {
                return start_response(status, &headers, out_rx);
            }
            Some(other) => {
                tracing::debug!(%connection_id, kind = other.kind(), "Ignoring message before response start");
            }
            None => break,
        }
    }

    // The application finished without starting a response.
    let status = match task.await {
        Ok(Err(e)) if e.downcast_ref::<BridgeError>().is_some_and(BridgeError::is_upstream) => {
            StatusCode::BAD_GATEWAY
        }
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    tracing::warn!(%connection_id, status = status.as_u16(), "No response started");
    (status, status.canonical_reason().unwrap_or_default()).into_response()
}

fn start_response(status: u16, headers: &Headers, out_rx: mpsc::Receiver<Message>) -> Response<Body> {
    let mut builder = Response::builder().status(status);
    for (name, value) in headers.iter() {
        builder = builder.header(name, value);
    }

    let chunks = stream::unfold(Some(out_rx), |rx| async move {
        let mut rx = rx?;
        loop {
            match rx.recv().await? {
                Message::HttpResponseBody { body, more_body } => {
                    let next = more_body.then_some(rx);
                    return Some((Ok::<Bytes, Infallible>(body), next));
                }
                other => {
                    tracing::debug!(kind = other.kind(), "Ignoring message during response body");
                }
            }
        }
    });

    match builder.body(Body::from_stream(chunks)) {
        Ok(response) => response,
        Err(e) => {
            tracing::error!(status, error = %e, "Application produced an invalid response head");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Feed the request body to the application as `http.request` messages.
async fn pump_body(body: Body, tx: mpsc::Sender<Message>) {
    let mut frames = body.into_data_stream();
    while let Some(frame) = frames.next().await {
        match frame {
            Ok(chunk) => {
                if tx.send(Message::body(chunk, true)).await.is_err() {
                    return;
                }
            }
            Err(e) => {
                tracing::debug!(error = %e, "Request body aborted");
                let _ = tx.send(Message::HttpDisconnect).await;
                return;
            }
        }
    }
    let _ = tx.send(Message::body(Bytes::new(), false)).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::from_fn;

    #[test]
    fn detects_websocket_upgrade() {
        let mut headers = HeaderMap::new();
        assert!(!is_websocket_upgrade(&headers));
        headers.insert(header::UPGRADE, "WebSocket".parse().unwrap());
        assert!(is_websocket_upgrade(&headers));
    }

    #[test]
    fn scope_carries_the_peer_address() {
        let server = HostServer::new(crate::app::NotFound);
        let client: SocketAddr = "127.0.0.1:52000".parse().unwrap();
        let (mut parts, _) = Request::get("/dashboard?tab=1").body(()).unwrap().into_parts();

        let scope = server.state.scope(ScopeKind::Http, &parts);
        assert_eq!(scope.client, None);
        assert_eq!(scope.query_string, "tab=1");

        parts.extensions.insert(ConnectInfo(client));
        let scope = server.state.scope(ScopeKind::Http, &parts);
        assert_eq!(scope.client, Some(client));
    }

    #[tokio::test]
    async fn body_pump_ends_with_final_chunk() {
        let (tx, mut rx) = mpsc::channel(8);
        pump_body(Body::from("payload"), tx).await;

        assert_eq!(rx.recv().await, Some(Message::body("payload", true)));
        assert_eq!(rx.recv().await, Some(Message::body(Bytes::new(), false)));
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test]
    async fn startup_failure_is_reported() {
        let app = from_fn(|_scope, mut inbound: Inbound, outbound: Outbound| async move {
            if inbound.recv().await == Some(Message::LifespanStartup) {
                outbound
                    .send(Message::LifespanStartupFailed {
                        message: "no database".into(),
                    })
                    .await?;
            }
            Ok::<(), AppError>(())
        });
        let server = HostServer::new(app);
        let mut lifespan = LifespanTask::spawn(&server.state);

        assert!(matches!(
            lifespan.startup().await,
            Err(HostError::StartupFailed(message)) if message == "no database"
        ));
    }

    #[tokio::test]
    async fn apps_without_lifespan_still_start() {
        let app = from_fn(|_scope, _inbound, _outbound| async move {
            Err::<(), AppError>("lifespan not supported".into())
        });
        let server = HostServer::new(app);
        let mut lifespan = LifespanTask::spawn(&server.state);

        assert!(lifespan.startup().await.is_ok());
        lifespan.shutdown().await;
    }
}
