//! WebSocket bridge: relays one full-duplex stream to the frontend server.
//!
//! # Data Flow
//! ```text
//! Browser ──websocket.receive──▶ session ──frame──▶ upstream sink
//! Browser ◀──websocket.send──── listener task ◀──── upstream stream
//! ```
//!
//! # Design Decisions
//! - One upstream socket per inbound connection, owned by its session
//! - Upstream→browser runs in a spawned listener task; it is aborted (not
//!   abandoned) before the upstream socket is closed
//! - Teardown is idempotent and runs on every exit path
//! - Upstream connect failures become a close message, never an error

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use uuid::Uuid;

use crate::bridge::error::BridgeError;
use crate::bridge::upstream::UpstreamBase;
use crate::config::NextJsSettings;
use crate::observability::metrics;
use crate::protocol::{Frame, Inbound, Message, Outbound, Scope};

type UpstreamSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;
type UpstreamSink = SplitSink<UpstreamSocket, WsMessage>;
type UpstreamStream = SplitStream<UpstreamSocket>;

/// Per-connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketState {
    New,
    Connecting,
    Open,
    Closing,
    Closed,
}

/// Whether the session keeps reading inbound messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Stop,
}

/// Relays bridged websocket connections. Refuses to exist outside
/// development mode.
#[derive(Debug, Clone)]
pub struct WebSocketBridge {
    upstream: UpstreamBase,
}

impl WebSocketBridge {
    pub fn new(settings: &NextJsSettings) -> Result<Self, BridgeError> {
        if !settings.dev_mode {
            return Err(BridgeError::ImproperlyConfigured(
                "the frontend bridge is for development only",
            ));
        }
        Ok(Self {
            upstream: UpstreamBase::parse(&settings.server_url)?,
        })
    }

    /// Start a session for one inbound connection.
    pub fn session(&self, scope: &Scope, outbound: Outbound) -> WebSocketSession {
        WebSocketSession::new(scope.id, self.upstream.websocket_url(scope), outbound)
    }

    /// Relay one connection until either side closes.
    pub async fn serve(
        &self,
        scope: &Scope,
        mut inbound: Inbound,
        outbound: Outbound,
    ) -> Result<(), BridgeError> {
        let mut session = self.session(scope, outbound);
        let result = session.run(&mut inbound).await;
        session.teardown().await;
        result
    }
}

/// One bridged websocket connection.
pub struct WebSocketSession {
    connection_id: Uuid,
    url: String,
    outbound: Outbound,
    state: SocketState,
    upstream: Option<UpstreamSink>,
    listener: Option<JoinHandle<()>>,
}

impl WebSocketSession {
    pub fn new(connection_id: Uuid, url: String, outbound: Outbound) -> Self {
        Self {
            connection_id,
            url,
            outbound,
            state: SocketState::New,
            upstream: None,
            listener: None,
        }
    }

    pub fn state(&self) -> SocketState {
        self.state
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// True while the listener task exists and has not finished.
    pub fn is_listening(&self) -> bool {
        self.listener.as_ref().is_some_and(|task| !task.is_finished())
    }

    pub fn has_upstream(&self) -> bool {
        self.upstream.is_some()
    }

    /// Process inbound messages until the connection ends or the session stops.
    pub async fn run(&mut self, inbound: &mut Inbound) -> Result<(), BridgeError> {
        while let Some(message) = inbound.recv().await {
            if self.handle(message).await? == Flow::Stop {
                return Ok(());
            }
        }
        tracing::debug!(connection_id = %self.connection_id, "Inbound connection ended");
        Ok(())
    }

    /// Process one inbound message.
    pub async fn handle(&mut self, message: Message) -> Result<Flow, BridgeError> {
        match message {
            Message::WebSocketConnect => self.connect().await,
            Message::WebSocketReceive(frame) => {
                self.forward(frame).await?;
                Ok(Flow::Continue)
            }
            Message::WebSocketDisconnect { code } => {
                tracing::debug!(connection_id = %self.connection_id, code, "Browser disconnected");
                self.teardown().await;
                Ok(Flow::Stop)
            }
            other => {
                tracing::debug!(
                    connection_id = %self.connection_id,
                    kind = other.kind(),
                    "Ignoring unexpected websocket message"
                );
                Ok(Flow::Continue)
            }
        }
    }

    async fn connect(&mut self) -> Result<Flow, BridgeError> {
        if self.state != SocketState::New {
            tracing::warn!(connection_id = %self.connection_id, state = ?self.state, "Ignoring repeated connect");
            return Ok(Flow::Continue);
        }
        self.state = SocketState::Connecting;

        let socket = match connect_async(self.url.as_str()).await {
            Ok((socket, _response)) => socket,
            Err(e) => {
                tracing::warn!(
                    connection_id = %self.connection_id,
                    url = %self.url,
                    error = %e,
                    "Upstream websocket connection failed"
                );
                metrics::record_ws_connect_failure();
                self.state = SocketState::Closed;
                self.outbound.send(Message::WebSocketClose { code: None }).await?;
                return Ok(Flow::Stop);
            }
        };

        let (sink, stream) = socket.split();
        self.upstream = Some(sink);
        self.listener = Some(tokio::spawn(listen(
            stream,
            self.outbound.clone(),
            self.connection_id,
        )));
        self.state = SocketState::Open;
        metrics::ws_opened();

        tracing::debug!(connection_id = %self.connection_id, url = %self.url, "Upstream websocket open");
        self.outbound.send(Message::WebSocketAccept).await?;
        Ok(Flow::Continue)
    }

    async fn forward(&mut self, frame: Frame) -> Result<(), BridgeError> {
        let Some(sink) = self.upstream.as_mut() else {
            self.outbound.send(Message::WebSocketClose { code: None }).await?;
            return Ok(());
        };

        if let Err(e) = sink.send(to_upstream(frame)).await {
            tracing::debug!(
                connection_id = %self.connection_id,
                error = %e,
                "Upstream websocket closed while forwarding"
            );
            let sent = self.outbound.send(Message::WebSocketClose { code: None }).await;
            self.teardown().await;
            sent?;
        }
        Ok(())
    }

    /// Cancel the listener task, then close the upstream socket.
    ///
    /// Either step is skipped if already done; calling this repeatedly is safe.
    pub async fn teardown(&mut self) {
        if let Some(listener) = self.listener.take() {
            listener.abort();
            // Resolves as soon as the abort lands, interrupting any pending read.
            let _ = listener.await;
        }

        if let Some(mut sink) = self.upstream.take() {
            self.state = SocketState::Closing;
            if let Err(e) = sink.close().await {
                tracing::debug!(connection_id = %self.connection_id, error = %e, "Upstream websocket close failed");
            }
            metrics::ws_closed();
        }

        self.state = SocketState::Closed;
    }
}

impl Drop for WebSocketSession {
    fn drop(&mut self) {
        if let Some(listener) = self.listener.take() {
            listener.abort();
        }
        if self.upstream.take().is_some() {
            metrics::ws_closed();
        }
    }
}

impl std::fmt::Debug for WebSocketSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebSocketSession")
            .field("connection_id", &self.connection_id)
            .field("url", &self.url)
            .field("state", &self.state)
            .field("listening", &self.is_listening())
            .finish()
    }
}

fn to_upstream(frame: Frame) -> WsMessage {
    match frame {
        Frame::Text(text) => WsMessage::Text(text.into()),
        Frame::Binary(data) => WsMessage::Binary(data),
    }
}

/// Listener task: drain the upstream socket into the inbound connection.
async fn listen(mut stream: UpstreamStream, outbound: Outbound, connection_id: Uuid) {
    while let Some(item) = stream.next().await {
        let frame = match item {
            Ok(WsMessage::Text(text)) => Frame::Text(text.as_str().to_owned()),
            Ok(WsMessage::Binary(data)) => Frame::Binary(data),
            Ok(WsMessage::Close(close)) => {
                let code = close.map(|c| u16::from(c.code));
                tracing::debug!(%connection_id, ?code, "Upstream websocket closed");
                let _ = outbound.send(Message::WebSocketClose { code }).await;
                return;
            }
            Ok(_) => continue,
            Err(e) => {
                tracing::debug!(%connection_id, error = %e, "Upstream websocket closed with error");
                let _ = outbound.send(Message::WebSocketClose { code: None }).await;
                return;
            }
        };

        if outbound.send(Message::WebSocketSend(frame)).await.is_err() {
            return;
        }
    }

    tracing::debug!(%connection_id, "Upstream websocket stream ended");
    let _ = outbound.send(Message::WebSocketClose { code: None }).await;
}
