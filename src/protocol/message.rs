//! Messages exchanged between the host server and applications.

use axum::body::Bytes;

use crate::protocol::scope::Headers;

/// A websocket payload, text or binary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Binary(Bytes),
}

/// One protocol event.
///
/// Inbound variants are produced by the host; outbound variants are
/// produced by applications and consumed by the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    // Lifespan
    LifespanStartup,
    LifespanStartupComplete,
    LifespanStartupFailed { message: String },
    LifespanShutdown,
    LifespanShutdownComplete,
    LifespanShutdownFailed { message: String },

    // HTTP
    HttpRequest { body: Bytes, more_body: bool },
    HttpDisconnect,
    HttpResponseStart { status: u16, headers: Headers },
    HttpResponseBody { body: Bytes, more_body: bool },

    // WebSocket
    WebSocketConnect,
    WebSocketReceive(Frame),
    WebSocketDisconnect { code: u16 },
    WebSocketAccept,
    WebSocketSend(Frame),
    WebSocketClose { code: Option<u16> },
}

impl Message {
    /// Wire-style type tag, used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Message::LifespanStartup => "lifespan.startup",
            Message::LifespanStartupComplete => "lifespan.startup.complete",
            Message::LifespanStartupFailed { .. } => "lifespan.startup.failed",
            Message::LifespanShutdown => "lifespan.shutdown",
            Message::LifespanShutdownComplete => "lifespan.shutdown.complete",
            Message::LifespanShutdownFailed { .. } => "lifespan.shutdown.failed",
            Message::HttpRequest { .. } => "http.request",
            Message::HttpDisconnect => "http.disconnect",
            Message::HttpResponseStart { .. } => "http.response.start",
            Message::HttpResponseBody { .. } => "http.response.body",
            Message::WebSocketConnect => "websocket.connect",
            Message::WebSocketReceive(_) => "websocket.receive",
            Message::WebSocketDisconnect { .. } => "websocket.disconnect",
            Message::WebSocketAccept => "websocket.accept",
            Message::WebSocketSend(_) => "websocket.send",
            Message::WebSocketClose { .. } => "websocket.close",
        }
    }

    /// Shorthand for a final (or only) request body chunk.
    pub fn body(body: impl Into<Bytes>, more_body: bool) -> Self {
        Message::HttpRequest {
            body: body.into(),
            more_body,
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        Message::WebSocketReceive(Frame::Text(text.into()))
    }
}
