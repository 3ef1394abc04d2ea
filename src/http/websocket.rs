//! WebSocket host adapter.
//!
//! # Data Flow
//! ```text
//! Browser ←──── WebSocket frames ────→ Host ←──── websocket.* messages ────→ Application
//! ```
//!
//! # Design Decisions
//! - The upgrade completes only after the application accepts; a close
//!   before accept is answered with 403
//! - Frames sent by the application before accept are queued, not dropped
//! - Close frames propagated in both directions
//! - Each direction pumps independently; a slow application does not stall
//!   frames headed to the browser
//! - Ping/pong handled by axum

use axum::{
    body::Body,
    extract::ws::{CloseFrame, Message as WsMessage, Utf8Bytes, WebSocket, WebSocketUpgrade},
    http::{request::Parts, Response, StatusCode},
    response::IntoResponse,
};
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::http::server::{HostState, CHANNEL_CAPACITY};
use crate::protocol::{pipe, Frame, Message, Outbound, ScopeKind};

/// Close code reported when the browser goes away without a close frame.
const ABNORMAL_CLOSURE: u16 = 1006;
/// Close code reported for a close frame without a status.
const NO_STATUS: u16 = 1005;
const NORMAL_CLOSURE: u16 = 1000;

/// Run the handshake with the application and, if it accepts, upgrade.
pub(crate) async fn serve(host: HostState, parts: Parts, upgrade: WebSocketUpgrade) -> Response<Body> {
    let scope = host.scope(ScopeKind::WebSocket, &parts);
    let connection_id = scope.id;

    let (in_tx, inbound) = pipe(CHANNEL_CAPACITY);
    let (out_tx, mut out_rx) = mpsc::channel(CHANNEL_CAPACITY);
    host.spawn(scope, inbound, Outbound::from_sender(out_tx));

    if in_tx.send(Message::WebSocketConnect).await.is_err() {
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }

    let mut queued = Vec::new();
    loop {
        match out_rx.recv().await {
            Some(Message::WebSocketAccept) => break,
            Some(Message::WebSocketSend(frame)) => queued.push(frame),
            Some(Message::WebSocketClose { code }) => {
                tracing::debug!(%connection_id, ?code, "Application refused websocket");
                return StatusCode::FORBIDDEN.into_response();
            }
            Some(other) => {
                tracing::debug!(%connection_id, kind = other.kind(), "Ignoring message before accept");
            }
            None => {
                tracing::debug!(%connection_id, "Application ended before accepting websocket");
                return StatusCode::FORBIDDEN.into_response();
            }
        }
    }

    upgrade.on_upgrade(move |socket| pump(socket, in_tx, out_rx, queued, connection_id))
}

fn to_socket(frame: Frame) -> WsMessage {
    match frame {
        Frame::Text(text) => WsMessage::Text(text.into()),
        Frame::Binary(data) => WsMessage::Binary(data),
    }
}

/// Pump frames both ways until either side closes.
///
/// Each direction runs on its own task so a full channel on one side never
/// holds up the other.
async fn pump(
    socket: WebSocket,
    in_tx: mpsc::Sender<Message>,
    out_rx: mpsc::Receiver<Message>,
    queued: Vec<Frame>,
    connection_id: Uuid,
) {
    let (mut sink, stream) = socket.split();

    for frame in queued {
        if sink.send(to_socket(frame)).await.is_err() {
            let _ = in_tx.send(Message::WebSocketDisconnect { code: ABNORMAL_CLOSURE }).await;
            return;
        }
    }

    let mut outgoing = tokio::spawn(to_browser(sink, out_rx, in_tx.clone(), connection_id));
    tokio::select! {
        _ = from_browser(stream, in_tx, connection_id) => outgoing.abort(),
        _ = &mut outgoing => {}
    }

    tracing::debug!(%connection_id, "Websocket connection finished");
}

/// Browser → application.
async fn from_browser<S>(mut stream: S, in_tx: mpsc::Sender<Message>, connection_id: Uuid)
where
    S: Stream<Item = Result<WsMessage, axum::Error>> + Unpin,
{
    loop {
        let message = match stream.next().await {
            Some(Ok(WsMessage::Text(text))) => Message::WebSocketReceive(Frame::Text(text.as_str().to_owned())),
            Some(Ok(WsMessage::Binary(data))) => Message::WebSocketReceive(Frame::Binary(data)),
            Some(Ok(WsMessage::Close(frame))) => {
                let code = frame.map(|f| f.code).unwrap_or(NO_STATUS);
                tracing::debug!(%connection_id, code, "Browser closed websocket");
                let _ = in_tx.send(Message::WebSocketDisconnect { code }).await;
                return;
            }
            Some(Ok(_)) => continue,
            Some(Err(e)) => {
                tracing::debug!(%connection_id, error = %e, "Browser websocket failed");
                let _ = in_tx.send(Message::WebSocketDisconnect { code: ABNORMAL_CLOSURE }).await;
                return;
            }
            None => {
                let _ = in_tx.send(Message::WebSocketDisconnect { code: ABNORMAL_CLOSURE }).await;
                return;
            }
        };
        if in_tx.send(message).await.is_err() {
            return;
        }
    }
}

/// Application → browser.
async fn to_browser<S>(
    mut sink: S,
    mut out_rx: mpsc::Receiver<Message>,
    in_tx: mpsc::Sender<Message>,
    connection_id: Uuid,
) where
    S: Sink<WsMessage> + Unpin,
{
    while let Some(message) = out_rx.recv().await {
        match message {
            Message::WebSocketSend(frame) => {
                if sink.send(to_socket(frame)).await.is_err() {
                    let _ = in_tx.send(Message::WebSocketDisconnect { code: ABNORMAL_CLOSURE }).await;
                    return;
                }
            }
            Message::WebSocketClose { code } => {
                let frame = CloseFrame {
                    code: code.unwrap_or(NORMAL_CLOSURE),
                    reason: Utf8Bytes::from_static(""),
                };
                let _ = sink.send(WsMessage::Close(Some(frame))).await;
                return;
            }
            other => {
                tracing::debug!(%connection_id, kind = other.kind(), "Ignoring message on open websocket");
            }
        }
    }
    let _ = sink.send(WsMessage::Close(None)).await;
}
