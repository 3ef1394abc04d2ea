//! Pass-through applications served behind the bridge.
//!
//! Neither application speaks the lifespan protocol; the bridge's lifespan
//! manager completes the handshake on their behalf.

use axum::body::Bytes;
use futures_util::future::BoxFuture;
use thiserror::Error;

use crate::bridge::headers;
use crate::bridge::http::{relay, BodyBuffer, Exchange};
use crate::bridge::{BridgeError, UpstreamBase};
use crate::lifecycle::ClientLease;
use crate::protocol::{AppError, Application, Headers, Inbound, Message, Outbound, Scope, ScopeKind};

/// The application does not handle this kind of scope.
#[derive(Debug, Error)]
#[error("{app} does not handle {kind} scopes")]
pub struct Unsupported {
    pub app: &'static str,
    pub kind: ScopeKind,
}

/// Answers every request with 404 and closes every websocket.
#[derive(Debug, Clone, Copy, Default)]
pub struct NotFound;

impl NotFound {
    async fn handle(&self, scope: Scope, mut inbound: Inbound, outbound: Outbound) -> Result<(), AppError> {
        match scope.kind {
            ScopeKind::Http => {
                if BodyBuffer::collect(&mut inbound).await.is_none() {
                    return Ok(());
                }
                let mut headers = Headers::new();
                headers.push("content-type", "text/plain; charset=utf-8");
                outbound
                    .send(Message::HttpResponseStart { status: 404, headers })
                    .await?;
                outbound
                    .send(Message::HttpResponseBody {
                        body: Bytes::from_static(b"Not Found"),
                        more_body: false,
                    })
                    .await?;
                Ok(())
            }
            ScopeKind::WebSocket => refuse_websocket(&mut inbound, &outbound).await,
            kind => Err(Unsupported { app: "NotFound", kind }.into()),
        }
    }
}

impl Application for NotFound {
    fn call(&self, scope: Scope, inbound: Inbound, outbound: Outbound) -> BoxFuture<'_, Result<(), AppError>> {
        Box::pin(self.handle(scope, inbound, outbound))
    }
}

/// Relays plain HTTP to the primary application's address.
///
/// Response headers pass through minus hop-by-hop headers; websockets are
/// refused.
#[derive(Debug, Clone)]
pub struct ForwardApp {
    upstream: UpstreamBase,
}

impl ForwardApp {
    pub fn new(url: &str) -> Result<Self, BridgeError> {
        Ok(Self {
            upstream: UpstreamBase::parse(url)?,
        })
    }

    pub fn upstream(&self) -> &UpstreamBase {
        &self.upstream
    }

    async fn handle(&self, scope: Scope, mut inbound: Inbound, outbound: Outbound) -> Result<(), AppError> {
        match scope.kind {
            ScopeKind::Http => {
                let Some(body) = BodyBuffer::collect(&mut inbound).await else {
                    return Ok(());
                };
                let client = ClientLease::for_scope(&scope);

                let exchange = Exchange {
                    method: scope.method.clone(),
                    url: self.upstream.http_url(&scope),
                    headers: headers::request_headers(&scope.headers),
                    body,
                    response_headers: headers::passthrough_response_headers,
                    scope: &scope,
                };
                tracing::debug!(connection_id = %scope.id, url = %exchange.url, "Forwarding to application");

                relay(&client, exchange, &outbound).await?;
                Ok(())
            }
            ScopeKind::WebSocket => refuse_websocket(&mut inbound, &outbound).await,
            kind => Err(Unsupported { app: "ForwardApp", kind }.into()),
        }
    }
}

impl Application for ForwardApp {
    fn call(&self, scope: Scope, inbound: Inbound, outbound: Outbound) -> BoxFuture<'_, Result<(), AppError>> {
        Box::pin(self.handle(scope, inbound, outbound))
    }
}

pub(crate) async fn refuse_websocket(inbound: &mut Inbound, outbound: &Outbound) -> Result<(), AppError> {
    while let Some(message) = inbound.recv().await {
        if message == Message::WebSocketConnect {
            outbound.send(Message::WebSocketClose { code: None }).await?;
            return Ok(());
        }
    }
    Ok(())
}
