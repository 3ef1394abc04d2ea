//! HTTP bridge: relays one request/response exchange to the frontend server.
//!
//! # Data Flow
//! ```text
//! http.request chunks ──▶ BodyBuffer ──▶ one upstream request
//!                                              │
//! http.response.start ◀── filtered headers ◀───┤
//! http.response.body  ◀── chunk per frame  ◀───┘
//! http.response.body  ◀── empty, more_body = false
//! ```

use axum::body::{Body, Bytes};
use axum::http::{HeaderMap, Method, Request};
use futures_util::StreamExt;

use crate::bridge::error::BridgeError;
use crate::bridge::headers;
use crate::bridge::upstream::UpstreamBase;
use crate::config::NextJsSettings;
use crate::lifecycle::pool::{ClientLease, UpstreamClient};
use crate::observability::metrics;
use crate::protocol::{Headers, Inbound, Message, Outbound, Scope};

/// Result of feeding one message to a [`BodyBuffer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyProgress {
    /// More chunks follow.
    Pending,
    /// The body is complete.
    Complete,
    /// The caller went away before the body was complete.
    Disconnected,
}

/// Accumulates request body chunks until the final one arrives.
#[derive(Debug, Default)]
pub struct BodyBuffer {
    chunks: Vec<Bytes>,
    len: usize,
}

impl BodyBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one inbound message.
    pub fn push(&mut self, message: Message) -> BodyProgress {
        match message {
            Message::HttpRequest { body, more_body } => {
                self.len += body.len();
                if !body.is_empty() {
                    self.chunks.push(body);
                }
                if more_body {
                    BodyProgress::Pending
                } else {
                    BodyProgress::Complete
                }
            }
            Message::HttpDisconnect => BodyProgress::Disconnected,
            other => {
                tracing::debug!(kind = other.kind(), "Ignoring message while reading request body");
                BodyProgress::Pending
            }
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Concatenate the buffered chunks.
    pub fn into_body(self) -> Bytes {
        match self.chunks.len() {
            0 => Bytes::new(),
            1 => self.chunks.into_iter().next().unwrap_or_default(),
            _ => {
                let mut body = Vec::with_capacity(self.len);
                for chunk in &self.chunks {
                    body.extend_from_slice(chunk);
                }
                Bytes::from(body)
            }
        }
    }

    /// Read the whole body from `inbound`. `None` if the caller disconnected
    /// (or the connection ended) first.
    pub async fn collect(inbound: &mut Inbound) -> Option<Bytes> {
        let mut buffer = Self::new();
        loop {
            match buffer.push(inbound.recv().await?) {
                BodyProgress::Pending => continue,
                BodyProgress::Complete => return Some(buffer.into_body()),
                BodyProgress::Disconnected => return None,
            }
        }
    }
}

/// One outbound exchange, ready to send.
pub(crate) struct Exchange<'a> {
    pub method: Method,
    pub url: String,
    pub headers: Headers,
    pub body: Bytes,
    pub response_headers: fn(&HeaderMap) -> Headers,
    pub scope: &'a Scope,
}

/// Send one request upstream and stream the response to `outbound`.
///
/// Returns the upstream status code.
pub(crate) async fn relay(
    client: &UpstreamClient,
    exchange: Exchange<'_>,
    outbound: &Outbound,
) -> Result<u16, BridgeError> {
    let mut request = Request::builder().method(exchange.method).uri(&exchange.url);
    for (name, value) in exchange.headers.iter() {
        request = request.header(name, value);
    }
    let request = request.body(Body::from(exchange.body))?;

    let response = client.request(request).await?;
    let (parts, body) = response.into_parts();
    let status = parts.status.as_u16();

    tracing::debug!(
        connection_id = %exchange.scope.id,
        url = %exchange.url,
        status,
        "Upstream responded"
    );

    outbound
        .send(Message::HttpResponseStart {
            status,
            headers: (exchange.response_headers)(&parts.headers),
        })
        .await?;

    let mut frames = Body::new(body).into_data_stream();
    while let Some(frame) = frames.next().await {
        match frame {
            Ok(chunk) if chunk.is_empty() => continue,
            Ok(chunk) => {
                outbound
                    .send(Message::HttpResponseBody {
                        body: chunk,
                        more_body: true,
                    })
                    .await?;
            }
            Err(e) => {
                // Upstream went away mid-body; end the response as a normal close.
                tracing::warn!(
                    connection_id = %exchange.scope.id,
                    url = %exchange.url,
                    error = %e,
                    "Upstream closed while streaming response"
                );
                break;
            }
        }
    }

    outbound
        .send(Message::HttpResponseBody {
            body: Bytes::new(),
            more_body: false,
        })
        .await?;

    Ok(status)
}

/// Relays bridged request/response exchanges. Refuses to exist outside
/// development mode.
#[derive(Debug, Clone)]
pub struct HttpBridge {
    upstream: UpstreamBase,
}

impl HttpBridge {
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

    pub fn upstream(&self) -> &UpstreamBase {
        &self.upstream
    }

    /// Relay one exchange.
    ///
    /// The pooled client from shared state is used when present; otherwise a
    /// private client is created and closed before this returns, on every path.
    pub async fn serve(
        &self,
        scope: &Scope,
        inbound: &mut Inbound,
        outbound: &Outbound,
    ) -> Result<(), BridgeError> {
        let Some(body) = BodyBuffer::collect(inbound).await else {
            tracing::debug!(
                connection_id = %scope.id,
                path = %scope.path,
                "Caller disconnected before request body completed"
            );
            return Ok(());
        };

        let client = ClientLease::for_scope(scope);

        let exchange = Exchange {
            method: scope.method.clone(),
            url: self.upstream.http_url(scope),
            headers: headers::request_headers(&scope.headers),
            body,
            response_headers: headers::bridged_response_headers,
            scope,
        };

        tracing::debug!(
            connection_id = %scope.id,
            method = %exchange.method,
            url = %exchange.url,
            pooled = client.is_pooled(),
            "Bridging request"
        );

        match relay(&client, exchange, outbound).await {
            Ok(status) => {
                metrics::record_http_bridge(status);
                Ok(())
            }
            Err(e) => {
                if e.is_upstream() {
                    metrics::record_upstream_error();
                }
                tracing::error!(connection_id = %scope.id, path = %scope.path, error = %e, "Bridged request failed");
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::pipe;
    use std::convert::Infallible;
    use std::time::Duration;
    use tokio::net::TcpListener;
    use tokio::sync::mpsc;

    const CHUNKS: [&str; 3] = ["first;", "second;", "third;"];

    /// Serve a response whose body arrives as `CHUNKS`, one write each.
    async fn chunked_upstream() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let router = axum::Router::new().route(
            "/_next/static/app.js",
            axum::routing::get(|| async {
                let chunks = futures_util::stream::unfold(0, |i| async move {
                    let chunk = CHUNKS.get(i).copied()?;
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    Some((Ok::<_, Infallible>(Bytes::from_static(chunk.as_bytes())), i + 1))
                });
                Body::from_stream(chunks)
            }),
        );
        tokio::spawn(async move {
            let _ = axum::serve(listener, router).await;
        });
        format!("http://{addr}")
    }

    fn exchange(url: String, scope: &Scope) -> Exchange<'_> {
        Exchange {
            method: Method::GET,
            url,
            headers: Headers::new(),
            body: Bytes::new(),
            response_headers: headers::bridged_response_headers,
            scope,
        }
    }

    #[test]
    fn buffer_concatenates_chunks() {
        let mut buffer = BodyBuffer::new();
        assert_eq!(buffer.push(Message::body("hello ", true)), BodyProgress::Pending);
        assert_eq!(buffer.push(Message::body("", true)), BodyProgress::Pending);
        assert_eq!(buffer.push(Message::body("world", false)), BodyProgress::Complete);
        assert_eq!(buffer.len(), 11);
        assert_eq!(buffer.into_body(), Bytes::from_static(b"hello world"));
    }

    #[test]
    fn buffer_reports_disconnect() {
        let mut buffer = BodyBuffer::new();
        assert_eq!(buffer.push(Message::body("partial", true)), BodyProgress::Pending);
        assert_eq!(buffer.push(Message::HttpDisconnect), BodyProgress::Disconnected);
    }

    #[test]
    fn empty_body() {
        let mut buffer = BodyBuffer::new();
        assert_eq!(buffer.push(Message::body(Bytes::new(), false)), BodyProgress::Complete);
        assert!(buffer.is_empty());
        assert!(buffer.into_body().is_empty());
    }

    #[tokio::test]
    async fn collect_stops_at_end_of_connection() {
        let (tx, mut inbound) = pipe(4);
        tx.send(Message::body("a", true)).await.unwrap();
        drop(tx);
        assert_eq!(BodyBuffer::collect(&mut inbound).await, None);
    }

    #[test]
    fn refuses_outside_development_mode() {
        let settings = NextJsSettings::default();
        assert!(!settings.dev_mode);
        assert!(matches!(
            HttpBridge::new(&settings),
            Err(BridgeError::ImproperlyConfigured(_))
        ));
    }

    #[test]
    fn builds_in_development_mode() {
        let settings = NextJsSettings {
            dev_mode: true,
            ..NextJsSettings::default()
        };
        let bridge = HttpBridge::new(&settings).unwrap();
        assert_eq!(bridge.upstream().as_str(), "http://127.0.0.1:3000/");
    }

    #[tokio::test]
    async fn disconnect_before_body_skips_upstream() {
        // Upstream address is unroutable; reaching it would fail the test.
        let settings = NextJsSettings {
            dev_mode: true,
            server_url: "http://127.0.0.1:1".into(),
            ..NextJsSettings::default()
        };
        let bridge = HttpBridge::new(&settings).unwrap();

        let (tx, mut inbound) = pipe(4);
        let (out_tx, mut out_rx) = tokio::sync::mpsc::channel(4);
        tx.send(Message::body("part", true)).await.unwrap();
        tx.send(Message::HttpDisconnect).await.unwrap();

        let scope = Scope::http(Method::POST, "/_next/data");
        bridge
            .serve(&scope, &mut inbound, &Outbound::from_sender(out_tx))
            .await
            .unwrap();
        assert!(out_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn relay_forwards_each_chunk_then_one_terminal_chunk() {
        let base = chunked_upstream().await;
        let scope = Scope::http(Method::GET, "/_next/static/app.js");
        let client = UpstreamClient::new();
        let (out_tx, mut out_rx) = mpsc::channel(16);

        let status = relay(
            &client,
            exchange(format!("{base}/_next/static/app.js"), &scope),
            &Outbound::from_sender(out_tx),
        )
        .await
        .unwrap();
        assert_eq!(status, 200);

        let mut messages = Vec::new();
        while let Some(message) = out_rx.recv().await {
            messages.push(message);
        }

        assert!(matches!(
            messages.first(),
            Some(Message::HttpResponseStart { status: 200, .. })
        ));
        let bodies: Vec<(Bytes, bool)> = messages[1..]
            .iter()
            .map(|message| match message {
                Message::HttpResponseBody { body, more_body } => (body.clone(), *more_body),
                other => panic!("unexpected {}", other.kind()),
            })
            .collect();

        let (last, chunks) = bodies.split_last().unwrap();
        assert_eq!(last, &(Bytes::new(), false));
        assert_eq!(chunks.len(), CHUNKS.len());
        for ((body, more_body), expected) in chunks.iter().zip(CHUNKS) {
            assert!(*more_body);
            assert_eq!(body.as_ref(), expected.as_bytes());
        }
    }

    #[tokio::test]
    async fn failed_relay_still_closes_a_private_client() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let scope = Scope::http(Method::GET, "/_next/static/app.js");
        let (out_tx, mut out_rx) = mpsc::channel(4);
        let outbound = Outbound::from_sender(out_tx);

        let private = {
            let lease = ClientLease::acquire(None);
            let private = lease.handle();
            let url = format!("http://{addr}/_next/static/app.js");
            let result = relay(&lease, exchange(url, &scope), &outbound).await;
            assert!(matches!(result, Err(e) if e.is_upstream()));
            private
        };

        assert!(private.is_closed());
        assert!(out_rx.try_recv().is_err());
    }
}
