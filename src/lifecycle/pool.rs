//! Pooled outbound HTTP client.
//!
//! # Responsibilities
//! - Wrap a keep-alive HTTP client shared by every bridged exchange
//! - Enforce close-exactly-once: after `close` the client is unusable
//!
//! # Design Decisions
//! - The client lives in an `ArcSwapOption`; closing swaps it out, so a
//!   second close observes `None` and does nothing
//! - In-flight requests keep their own handle and finish normally

use arc_swap::ArcSwapOption;
use axum::body::Body;
use axum::http::{Request, Response};
use hyper::body::Incoming;
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use std::sync::Arc;

use crate::bridge::BridgeError;
use crate::protocol::Scope;

/// Key under which the lifecycle manager publishes the pooled client.
pub const HTTP_CLIENT_KEY: &str = "nextjs_bridge.http_client";

type HttpClient = Client<HttpConnector, Body>;

/// Reusable outbound HTTP client with an explicit close.
pub struct UpstreamClient {
    inner: ArcSwapOption<HttpClient>,
}

impl UpstreamClient {
    pub fn new() -> Self {
        let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());
        Self {
            inner: ArcSwapOption::from_pointee(client),
        }
    }

    /// Issue one request. Fails with `ClientClosed` once the client is closed.
    pub async fn request(&self, request: Request<Body>) -> Result<Response<Incoming>, BridgeError> {
        let client = self.inner.load_full().ok_or(BridgeError::ClientClosed)?;
        Ok(client.request(request).await?)
    }

    /// Close the client. Returns true only for the call that actually closed it.
    pub fn close(&self) -> bool {
        self.inner.swap(None).is_some()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.load().is_none()
    }
}

impl Default for UpstreamClient {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for UpstreamClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpstreamClient")
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// A client borrowed for one exchange.
///
/// Pooled clients are left alone; a private client is closed when the
/// lease is dropped, whichever way the exchange ends.
#[derive(Debug)]
pub enum ClientLease {
    Pooled(Arc<UpstreamClient>),
    Private(Arc<UpstreamClient>),
}

impl ClientLease {
    /// Use the pooled client from shared state when present, else a private one.
    pub fn acquire(pooled: Option<Arc<UpstreamClient>>) -> Self {
        match pooled {
            Some(client) => ClientLease::Pooled(client),
            None => ClientLease::Private(Arc::new(UpstreamClient::new())),
        }
    }

    /// Lease for one exchange on `scope`: the client published in its shared
    /// state, if any.
    pub fn for_scope(scope: &Scope) -> Self {
        Self::acquire(
            scope
                .state
                .as_ref()
                .and_then(|state| state.get::<UpstreamClient>(HTTP_CLIENT_KEY)),
        )
    }

    pub fn is_pooled(&self) -> bool {
        matches!(self, ClientLease::Pooled(_))
    }

    /// Another handle to the leased client; it outlives the lease.
    pub fn handle(&self) -> Arc<UpstreamClient> {
        match self {
            ClientLease::Pooled(client) | ClientLease::Private(client) => client.clone(),
        }
    }
}

impl std::ops::Deref for ClientLease {
    type Target = UpstreamClient;

    fn deref(&self) -> &Self::Target {
        match self {
            ClientLease::Pooled(client) | ClientLease::Private(client) => client.as_ref(),
        }
    }
}

impl Drop for ClientLease {
    fn drop(&mut self) {
        if let ClientLease::Private(client) = self {
            if client.close() {
                tracing::trace!("Private upstream client closed");
            }
        }
    }
}
