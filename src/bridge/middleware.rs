//! The bridging middleware: wraps the primary application and diverts the
//! frontend server's namespace to the bridges.

use futures_util::future::BoxFuture;

use crate::bridge::error::BridgeError;
use crate::bridge::http::HttpBridge;
use crate::bridge::websocket::WebSocketBridge;
use crate::config::NextJsSettings;
use crate::lifecycle::LifespanManager;
use crate::observability::metrics;
use crate::protocol::{AppError, Application, Inbound, Outbound, Scope};
use crate::routing::{Dispatch, Router};

/// Application wrapper that owns the lifespan handshake and, in
/// development mode, relays the configured prefixes to the frontend server.
#[derive(Debug)]
pub struct DevProxyMiddleware<A> {
    inner: A,
    router: Router,
    lifespan: LifespanManager,
    bridges: Option<Bridges>,
}

#[derive(Debug)]
struct Bridges {
    http: HttpBridge,
    websocket: WebSocketBridge,
}

impl<A: Application> DevProxyMiddleware<A> {
    /// Wrap `inner`. Bridges are built only in development mode; an unusable
    /// upstream address is reported here rather than per request.
    pub fn new(inner: A, settings: &NextJsSettings) -> Result<Self, BridgeError> {
        let bridges = if settings.dev_mode {
            Some(Bridges {
                http: HttpBridge::new(settings)?,
                websocket: WebSocketBridge::new(settings)?,
            })
        } else {
            None
        };

        tracing::info!(
            dev_mode = settings.dev_mode,
            upstream = %settings.server_url,
            prefixes = ?settings.dev_proxy_paths,
            "Frontend bridge configured"
        );

        Ok(Self {
            inner,
            router: Router::from_settings(settings),
            lifespan: LifespanManager::new(),
            bridges,
        })
    }

    pub fn lifespan(&self) -> &LifespanManager {
        &self.lifespan
    }

    pub fn inner(&self) -> &A {
        &self.inner
    }

    fn bridges(&self) -> Result<&Bridges, BridgeError> {
        self.bridges.as_ref().ok_or(BridgeError::ImproperlyConfigured(
            "the frontend bridge is for development only",
        ))
    }

    async fn dispatch(&self, scope: Scope, mut inbound: Inbound, outbound: Outbound) -> Result<(), AppError> {
        match self.router.dispatch(&scope) {
            Dispatch::Lifecycle => self.lifespan.run(&self.inner, scope, inbound, outbound).await,
            Dispatch::HttpBridge => {
                self.bridges()?.http.serve(&scope, &mut inbound, &outbound).await?;
                Ok(())
            }
            Dispatch::WebSocketBridge => {
                self.bridges()?.websocket.serve(&scope, inbound, outbound).await?;
                Ok(())
            }
            Dispatch::PassThrough => {
                metrics::record_passthrough(scope.kind.as_str());
                self.inner.call(scope, inbound, outbound).await
            }
        }
    }
}

impl<A: Application> Application for DevProxyMiddleware<A> {
    fn call(&self, scope: Scope, inbound: Inbound, outbound: Outbound) -> BoxFuture<'_, Result<(), AppError>> {
        Box::pin(self.dispatch(scope, inbound, outbound))
    }
}
