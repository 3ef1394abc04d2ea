//! Connection dispatch.
//!
//! # Responsibilities
//! - Classify each connection scope into a dispatch target
//! - Keep bridging disabled outside development mode
//!
//! # Design Decisions
//! - Pure and synchronous: no I/O, callable directly from unit tests
//! - Fails closed: with development mode off everything except lifespan
//!   passes through, whatever the path

use crate::config::NextJsSettings;
use crate::protocol::{Scope, ScopeKind};
use crate::routing::matcher::{AnyPrefixMatcher, Matcher};

/// Where a connection scope is handed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// Startup/shutdown signaling, handled by the lifecycle manager.
    Lifecycle,
    /// Relay a request/response exchange to the frontend server.
    HttpBridge,
    /// Relay a websocket stream to the frontend server.
    WebSocketBridge,
    /// Hand to the inner application untouched.
    PassThrough,
}

/// Immutable routing table built from settings.
#[derive(Debug, Clone)]
pub struct Router {
    dev_mode: bool,
    prefixes: AnyPrefixMatcher,
}

impl Router {
    pub fn new<I, S>(dev_mode: bool, prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            dev_mode,
            prefixes: AnyPrefixMatcher::new(prefixes),
        }
    }

    pub fn from_settings(settings: &NextJsSettings) -> Self {
        Self::new(settings.dev_mode, settings.dev_proxy_paths.iter().cloned())
    }

    pub fn dev_mode(&self) -> bool {
        self.dev_mode
    }

    /// Classify a scope.
    pub fn dispatch(&self, scope: &Scope) -> Dispatch {
        self.classify(scope.kind, &scope.path)
    }

    /// Classify by connection kind and path.
    pub fn classify(&self, kind: ScopeKind, path: &str) -> Dispatch {
        match kind {
            ScopeKind::Lifespan => Dispatch::Lifecycle,
            _ if !self.dev_mode => Dispatch::PassThrough,
            _ if !self.prefixes.matches(path) => Dispatch::PassThrough,
            ScopeKind::Http => Dispatch::HttpBridge,
            ScopeKind::WebSocket => Dispatch::WebSocketBridge,
        }
    }
}
