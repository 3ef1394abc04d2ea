//! Upstream address construction.

use url::Url;

use crate::bridge::error::BridgeError;
use crate::protocol::Scope;

/// Parsed upstream base address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamBase {
    url: Url,
}

impl UpstreamBase {
    /// Parse an absolute `http`/`https` base address.
    pub fn parse(raw: &str) -> Result<Self, BridgeError> {
        let invalid = |reason: &str| BridgeError::InvalidUpstreamUrl {
            url: raw.to_string(),
            reason: reason.to_string(),
        };

        let url = Url::parse(raw).map_err(|e| invalid(&e.to_string()))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(invalid("scheme must be http or https"));
        }
        if url.host_str().is_none() {
            return Err(invalid("missing host"));
        }
        Ok(Self { url })
    }

    /// Request URL: base + path + `?query` (the `?` only when there is a query).
    pub fn http_url(&self, scope: &Scope) -> String {
        let base = self.url.as_str().trim_end_matches('/');
        with_query(format!("{base}{}", scope.path), &scope.query_string)
    }

    /// Websocket URL: same host and port, `ws`/`wss` scheme, inbound path.
    pub fn websocket_url(&self, scope: &Scope) -> String {
        let scheme = match self.url.scheme() {
            "https" => "wss",
            _ => "ws",
        };
        let host = self.url.host_str().unwrap_or_default();
        let authority = match self.url.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        };
        with_query(format!("{scheme}://{authority}{}", scope.path), &scope.query_string)
    }

    pub fn as_str(&self) -> &str {
        self.url.as_str()
    }
}

fn with_query(mut url: String, query: &str) -> String {
    if !query.is_empty() {
        url.push('?');
        url.push_str(query);
    }
    url
}
