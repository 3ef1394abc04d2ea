//! Bridge error taxonomy.

use thiserror::Error;

use crate::protocol::HostGone;

/// Errors raised while relaying a connection.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// A bridge was constructed or invoked outside development mode.
    #[error("Improperly configured: {0}")]
    ImproperlyConfigured(&'static str),

    /// The configured upstream address cannot be used.
    #[error("Invalid upstream URL '{url}': {reason}")]
    InvalidUpstreamUrl { url: String, reason: String },

    /// The outbound request could not be assembled.
    #[error("Failed to build upstream request: {0}")]
    Request(#[from] axum::http::Error),

    /// The upstream server could not be reached.
    #[error("Upstream request failed: {0}")]
    Upstream(#[from] hyper_util::client::legacy::Error),

    /// The upstream response body could not be read in full.
    #[error("Failed to read upstream response: {0}")]
    UpstreamBody(axum::Error),

    /// The upstream kept redirecting.
    #[error("Too many redirects from upstream (last: {0})")]
    TooManyRedirects(String),

    /// The client was used after it had been closed.
    #[error("Upstream client is closed")]
    ClientClosed,

    /// The host stopped accepting messages for this connection.
    #[error(transparent)]
    HostGone(#[from] HostGone),
}

impl BridgeError {
    /// True when the failure is on the upstream side of the relay.
    pub fn is_upstream(&self) -> bool {
        matches!(
            self,
            BridgeError::Upstream(_)
                | BridgeError::UpstreamBody(_)
                | BridgeError::TooManyRedirects(_)
                | BridgeError::ClientClosed
        )
    }
}
