//! Frontend bridging subsystem.
//!
//! # Data Flow
//! ```text
//! Connection scope
//!     → middleware.rs (DevProxyMiddleware: route via routing::Router)
//!         ├─ lifespan   → lifecycle::LifespanManager
//!         ├─ http       → http.rs (HttpBridge)
//!         ├─ websocket  → websocket.rs (WebSocketBridge)
//!         └─ otherwise  → inner application
//!
//! Both bridges:
//!     upstream.rs (build upstream URL from base + scope)
//!     headers.rs (filter what crosses the relay)
//! ```
//!
//! # Design Decisions
//! - Bridges cannot be constructed outside development mode
//! - No retries: a failed upstream attempt is reported immediately
//! - HTTP failures propagate; websocket failures become close messages

pub mod error;
pub mod headers;
pub mod http;
pub mod middleware;
pub mod upstream;
pub mod websocket;

pub use error::BridgeError;
pub use http::{BodyBuffer, BodyProgress, HttpBridge};
pub use middleware::DevProxyMiddleware;
pub use upstream::UpstreamBase;
pub use websocket::{Flow, SocketState, WebSocketBridge, WebSocketSession};
