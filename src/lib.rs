//! Development-mode frontend bridge.
//!
//! Wraps a primary application and relays the Next.js development server's
//! namespace (`/_next`, `/__next`, `/next` by default) to that server over
//! HTTP and WebSocket, so the browser talks to a single origin. Pages can
//! also be rendered by that server and served from the application's paths.

// Host protocol and server
pub mod http;
pub mod protocol;

// Bridging
pub mod bridge;
pub mod routing;

// Applications behind the bridge
pub mod app;
pub mod render;

// Cross-cutting concerns
pub mod config;
pub mod lifecycle;
pub mod observability;

pub use bridge::DevProxyMiddleware;
pub use config::BridgeConfig;
pub use http::HostServer;
pub use lifecycle::Shutdown;
