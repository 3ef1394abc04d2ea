//! HTTP host subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, request ID, tracing, lifespan around the listener)
//!         ├─ plain request     → http.request / http.response.* messages
//!         └─ websocket upgrade → websocket.rs (handshake, frame pump)
//!     → Application (normally DevProxyMiddleware)
//! ```

pub mod server;
pub mod websocket;

pub use server::{HostError, HostServer};
