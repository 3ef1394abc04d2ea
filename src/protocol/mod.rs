//! Host server protocol.
//!
//! # Data Flow
//! ```text
//! Host server (one per inbound connection)
//!     → scope.rs (immutable connection descriptor + shared state handle)
//!     → channel.rs (Inbound message source, Outbound message sink)
//!     → app.rs (Application::call drives one connection to completion)
//!
//! Messages (message.rs):
//!     host → app:  lifespan.startup, http.request, websocket.receive, ...
//!     app → host:  http.response.start, websocket.accept, websocket.send, ...
//! ```
//!
//! # Design Decisions
//! - Every exchange is an explicit `Message` value; no callback duck-typing
//! - Headers are an ordered list of pairs; lookups are case-insensitive
//! - Process-wide state is a typed registry keyed by well-known names

pub mod app;
pub mod channel;
pub mod message;
pub mod scope;
pub mod state;

pub use app::{from_fn, AppError, Application};
pub use channel::{pipe, HostGone, Inbound, Outbound};
pub use message::{Frame, Message};
pub use scope::{Headers, Scope, ScopeKind};
pub use state::SharedState;
