//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming connection scope (kind, path)
//!     → router.rs (dispatch decision)
//!     → matcher.rs (evaluate prefix conditions)
//!     → Return: Lifecycle | HttpBridge | WebSocketBridge | PassThrough
//!
//! Route Compilation (at startup):
//!     NextJsSettings { dev_mode, dev_proxy_paths }
//!     → Compile prefix matchers
//!     → Freeze as immutable Router
//! ```
//!
//! # Design Decisions
//! - Routes compiled at startup, immutable at runtime
//! - No regex in hot path (prefix matching only)
//! - Deterministic: same input always yields the same target

pub mod matcher;
pub mod router;

pub use router::{Dispatch, Router};
