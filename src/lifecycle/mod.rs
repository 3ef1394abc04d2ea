//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (manager.rs):
//!     lifespan.startup → create pooled client → publish in shared state
//!                      → inner app acks (or fallback acks)
//!
//! Shutdown (manager.rs):
//!     lifespan.shutdown → inner app acks (or fallback acks)
//!                       → remove pooled client from state → close it
//!
//! Process signals (shutdown.rs):
//!     SIGTERM/SIGINT → stop accepting → lifespan shutdown → exit
//! ```
//!
//! # Design Decisions
//! - One pooled client per process; created once, closed once
//! - Hosts without shared state get no pooled client; bridges use private ones
//! - The local handshake runs only after the inner app has failed

pub mod manager;
pub mod pool;
pub mod shutdown;

pub use manager::{LifespanManager, PoolLifecycle, PoolPhase};
pub use pool::{ClientLease, UpstreamClient, HTTP_CLIENT_KEY};
pub use shutdown::Shutdown;
