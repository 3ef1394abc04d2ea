//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Router, bridges, lifespan manager and host server produce:
//!     → logging.rs (structured tracing events)
//!     → metrics.rs (counters and gauges)
//!
//! Consumers:
//!     → stdout (pretty for a terminal, JSON for collectors)
//!     → Prometheus scrape endpoint (optional)
//! ```
//!
//! # Design Decisions
//! - `RUST_LOG` always wins over the configured level
//! - Metrics go through the `metrics` facade; without an installed exporter
//!   every update is a no-op

pub mod logging;
pub mod metrics;
