//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → CLI overrides (main.rs)
//!     → BridgeConfig (validated, immutable)
//!     → NextJsSettings borrowed by the router and bridges at construction
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require a restart
//! - All fields have defaults to allow minimal configs
//! - Bridging is off unless `nextjs.dev_mode` is set explicitly

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::{
    ApplicationConfig, BridgeConfig, ListenerConfig, LogFormat, NextJsSettings, ObservabilityConfig, PagesConfig,
    SpliceConfig,
};
