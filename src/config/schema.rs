//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the bridge.
//! All types derive Serde traits for deserialization from config files.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Root configuration for the development bridge.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct BridgeConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Frontend development server settings.
    pub nextjs: NextJsSettings,

    /// Primary application that receives everything not bridged.
    pub application: ApplicationConfig,

    /// Pages rendered by the frontend server instead of the application.
    pub pages: PagesConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "127.0.0.1:8000").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:8000".to_string(),
        }
    }
}

/// Frontend development server settings.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct NextJsSettings {
    /// Base address of the frontend development server.
    pub server_url: String,

    /// Path prefixes relayed to the frontend server.
    pub dev_proxy_paths: Vec<String>,

    /// Bridging is active only when this is set.
    pub dev_mode: bool,
}

impl Default for NextJsSettings {
    fn default() -> Self {
        Self {
            server_url: "http://127.0.0.1:3000".to_string(),
            dev_proxy_paths: vec![
                "/_next".to_string(),
                "/__next".to_string(),
                "/next".to_string(),
            ],
            dev_mode: false,
        }
    }
}

/// Pass-through target.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ApplicationConfig {
    /// Base address of the primary application. Unset means unmatched
    /// requests are answered with 404.
    pub url: Option<String>,
}

/// Server-rendered pages fetched from the frontend server.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
#[serde(default)]
pub struct PagesConfig {
    /// Path prefixes rendered by the frontend server. Empty disables page
    /// rendering.
    pub prefixes: Vec<String>,

    /// Follow redirects from the frontend server instead of relaying them.
    pub allow_redirects: bool,

    /// Extra request headers; they override forwarded ones.
    pub headers: BTreeMap<String, String>,

    /// Markup spliced into pages that carry the section markers.
    pub splice: Option<SpliceConfig>,
}

/// Markup inserted around the rendered page body.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
#[serde(default)]
pub struct SpliceConfig {
    /// Appended to the end of `<head>`.
    pub head: String,
    /// Inserted before the page body.
    pub body_begin: String,
    /// Inserted after the page body.
    pub body_end: String,
}

/// Log output format.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}
