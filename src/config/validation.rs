//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate upstream and application addresses
//! - Validate proxy and page path prefixes and the listener address
//! - Validate extra page request headers
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: BridgeConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use axum::http::{HeaderName, HeaderValue};
use thiserror::Error;
use url::Url;

use crate::config::schema::BridgeConfig;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("listener.bind_address '{0}' is not a socket address")]
    BindAddress(String),

    #[error("{field} '{value}' must be an absolute http(s) URL with a host")]
    Url { field: &'static str, value: String },

    #[error("nextjs.dev_proxy_paths entry '{0}' must start with '/'")]
    PathPrefix(String),

    #[error("observability.metrics_address '{0}' is not a socket address")]
    MetricsAddress(String),

    #[error("pages.prefixes entry '{0}' must start with '/'")]
    PagePrefix(String),

    #[error("pages.headers entry '{0}' is not a valid header")]
    PageHeader(String),
}

/// Validate a loaded configuration, collecting every error.
pub fn validate_config(config: &BridgeConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::BindAddress(config.listener.bind_address.clone()));
    }

    if !is_http_url(&config.nextjs.server_url) {
        errors.push(ValidationError::Url {
            field: "nextjs.server_url",
            value: config.nextjs.server_url.clone(),
        });
    }

    for prefix in &config.nextjs.dev_proxy_paths {
        if !prefix.starts_with('/') {
            errors.push(ValidationError::PathPrefix(prefix.clone()));
        }
    }

    if let Some(url) = &config.application.url {
        if !is_http_url(url) {
            errors.push(ValidationError::Url {
                field: "application.url",
                value: url.clone(),
            });
        }
    }

    for prefix in &config.pages.prefixes {
        if !prefix.starts_with('/') {
            errors.push(ValidationError::PagePrefix(prefix.clone()));
        }
    }

    for (name, value) in &config.pages.headers {
        if HeaderName::from_bytes(name.as_bytes()).is_err() || HeaderValue::from_str(value).is_err() {
            errors.push(ValidationError::PageHeader(name.clone()));
        }
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::MetricsAddress(
            config.observability.metrics_address.clone(),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn is_http_url(value: &str) -> bool {
    Url::parse(value)
        .map(|url| matches!(url.scheme(), "http" | "https") && url.host_str().is_some())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert_eq!(validate_config(&BridgeConfig::default()), Ok(()));
    }

    #[test]
    fn collects_every_error() {
        let mut config = BridgeConfig::default();
        config.listener.bind_address = "nowhere".into();
        config.nextjs.server_url = "ftp://127.0.0.1:3000".into();
        config.nextjs.dev_proxy_paths = vec!["_next".into(), "/ok".into()];
        config.application.url = Some("not a url".into());

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 4);
        assert!(errors.contains(&ValidationError::PathPrefix("_next".into())));
    }

    #[test]
    fn page_settings_are_checked() {
        let mut config = BridgeConfig::default();
        config.pages.prefixes = vec!["/dashboard".into(), "about".into()];
        config.pages.headers.insert("x-tenant".into(), "acme".into());
        config.pages.headers.insert("bad header".into(), "x".into());

        assert_eq!(
            validate_config(&config),
            Err(vec![
                ValidationError::PagePrefix("about".into()),
                ValidationError::PageHeader("bad header".into()),
            ])
        );
    }

    #[test]
    fn metrics_address_checked_only_when_enabled() {
        let mut config = BridgeConfig::default();
        config.observability.metrics_address = "bogus".into();
        assert!(validate_config(&config).is_ok());

        config.observability.metrics_enabled = true;
        assert_eq!(
            validate_config(&config),
            Err(vec![ValidationError::MetricsAddress("bogus".into())])
        );
    }
}
