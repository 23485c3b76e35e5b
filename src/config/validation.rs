//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check collaborator URLs are usable
//! - Validate value ranges (timeouts > 0, paths well-formed)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GateConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use rustls::pki_types::ServerName;
use std::net::SocketAddr;
use thiserror::Error;
use url::Url;

use crate::config::schema::GateConfig;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

/// Validate a configuration, collecting every problem found.
pub fn validate_config(config: &GateConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("'{}' is not a socket address", config.listener.bind_address),
        ));
    }

    validate_upstream(config, &mut errors);

    match Url::parse(&config.origin.endpoint) {
        Ok(url) if matches!(url.scheme(), "http" | "https") && url.host_str().is_some() => {}
        _ => errors.push(ValidationError::new(
            "origin.endpoint",
            format!("'{}' is not an http(s) URL", config.origin.endpoint),
        )),
    }

    if config.rule_store.address.trim().is_empty() {
        errors.push(ValidationError::new("rule_store.address", "must not be empty"));
    }

    for (field, value) in [
        ("origin.timeout_ms", config.origin.timeout_ms),
        ("rule_store.timeout_ms", config.rule_store.timeout_ms),
        ("timeouts.connect_secs", config.timeouts.connect_secs),
        ("timeouts.tls_handshake_secs", config.timeouts.tls_handshake_secs),
        ("timeouts.response_header_secs", config.timeouts.response_header_secs),
    ] {
        if value == 0 {
            errors.push(ValidationError::new(field, "must be greater than zero"));
        }
    }

    let obs = &config.observability;
    for (field, path) in [
        ("observability.metrics_path", &obs.metrics_path),
        ("observability.health_path", &obs.health_path),
    ] {
        if !path.starts_with('/') || path.len() < 2 {
            errors.push(ValidationError::new(
                field,
                format!("'{}' must start with '/' and name a path", path),
            ));
        }
    }
    if obs.metrics_path == obs.health_path {
        errors.push(ValidationError::new(
            "observability.metrics_path",
            "must differ from observability.health_path",
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_upstream(config: &GateConfig, errors: &mut Vec<ValidationError>) {
    let upstream = &config.upstream;
    match Url::parse(&upstream.base_url) {
        Ok(url) => {
            if !matches!(url.scheme(), "http" | "https") {
                errors.push(ValidationError::new(
                    "upstream.base_url",
                    format!("unsupported scheme '{}'", url.scheme()),
                ));
            }
            if url.host_str().is_none() {
                errors.push(ValidationError::new("upstream.base_url", "missing host"));
            }
            if url.path() != "/" || url.query().is_some() {
                errors.push(ValidationError::new(
                    "upstream.base_url",
                    "must not carry a path or query; inbound paths are forwarded as-is",
                ));
            }
        }
        Err(e) => errors.push(ValidationError::new(
            "upstream.base_url",
            format!("'{}' is not a URL: {}", upstream.base_url, e),
        )),
    }

    if let Some(sni) = &upstream.sni_override {
        if ServerName::try_from(sni.as_str()).is_err() {
            errors.push(ValidationError::new(
                "upstream.sni_override",
                format!("'{}' is not a valid server name", sni),
            ));
        }
    }

    if upstream.max_sni_pools == 0 {
        errors.push(ValidationError::new(
            "upstream.max_sni_pools",
            "must be greater than zero",
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&GateConfig::default()).is_ok());
    }

    #[test]
    fn test_collects_all_errors() {
        let mut config = GateConfig::default();
        config.upstream.base_url = "ftp://files".to_string();
        config.origin.endpoint = "not a url".to_string();
        config.timeouts.response_header_secs = 0;
        config.observability.metrics_path = "/healthz".to_string();

        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field).collect();
        assert!(fields.contains(&"upstream.base_url"));
        assert!(fields.contains(&"origin.endpoint"));
        assert!(fields.contains(&"timeouts.response_header_secs"));
        assert!(fields.contains(&"observability.metrics_path"));
    }

    #[test]
    fn test_upstream_path_rejected() {
        let mut config = GateConfig::default();
        config.upstream.base_url = "http://haproxy:80/api".to_string();
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "upstream.base_url");
    }

    #[test]
    fn test_invalid_sni_override() {
        let mut config = GateConfig::default();
        config.upstream.sni_override = Some("bad host name!".to_string());
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors[0].field, "upstream.sni_override");
    }
}
