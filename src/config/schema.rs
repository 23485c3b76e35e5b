//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Root configuration for the gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GateConfig {
    /// Listener configuration (bind address, TLS).
    pub listener: ListenerConfig,

    /// Next hop that admitted requests are forwarded to.
    pub upstream: UpstreamConfig,

    /// Origin-metadata collaborator.
    pub origin: OriginConfig,

    /// Rule store collaborator.
    pub rule_store: RuleStoreConfig,

    /// Timeout configuration for upstream exchanges.
    pub timeouts: TimeoutConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8090").
    pub bind_address: String,

    /// Optional TLS termination for inbound connections.
    pub tls: Option<TlsConfig>,

    /// Grace period for draining in-flight requests on shutdown.
    pub shutdown_grace_secs: u64,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8090".to_string(),
            tls: None,
            shutdown_grace_secs: 30,
        }
    }
}

/// TLS configuration for the listener.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TlsConfig {
    /// Path to certificate file (PEM).
    pub cert_path: String,

    /// Path to private key file (PEM).
    pub key_path: String,
}

/// Upstream (next hop) configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Base URL, scheme and authority only (e.g., "https://ingress:443").
    pub base_url: String,

    /// Host and SNI sent upstream instead of the inbound Host.
    pub sni_override: Option<String>,

    /// Disable upstream certificate verification.
    pub skip_tls_verify: bool,

    /// PEM bundle of trusted roots; the web PKI roots are used when unset.
    pub ca_file: Option<String>,

    /// Maximum number of per-SNI connection pools kept alive.
    pub max_sni_pools: usize,

    /// Idle connections kept per pool.
    pub max_idle_per_host: usize,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: "http://haproxy:80".to_string(),
            sni_override: None,
            skip_tls_verify: false,
            ca_file: None,
            max_sni_pools: 256,
            max_idle_per_host: 64,
        }
    }
}

/// Origin-metadata collaborator configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct OriginConfig {
    /// Lookup endpoint; queried as `<endpoint>?ip=<address>`.
    pub endpoint: String,

    /// Budget for one lookup in milliseconds.
    pub timeout_ms: u64,
}

impl Default for OriginConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://origin-meta:8081/lookup".to_string(),
            timeout_ms: 2000,
        }
    }
}

impl OriginConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Rule store configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RuleStoreConfig {
    /// `host:port` or `redis://` URL.
    pub address: String,

    /// Budget for the whole key cascade in milliseconds.
    pub timeout_ms: u64,
}

impl Default for RuleStoreConfig {
    fn default() -> Self {
        Self {
            address: "redis://localhost:6379".to_string(),
            timeout_ms: 1000,
        }
    }
}

impl RuleStoreConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Timeout configuration for upstream exchanges.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// TCP connection establishment timeout in seconds.
    pub connect_secs: u64,

    /// TLS handshake timeout in seconds.
    pub tls_handshake_secs: u64,

    /// Wait for the upstream response head in seconds. The body is streamed
    /// without a deadline.
    pub response_header_secs: u64,

    /// Idle pooled connection lifetime in seconds.
    pub pool_idle_secs: u64,

    /// TCP keepalive interval in seconds.
    pub keepalive_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_secs: 15,
            tls_handshake_secs: 15,
            response_header_secs: 10,
            pool_idle_secs: 120,
            keepalive_secs: 60,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pretty" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("unknown log format '{}'", other)),
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,

    /// Path answered with the Prometheus text exposition.
    pub metrics_path: String,

    /// Path answered with the liveness/readiness record.
    pub health_path: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_path: "/metrics".to_string(),
            health_path: "/healthz".to_string(),
        }
    }
}
