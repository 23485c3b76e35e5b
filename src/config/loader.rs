//! Configuration loading from disk and the command line.

use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::config::schema::{GateConfig, LogFormat};
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation failed: {}", join(.0))]
    Validation(Vec<ValidationError>),
}

fn join(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Parse a configuration file without validating it.
pub fn read_config(path: &Path) -> Result<GateConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    Ok(toml::from_str(&content)?)
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<GateConfig, ConfigError> {
    let config = read_config(path)?;
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Command-line flags and their environment equivalents.
///
/// Flags override values from the optional config file.
#[derive(Debug, Clone, Default, clap::Args)]
pub struct ConfigArgs {
    /// TOML configuration file.
    #[arg(long, env = "GATE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Listen port (binds all interfaces).
    #[arg(long, env = "GATE_PORT")]
    pub port: Option<u16>,

    /// Upstream base URL (scheme and authority).
    #[arg(long, env = "GATE_UPSTREAM_URL")]
    pub upstream_url: Option<String>,

    /// Origin-metadata lookup endpoint.
    #[arg(long, env = "GATE_ORIGIN_URL")]
    pub origin_url: Option<String>,

    /// Rule store address (`host:port` or `redis://...`).
    #[arg(long, env = "GATE_RULE_STORE")]
    pub rule_store: Option<String>,

    /// Disable upstream TLS certificate verification.
    #[arg(long, env = "GATE_SKIP_TLS_VERIFY")]
    pub skip_tls_verify: Option<bool>,

    /// Host/SNI sent upstream instead of the inbound Host.
    #[arg(long, env = "GATE_SNI_OVERRIDE")]
    pub sni_override: Option<String>,

    /// Log format: pretty or json.
    #[arg(long, env = "GATE_LOG_FORMAT")]
    pub log_format: Option<LogFormat>,
}

impl ConfigArgs {
    /// Overlay flag values onto `config`.
    pub fn apply(&self, config: &mut GateConfig) {
        if let Some(port) = self.port {
            config.listener.bind_address = format!("0.0.0.0:{}", port);
        }
        if let Some(url) = &self.upstream_url {
            config.upstream.base_url = url.clone();
        }
        if let Some(url) = &self.origin_url {
            config.origin.endpoint = url.clone();
        }
        if let Some(address) = &self.rule_store {
            config.rule_store.address = address.clone();
        }
        if let Some(skip) = self.skip_tls_verify {
            config.upstream.skip_tls_verify = skip;
        }
        if let Some(sni) = &self.sni_override {
            let sni = sni.trim();
            config.upstream.sni_override = (!sni.is_empty()).then(|| sni.to_string());
        }
        if let Some(format) = self.log_format {
            config.observability.log_format = format;
        }
    }

    /// Resolve the effective configuration: file (if any), then flags, then validation.
    pub fn resolve(&self) -> Result<GateConfig, ConfigError> {
        let mut config = match &self.config {
            Some(path) => read_config(path)?,
            None => GateConfig::default(),
        };
        self.apply(&mut config);
        validate_config(&config).map_err(ConfigError::Validation)?;
        Ok(config)
    }
}
