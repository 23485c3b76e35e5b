//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML, optional)
//!     → loader.rs (parse & deserialize)
//!     → flags / environment (override)
//!     → validation.rs (semantic checks)
//!     → GateConfig (validated, immutable)
//!     → shared via Arc to all subsystems
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require a restart
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigArgs, ConfigError};
pub use schema::GateConfig;
pub use schema::{
    ListenerConfig, LogFormat, ObservabilityConfig, OriginConfig, RuleStoreConfig, TimeoutConfig,
    TlsConfig, UpstreamConfig,
};
pub use validation::{validate_config, ValidationError};
