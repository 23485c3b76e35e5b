//! Origin-aware admission gateway.
//!
//! Resolves the network origin of each caller, looks up the most specific
//! drop rule for that origin and either rejects the request or forwards it
//! to a single upstream. Lookup failures admit the request.

pub mod admission;
pub mod config;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod origin;
pub mod rules;

pub use admission::{AdmissionGate, Decision, Verdict};
pub use config::GateConfig;
pub use http::GatewayServer;
pub use lifecycle::Shutdown;
