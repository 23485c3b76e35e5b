//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP/TLS connection
//!     → server.rs (axum router; health and metrics answered locally)
//!     → request_id.rs (x-request-id, request span)
//!     → client_ip.rs (X-Forwarded-For or peer address)
//!     → admission gate (origin → rules → decide)
//!     → forward.rs (rewrite, stream to and from the upstream)
//!     → response.rs (403 / 400 / 502 bodies)
//! ```

pub mod client_ip;
pub mod forward;
pub mod request_id;
pub mod response;
pub mod server;

pub use client_ip::client_ip;
pub use forward::{ForwardContext, ForwardError, Forwarder};
pub use request_id::X_REQUEST_ID;
pub use response::{HealthStatus, Rejection};
pub use server::{GatewayServer, StartupError};
