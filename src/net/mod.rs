//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Forwarder
//!     → connector.rs (TCP dial, optional TLS handshake with a fixed SNI)
//!     → tls.rs (rustls client config shared by every connector)
//!     → hyper-util pooled client
//!
//! Inbound TLS (optional)
//!     → tls.rs (certificate/key loading for axum-server)
//! ```
//!
//! # Design Decisions
//! - Dial and handshake deadlines live in the connector, not the client
//! - The TLS server name is fixed per connector so pooled connections never
//!   cross SNI boundaries

pub mod connector;
pub mod tls;

pub use connector::{ConnectError, DialConfig, UpstreamConnector, UpstreamIo};
pub use tls::{load_tls_config, upstream_client_config, TlsError};
