//! Responses produced by the gateway itself.
//!
//! # Responsibilities
//! - Plain-text rejection bodies for drops, bad input and upstream failure
//! - Fixed health record served on the health path

use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};

pub const BLOCKED_BODY: &str = "Request blocked by origin gate\n";
pub const BAD_REQUEST_BODY: &str = "Missing client address\n";
pub const BAD_GATEWAY_BODY: &str = "Upstream unavailable\n";

/// A response the gateway answers on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// Admission decided Drop.
    Blocked,
    /// No client address could be determined.
    MissingClientAddress,
    /// The upstream exchange failed.
    UpstreamUnavailable,
}

impl Rejection {
    pub fn status(&self) -> StatusCode {
        match self {
            Rejection::Blocked => StatusCode::FORBIDDEN,
            Rejection::MissingClientAddress => StatusCode::BAD_REQUEST,
            Rejection::UpstreamUnavailable => StatusCode::BAD_GATEWAY,
        }
    }

    pub fn body(&self) -> &'static str {
        match self {
            Rejection::Blocked => BLOCKED_BODY,
            Rejection::MissingClientAddress => BAD_REQUEST_BODY,
            Rejection::UpstreamUnavailable => BAD_GATEWAY_BODY,
        }
    }
}

impl IntoResponse for Rejection {
    fn into_response(self) -> Response {
        (
            self.status(),
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            self.body(),
        )
            .into_response()
    }
}

/// Liveness record returned by the health path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
}

impl HealthStatus {
    pub fn ok(uptime_secs: u64) -> Self {
        Self {
            status: "ok".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_secs,
        }
    }
}
