//! Client address extraction.
//!
//! The first `X-Forwarded-For` entry wins; otherwise the transport peer is
//! used. Neither present means the request cannot be evaluated.

use axum::extract::ConnectInfo;
use axum::http::Request;
use std::net::SocketAddr;

use crate::http::forward::X_FORWARDED_FOR;

/// Resolve the client address of `request`, if any.
pub fn client_ip<B>(request: &Request<B>) -> Option<String> {
    let forwarded = request
        .headers()
        .get_all(X_FORWARDED_FOR)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(str::trim)
        .find(|entry| !entry.is_empty());
    if let Some(ip) = forwarded {
        return Some(ip.to_string());
    }

    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
}
