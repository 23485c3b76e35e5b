//! Forwarding of admitted requests to the configured upstream.
//!
//! # Responsibilities
//! - Rebuild the request against the upstream base, path and query unchanged
//! - Strip hop-by-hop headers in both directions
//! - Rewrite `Host`, `X-Forwarded-*` and pick the TLS server name per request
//! - Stream the upstream response back without buffering
//!
//! # Design Decisions
//! - Redirects are returned to the caller as-is; the pooled client never follows them
//! - The response-header deadline starts once the request body has been handed
//!   to the connection; dialing and TLS are bounded by their own deadlines
//! - Response bodies stream without a deadline
//! - The exchange runs on its own task so a caller disconnect does not abort it
//! - One pooled client per SNI name, so connections never cross identities
//! - SNI pools are bounded; idle pools go first, then the least recently used

use axum::body::{Body, Bytes};
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, Request, Response, Uri};
use dashmap::DashMap;
use hyper::body::{Body as HttpBody, Frame, SizeHint};
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use rustls::ClientConfig;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::Notify;

use crate::config::{TimeoutConfig, UpstreamConfig};
use crate::net::{upstream_client_config, DialConfig, TlsError, UpstreamConnector};

pub const X_FORWARDED_FOR: &str = "x-forwarded-for";
pub const X_FORWARDED_PROTO: &str = "x-forwarded-proto";
pub const X_FORWARDED_HOST: &str = "x-forwarded-host";

/// Headers that describe a single connection and must not be relayed.
static HOP_BY_HOP: [HeaderName; 8] = [
    header::CONNECTION,
    HeaderName::from_static("keep-alive"),
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
];

type UpstreamClient = Client<UpstreamConnector, Body>;

struct SniPool {
    client: UpstreamClient,
    last_used: Instant,
}

#[derive(Debug, Error)]
pub enum ForwardError {
    #[error("invalid upstream target: {0}")]
    InvalidTarget(String),

    #[error("upstream TLS setup failed: {0}")]
    Tls(#[from] TlsError),

    #[error("failed to build upstream request: {0}")]
    Build(#[from] axum::http::Error),

    #[error("upstream request failed: {0}")]
    Upstream(#[from] hyper_util::client::legacy::Error),

    #[error("upstream did not send response headers within {0:?}")]
    Timeout(Duration),

    #[error("upstream exchange aborted: {0}")]
    Aborted(#[from] tokio::task::JoinError),
}

/// Per-request values threaded through the forwarder.
#[derive(Debug, Clone)]
pub struct ForwardContext {
    /// Resolved client address appended to `X-Forwarded-For`.
    pub client_ip: String,
    /// Inbound `Host`, port included, if the caller sent one.
    pub host: Option<String>,
    /// Whether the inbound connection was encrypted.
    pub inbound_tls: bool,
}

/// Forwards admitted requests to the upstream base URL.
pub struct Forwarder {
    scheme: String,
    authority: String,
    upstream_host: String,
    sni_override: Option<String>,
    header_timeout: Duration,
    dial: DialConfig,
    pool_idle: Duration,
    max_idle_per_host: usize,
    tls: Option<Arc<ClientConfig>>,
    plain: UpstreamClient,
    tls_pools: DashMap<String, SniPool>,
    max_sni_pools: usize,
}

impl Forwarder {
    pub fn new(upstream: &UpstreamConfig, timeouts: &TimeoutConfig) -> Result<Self, ForwardError> {
        let base: Uri = upstream
            .base_url
            .parse()
            .map_err(|_| ForwardError::InvalidTarget(upstream.base_url.clone()))?;
        let scheme = base
            .scheme_str()
            .ok_or_else(|| ForwardError::InvalidTarget(upstream.base_url.clone()))?
            .to_ascii_lowercase();
        let authority = base
            .authority()
            .ok_or_else(|| ForwardError::InvalidTarget(upstream.base_url.clone()))?;
        let upstream_host = authority.host().to_string();
        let authority = authority.as_str().to_string();

        let tls = if scheme == "https" {
            Some(upstream_client_config(upstream)?)
        } else {
            None
        };

        let dial = DialConfig {
            connect_timeout: Duration::from_secs(timeouts.connect_secs),
            tls_handshake_timeout: Duration::from_secs(timeouts.tls_handshake_secs),
            keepalive: (timeouts.keepalive_secs > 0).then(|| Duration::from_secs(timeouts.keepalive_secs)),
        };
        let pool_idle = Duration::from_secs(timeouts.pool_idle_secs);
        let plain = build_client(
            UpstreamConnector::new(dial.clone(), None, None),
            pool_idle,
            upstream.max_idle_per_host,
        );

        tracing::info!(
            upstream = %upstream.base_url,
            sni_override = ?upstream.sni_override,
            verify_tls = !upstream.skip_tls_verify,
            "Forwarder configured"
        );

        Ok(Self {
            scheme,
            authority,
            upstream_host,
            sni_override: upstream.sni_override.clone(),
            header_timeout: Duration::from_secs(timeouts.response_header_secs),
            dial,
            pool_idle,
            max_idle_per_host: upstream.max_idle_per_host,
            tls,
            plain,
            tls_pools: DashMap::new(),
            max_sni_pools: upstream.max_sni_pools,
        })
    }

    /// Number of per-SNI pools currently cached.
    pub fn sni_pool_count(&self) -> usize {
        self.tls_pools.len()
    }

    /// Forward `request` and return the upstream response with a streaming body.
    pub async fn forward(
        &self,
        request: Request<Body>,
        ctx: &ForwardContext,
    ) -> Result<Response<Body>, ForwardError> {
        let (parts, body) = request.into_parts();

        // 1. Target URI: upstream base + inbound path and query
        let path_and_query = parts
            .uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/");
        let uri: Uri = format!("{}://{}{}", self.scheme, self.authority, path_and_query)
            .parse()
            .map_err(|_| ForwardError::InvalidTarget(path_and_query.to_string()))?;

        // 2. Host and SNI
        let host = self.outbound_host(ctx);
        let sni = host.trim_start_matches('[').trim_end_matches(']').to_string();

        // 3. Headers
        let mut headers = parts.headers;
        strip_hop_by_hop(&mut headers);
        headers.remove(header::HOST);
        let host_value =
            HeaderValue::from_str(&host).map_err(|_| ForwardError::InvalidTarget(host.clone()))?;
        headers.insert(header::HOST, host_value.clone());
        headers.insert(X_FORWARDED_HOST, host_value);
        headers.insert(
            X_FORWARDED_PROTO,
            HeaderValue::from_static(if ctx.inbound_tls { "https" } else { "http" }),
        );
        append_forwarded_for(&mut headers, &ctx.client_ip);

        let mut builder = Request::builder()
            .method(parts.method)
            .uri(uri)
            .version(axum::http::Version::HTTP_11);
        if let Some(h) = builder.headers_mut() {
            *h = headers;
        }
        let sent = Arc::new(Notify::new());
        let outbound = builder.body(Body::new(SentSignal {
            inner: body,
            sent: sent.clone(),
        }))?;

        // 4. Exchange on a detached task; the header deadline starts once the body is sent
        let client = self.client_for(&sni);
        let header_timeout = self.header_timeout;
        let exchange = tokio::spawn(async move {
            let response = client.request(outbound);
            tokio::pin!(response);
            tokio::select! {
                result = &mut response => Ok(result),
                _ = sent.notified() => tokio::time::timeout(header_timeout, response).await,
            }
        });
        let response = match exchange.await? {
            Ok(result) => result?,
            Err(_) => return Err(ForwardError::Timeout(header_timeout)),
        };

        // 5. Relay
        let (mut parts, body) = response.into_parts();
        strip_hop_by_hop(&mut parts.headers);
        tracing::debug!(
            client_ip = %ctx.client_ip,
            host = %host,
            status = %parts.status,
            "Upstream responded"
        );
        Ok(Response::from_parts(parts, Body::new(body)))
    }

    /// Host sent upstream: override, else inbound host without port, else upstream host.
    fn outbound_host(&self, ctx: &ForwardContext) -> String {
        if let Some(sni) = &self.sni_override {
            return sni.clone();
        }
        ctx.host
            .as_deref()
            .map(strip_port)
            .filter(|h| !h.is_empty())
            .unwrap_or(&self.upstream_host)
            .to_string()
    }

    fn client_for(&self, sni: &str) -> UpstreamClient {
        if self.tls.is_none() {
            return self.plain.clone();
        }
        let now = Instant::now();
        if let Some(mut pool) = self.tls_pools.get_mut(sni) {
            pool.last_used = now;
            return pool.client.clone();
        }

        if self.tls_pools.len() >= self.max_sni_pools {
            self.evict_pools(now);
        }
        let client = build_client(
            UpstreamConnector::new(self.dial.clone(), self.tls.clone(), Some(sni.to_string())),
            self.pool_idle,
            self.max_idle_per_host,
        );
        self.tls_pools
            .entry(sni.to_string())
            .or_insert(SniPool {
                client,
                last_used: now,
            })
            .client
            .clone()
    }

    /// Make room for one pool: drop idle pools, then the least recently used.
    fn evict_pools(&self, now: Instant) {
        self.tls_pools
            .retain(|_, pool| now.duration_since(pool.last_used) < self.pool_idle);

        while self.tls_pools.len() >= self.max_sni_pools {
            let oldest = self
                .tls_pools
                .iter()
                .min_by_key(|entry| entry.value().last_used)
                .map(|entry| entry.key().clone());
            let Some(sni) = oldest else {
                break;
            };
            self.tls_pools.remove(&sni);
            tracing::debug!(sni = %sni, pools = self.max_sni_pools, "Evicted least recently used SNI pool");
        }
    }
}

/// Request body that wakes `sent` once the last frame has been taken.
struct SentSignal {
    inner: Body,
    sent: Arc<Notify>,
}

impl HttpBody for SentSignal {
    type Data = Bytes;
    type Error = axum::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Bytes>, axum::Error>>> {
        let this = self.get_mut();
        let polled = Pin::new(&mut this.inner).poll_frame(cx);
        if matches!(polled, Poll::Ready(None)) || this.inner.is_end_stream() {
            this.sent.notify_one();
        }
        polled
    }

    fn is_end_stream(&self) -> bool {
        let end = self.inner.is_end_stream();
        if end {
            self.sent.notify_one();
        }
        end
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}

fn build_client(connector: UpstreamConnector, idle: Duration, max_idle: usize) -> UpstreamClient {
    Client::builder(TokioExecutor::new())
        .pool_idle_timeout(idle)
        .pool_max_idle_per_host(max_idle)
        .build(connector)
}

/// Remove hop-by-hop headers, including any named by `Connection`.
pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let listed: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();

    for name in listed.iter().chain(HOP_BY_HOP.iter()) {
        headers.remove(name);
    }
}

/// Append `client_ip` to the forwarding chain unless it is already an entry.
pub fn append_forwarded_for(headers: &mut HeaderMap, client_ip: &str) {
    let chain = headers
        .get_all(X_FORWARDED_FOR)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .collect::<Vec<_>>()
        .join(", ");

    let value = if chain.is_empty() {
        client_ip.to_string()
    } else if chain.split(',').any(|entry| entry.trim() == client_ip) {
        chain
    } else {
        format!("{}, {}", chain, client_ip)
    };

    if let Ok(value) = HeaderValue::from_str(&value) {
        headers.insert(X_FORWARDED_FOR, value);
    }
}

/// Drop a trailing `:port` from a Host value, keeping IPv6 brackets.
pub fn strip_port(host: &str) -> &str {
    let host = host.trim();
    if host.starts_with('[') {
        return match host.find(']') {
            Some(end) => &host[..=end],
            None => host,
        };
    }
    match host.rsplit_once(':') {
        Some((name, port)) if !name.contains(':') && port.chars().all(|c| c.is_ascii_digit()) => name,
        _ => host,
    }
}
