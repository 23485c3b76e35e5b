//! HTTP server setup and request dispatch.
//!
//! # Responsibilities
//! - Build the component graph (origin resolver, rule lookup, metrics, forwarder)
//! - Create the axum Router: health and metrics locally, everything else admitted
//! - Wire up middleware (request id, tracing)
//! - Serve plain HTTP or TLS until shutdown, then drain
//!
//! # Design Decisions
//! - Collaborators are trait objects so tests can inject failures
//! - Only upstream failures reach the caller as errors (502)

use axum::{
    body::Body,
    extract::State,
    http::{header, Request},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::request_id::{PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

use crate::admission::AdmissionGate;
use crate::config::GateConfig;
use crate::http::client_ip::client_ip;
use crate::http::forward::{ForwardContext, ForwardError, Forwarder};
use crate::http::request_id::{RequestSpan, UuidRequestId, X_REQUEST_ID};
use crate::http::response::{HealthStatus, Rejection};
use crate::lifecycle::shutdown::recv_shutdown;
use crate::net::load_tls_config;
use crate::observability::{PrometheusMetrics, TrafficMetrics};
use crate::origin::{HttpOriginResolver, OriginLookup};
use crate::rules::{RedisRuleStore, RuleLookup, RuleStore, RuleStoreError};

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("origin resolver: {0}")]
    Origin(#[from] reqwest::Error),

    #[error("rule store: {0}")]
    RuleStore(#[from] RuleStoreError),

    #[error("forwarder: {0}")]
    Forwarder(#[from] ForwardError),

    #[error("listener: {0}")]
    Io(#[from] std::io::Error),
}

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub gate: AdmissionGate,
    pub forwarder: Arc<Forwarder>,
    pub inbound_tls: bool,
    pub started: Instant,
}

/// The origin gate HTTP server.
pub struct GatewayServer {
    config: Arc<GateConfig>,
    state: AppState,
}

impl GatewayServer {
    /// Build the gateway with its production collaborators.
    ///
    /// The rule store connects lazily, so an unreachable store does not
    /// prevent startup.
    pub fn new(config: GateConfig) -> Result<Self, StartupError> {
        let origin = Arc::new(HttpOriginResolver::new(&config.origin)?);
        let store = Arc::new(RedisRuleStore::new(&config.rule_store.address)?);
        let metrics = Arc::new(PrometheusMetrics::new());
        Self::from_parts(config, origin, store, metrics)
    }

    /// Build the gateway around caller-supplied collaborators.
    pub fn from_parts(
        config: GateConfig,
        origin: Arc<dyn OriginLookup>,
        store: Arc<dyn RuleStore>,
        metrics: Arc<dyn TrafficMetrics>,
    ) -> Result<Self, StartupError> {
        let rules = RuleLookup::new(store, config.rule_store.timeout());
        let gate = AdmissionGate::new(origin, rules, metrics, config.origin.timeout());
        let forwarder = Arc::new(Forwarder::new(&config.upstream, &config.timeouts)?);

        let state = AppState {
            gate,
            forwarder,
            inbound_tls: config.listener.tls.is_some(),
            started: Instant::now(),
        };

        Ok(Self {
            config: Arc::new(config),
            state,
        })
    }

    pub fn config(&self) -> &GateConfig {
        &self.config
    }

    /// Build the router with all middleware layers.
    pub fn router(&self) -> Router {
        let obs = &self.config.observability;
        Router::new()
            .route(&obs.health_path, get(health_handler))
            .route(&obs.metrics_path, get(metrics_handler))
            .fallback(admit)
            .with_state(self.state.clone())
            .layer(TraceLayer::new_for_http().make_span_with(RequestSpan))
            .layer(PropagateRequestIdLayer::new(X_REQUEST_ID))
            .layer(SetRequestIdLayer::new(X_REQUEST_ID, UuidRequestId))
    }

    /// Serve on `listener` until `shutdown` fires, then drain in-flight requests.
    pub async fn run(
        self,
        listener: TcpListener,
        shutdown: broadcast::Receiver<()>,
    ) -> Result<(), StartupError> {
        let addr = listener.local_addr()?;
        let app = self
            .router()
            .into_make_service_with_connect_info::<SocketAddr>();

        match &self.config.listener.tls {
            Some(tls) => {
                let rustls =
                    load_tls_config(Path::new(&tls.cert_path), Path::new(&tls.key_path)).await?;
                let grace = Duration::from_secs(self.config.listener.shutdown_grace_secs);
                let handle = axum_server::Handle::new();

                let drain = handle.clone();
                tokio::spawn(async move {
                    recv_shutdown(shutdown).await;
                    drain.graceful_shutdown(Some(grace));
                });

                tracing::info!(address = %addr, tls = true, "Origin gate listening");
                axum_server::from_tcp_rustls(listener.into_std()?, rustls)
                    .handle(handle)
                    .serve(app)
                    .await?;
            }
            None => {
                tracing::info!(address = %addr, tls = false, "Origin gate listening");
                axum::serve(listener, app)
                    .with_graceful_shutdown(recv_shutdown(shutdown))
                    .await?;
            }
        }

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthStatus> {
    Json(HealthStatus::ok(state.started.elapsed().as_secs()))
}

async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.gate.metrics().render(),
    )
}

/// Evaluate and, if admitted, forward every non-local request.
async fn admit(State(state): State<AppState>, request: Request<Body>) -> Response {
    // 1. Client address
    let Some(ip) = client_ip(&request) else {
        tracing::debug!(uri = %request.uri(), "Rejecting request without client address");
        return Rejection::MissingClientAddress.into_response();
    };

    // 2. Admission
    let verdict = state.gate.evaluate(&ip).await;
    if verdict.decision.is_drop() {
        return Rejection::Blocked.into_response();
    }

    // 3. Forward
    let host = request
        .headers()
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .or_else(|| request.uri().authority().map(|a| a.to_string()));
    let ctx = ForwardContext {
        client_ip: ip,
        host,
        inbound_tls: state.inbound_tls,
    };

    match state.forwarder.forward(request, &ctx).await {
        Ok(response) => response,
        Err(e) => {
            tracing::error!(client_ip = %ctx.client_ip, error = %e, "Upstream exchange failed");
            state.gate.metrics().record_upstream_error();
            Rejection::UpstreamUnavailable.into_response()
        }
    }
}
