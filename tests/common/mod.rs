//! Shared utilities for integration testing.

#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    extract::Query,
    http::{HeaderMap, Method, StatusCode, Uri},
    routing::get,
    Json, Router,
};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::fs::File;
use std::future::Future;
use std::io::BufReader;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;

use origin_gate::config::GateConfig;
use origin_gate::lifecycle::Shutdown;
use origin_gate::observability::{PrometheusMetrics, TrafficMetrics};
use origin_gate::origin::{OriginError, OriginLookup, OriginMetadata};
use origin_gate::rules::{RuleStore, RuleStoreError};
use origin_gate::GatewayServer;

/// Start an upstream that echoes what it received as JSON.
///
/// Returns the address and a counter of requests served.
pub async fn start_echo_upstream() -> (SocketAddr, Arc<AtomicUsize>) {
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = hits.clone();
    let app = Router::new().fallback(move |method: Method, uri: Uri, headers: HeaderMap| {
        let counter = counter.clone();
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            let headers: HashMap<String, String> = headers
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_str().unwrap_or("").to_string()))
                .collect();
            Json(json!({
                "method": method.to_string(),
                "uri": uri.to_string(),
                "headers": headers,
            }))
        }
    });
    (serve(app).await, hits)
}

/// Start a programmable upstream speaking raw HTTP/1.1.
///
/// `f` returns the status line, extra header lines and body for each request.
pub async fn start_programmable_upstream<F, Fut>(f: F) -> SocketAddr
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = (&'static str, Vec<String>, String)> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let f = Arc::new(f);

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let f = f.clone();
            tokio::spawn(async move {
                read_request_head(&mut socket).await;
                let (status, headers, body) = f().await;
                let mut response = format!("HTTP/1.1 {}\r\n", status);
                for line in headers {
                    response.push_str(&line);
                    response.push_str("\r\n");
                }
                response.push_str(&format!(
                    "Content-Length: {}\r\nConnection: close\r\n\r\n{}",
                    body.len(),
                    body
                ));
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });
    addr
}

/// Start an upstream that sends a chunked body in two parts, `gap` apart.
pub async fn start_streaming_upstream(first: &'static str, second: &'static str, gap: Duration) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                read_request_head(&mut socket).await;
                let head = "HTTP/1.1 200 OK\r\nContent-Type: text/event-stream\r\nTransfer-Encoding: chunked\r\nConnection: close\r\n\r\n";
                let _ = socket.write_all(head.as_bytes()).await;
                let _ = socket
                    .write_all(format!("{:x}\r\n{}\r\n", first.len(), first).as_bytes())
                    .await;
                let _ = socket.flush().await;
                tokio::time::sleep(gap).await;
                let _ = socket
                    .write_all(format!("{:x}\r\n{}\r\n0\r\n\r\n", second.len(), second).as_bytes())
                    .await;
                let _ = socket.shutdown().await;
            });
        }
    });
    addr
}

async fn read_request_head(socket: &mut tokio::net::TcpStream) {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
        match socket.read(&mut chunk).await {
            Ok(0) | Err(_) => return,
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
        }
    }
}

/// Start a mock origin-metadata service answering `GET /lookup?ip=`.
///
/// Unknown addresses get 404.
pub async fn start_mock_origin(entries: HashMap<String, Value>) -> SocketAddr {
    let entries = Arc::new(entries);
    let app = Router::new().route(
        "/lookup",
        get(move |Query(params): Query<HashMap<String, String>>| {
            let entries = entries.clone();
            async move {
                let ip = params.get("ip").cloned().unwrap_or_default();
                match entries.get(&ip) {
                    Some(body) => Ok(Json(body.clone())),
                    None => Err(StatusCode::NOT_FOUND),
                }
            }
        }),
    );
    serve(app).await
}

async fn serve(app: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

/// Path of a file under `tests/fixtures`.
pub fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(name)
}

fn fixture_server_config() -> rustls::ServerConfig {
    let certs = rustls_pemfile::certs(&mut BufReader::new(File::open(fixture("localhost.pem")).unwrap()))
        .collect::<Result<Vec<_>, _>>()
        .unwrap();
    let key = rustls_pemfile::private_key(&mut BufReader::new(File::open(fixture("localhost.key")).unwrap()))
        .unwrap()
        .unwrap();
    let mut config = rustls::ServerConfig::builder_with_provider(Arc::new(rustls::crypto::ring::default_provider()))
        .with_safe_default_protocol_versions()
        .unwrap()
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .unwrap();
    config.alpn_protocols = vec![b"http/1.1".to_vec()];
    config
}

/// Server names seen in ClientHello messages, one entry per TLS session.
pub type SeenNames = Arc<Mutex<Vec<Option<String>>>>;

/// Start an HTTPS upstream with the fixture certificate.
///
/// Each response body is `<sni>|<host>|<x-forwarded-proto>`, where `sni` is
/// the server name of the TLS session that carried the request.
pub async fn start_tls_upstream() -> (SocketAddr, SeenNames) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let acceptor = TlsAcceptor::from(Arc::new(fixture_server_config()));
    let seen: SeenNames = Arc::new(Mutex::new(Vec::new()));
    let record = seen.clone();

    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            let acceptor = acceptor.clone();
            let record = record.clone();
            tokio::spawn(async move {
                let Ok(stream) = acceptor.accept(socket).await else {
                    return;
                };
                let sni = stream.get_ref().1.server_name().map(str::to_string);
                record.lock().unwrap().push(sni.clone());

                let service = hyper::service::service_fn(move |request: hyper::Request<hyper::body::Incoming>| {
                    let header = |name: &str| {
                        request
                            .headers()
                            .get(name)
                            .and_then(|v| v.to_str().ok())
                            .unwrap_or("")
                            .to_string()
                    };
                    let body = format!(
                        "{}|{}|{}",
                        sni.clone().unwrap_or_default(),
                        header("host"),
                        header("x-forwarded-proto")
                    );
                    async move { Ok::<_, std::convert::Infallible>(hyper::Response::new(body)) }
                });
                let _ = hyper::server::conn::http1::Builder::new()
                    .serve_connection(hyper_util::rt::TokioIo::new(stream), service)
                    .await;
            });
        }
    });
    (addr, seen)
}

/// An address nothing listens on.
pub fn closed_addr() -> SocketAddr {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap()
}

/// Origin lookup returning the same metadata for every address.
pub struct FixedOrigin(pub Option<OriginMetadata>);

#[async_trait]
impl OriginLookup for FixedOrigin {
    async fn lookup(&self, _ip: &str) -> Result<Option<OriginMetadata>, OriginError> {
        Ok(self.0.clone())
    }
}

/// Origin lookup that never answers.
pub struct HangingOrigin;

#[async_trait]
impl OriginLookup for HangingOrigin {
    async fn lookup(&self, _ip: &str) -> Result<Option<OriginMetadata>, OriginError> {
        std::future::pending().await
    }
}

/// Rule store whose every command fails.
pub struct BrokenStore;

#[async_trait]
impl RuleStore for BrokenStore {
    async fn get(&self, _key: &str) -> Result<Option<String>, RuleStoreError> {
        Err(RuleStoreError::Command(redis::RedisError::from((
            redis::ErrorKind::IoError,
            "connection reset",
        ))))
    }
}

/// Default test configuration pointing at `upstream`.
pub fn gate_config(upstream: SocketAddr) -> GateConfig {
    let mut config = GateConfig::default();
    config.listener.bind_address = "127.0.0.1:0".to_string();
    config.upstream.base_url = format!("http://{}", upstream);
    config.origin.timeout_ms = 200;
    config.rule_store.timeout_ms = 200;
    config.timeouts.connect_secs = 1;
    config.timeouts.response_header_secs = 2;
    config
}

/// A running gateway; dropping it stops the server.
pub struct TestGateway {
    pub addr: SocketAddr,
    pub metrics: Arc<PrometheusMetrics>,
    tls: bool,
    shutdown: Shutdown,
}

impl TestGateway {
    pub fn url(&self, path: &str) -> String {
        let scheme = if self.tls { "https" } else { "http" };
        format!("{}://{}{}", scheme, self.addr, path)
    }

    pub fn metrics_text(&self) -> String {
        self.metrics.render()
    }
}

impl Drop for TestGateway {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}

/// Run a gateway in-process on an ephemeral port.
pub async fn spawn_gateway(
    config: GateConfig,
    origin: Arc<dyn OriginLookup>,
    store: Arc<dyn RuleStore>,
) -> TestGateway {
    let tls = config.listener.tls.is_some();
    let metrics = Arc::new(PrometheusMetrics::new());
    let server = GatewayServer::from_parts(config, origin, store, metrics.clone()).unwrap();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = Shutdown::new();
    let rx = shutdown.subscribe();
    tokio::spawn(async move {
        server.run(listener, rx).await.unwrap();
    });

    TestGateway {
        addr,
        metrics,
        tls,
        shutdown,
    }
}

/// HTTP client that never follows redirects.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .no_proxy()
        .build()
        .unwrap()
}

/// HTTP client for a gateway serving the self-signed fixture certificate.
pub fn tls_client() -> reqwest::Client {
    reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .danger_accept_invalid_certs(true)
        .no_proxy()
        .build()
        .unwrap()
}
