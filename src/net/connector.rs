//! Upstream connector with an explicit TLS server name.
//!
//! `hyper-util`'s pooled client asks the connector for a transport whenever
//! it has no idle connection for an authority. The connector dials TCP and,
//! for `https` targets, completes a TLS handshake advertising the server name
//! it was constructed with. One connector (and therefore one pool) exists per
//! server name, so a pooled connection is never reused under a different SNI.

use hyper::rt::{Read, ReadBufCursor, Write};
use hyper::Uri;
use hyper_util::client::legacy::connect::{Connected, Connection};
use hyper_util::rt::TokioIo;
use rustls::pki_types::ServerName;
use rustls::ClientConfig;
use std::future::Future;
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;
use tokio_rustls::TlsConnector;

#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("upstream URI has no host: {0}")]
    MissingHost(Uri),

    #[error("https upstream requested but TLS is not configured")]
    TlsUnavailable,

    #[error("invalid TLS server name '{0}'")]
    InvalidServerName(String),

    #[error("connect to {addr} timed out after {timeout:?}")]
    ConnectTimeout { addr: String, timeout: Duration },

    #[error("connect to {addr} failed: {source}")]
    Connect {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("TLS handshake with {addr} (SNI {server_name}) timed out after {timeout:?}")]
    HandshakeTimeout {
        addr: String,
        server_name: String,
        timeout: Duration,
    },

    #[error("TLS handshake with {addr} (SNI {server_name}) failed: {source}")]
    Handshake {
        addr: String,
        server_name: String,
        #[source]
        source: io::Error,
    },
}

/// Dial settings shared by every connector.
#[derive(Debug, Clone)]
pub struct DialConfig {
    pub connect_timeout: Duration,
    pub tls_handshake_timeout: Duration,
    pub keepalive: Option<Duration>,
}

/// Connector used by the upstream client pools.
#[derive(Clone)]
pub struct UpstreamConnector {
    dial: DialConfig,
    tls: Option<Arc<ClientConfig>>,
    /// SNI to advertise; falls back to the target host when unset.
    server_name: Option<String>,
}

impl UpstreamConnector {
    pub fn new(dial: DialConfig, tls: Option<Arc<ClientConfig>>, server_name: Option<String>) -> Self {
        Self {
            dial,
            tls,
            server_name,
        }
    }

    pub fn server_name(&self) -> Option<&str> {
        self.server_name.as_deref()
    }

    async fn connect(self, dst: Uri) -> Result<UpstreamIo, ConnectError> {
        let host = dst
            .host()
            .map(|h| h.trim_start_matches('[').trim_end_matches(']').to_string())
            .ok_or_else(|| ConnectError::MissingHost(dst.clone()))?;
        let is_https = dst.scheme_str() == Some("https");
        let port = dst.port_u16().unwrap_or(if is_https { 443 } else { 80 });
        let addr = format!("{}:{}", host, port);

        let tcp = tokio::time::timeout(self.dial.connect_timeout, TcpStream::connect((host.as_str(), port)))
            .await
            .map_err(|_| ConnectError::ConnectTimeout {
                addr: addr.clone(),
                timeout: self.dial.connect_timeout,
            })?
            .map_err(|source| ConnectError::Connect {
                addr: addr.clone(),
                source,
            })?;
        let _ = tcp.set_nodelay(true);
        if let Some(keepalive) = self.dial.keepalive {
            if let Err(e) = set_keepalive(&tcp, keepalive) {
                tracing::debug!(addr = %addr, error = %e, "Failed to enable TCP keepalive");
            }
        }

        if !is_https {
            return Ok(UpstreamIo::Plain(TokioIo::new(tcp)));
        }

        let tls = self.tls.clone().ok_or(ConnectError::TlsUnavailable)?;
        let name = self.server_name.clone().unwrap_or(host);
        let server_name = ServerName::try_from(name.clone())
            .map_err(|_| ConnectError::InvalidServerName(name.clone()))?;

        let stream = tokio::time::timeout(
            self.dial.tls_handshake_timeout,
            TlsConnector::from(tls).connect(server_name, tcp),
        )
        .await
        .map_err(|_| ConnectError::HandshakeTimeout {
            addr: addr.clone(),
            server_name: name.clone(),
            timeout: self.dial.tls_handshake_timeout,
        })?
        .map_err(|source| ConnectError::Handshake {
            addr: addr.clone(),
            server_name: name.clone(),
            source,
        })?;

        tracing::debug!(addr = %addr, sni = %name, "Upstream TLS session established");
        Ok(UpstreamIo::Tls(TokioIo::new(stream)))
    }
}

fn set_keepalive(tcp: &TcpStream, idle: Duration) -> io::Result<()> {
    socket2::SockRef::from(tcp).set_tcp_keepalive(&socket2::TcpKeepalive::new().with_time(idle))
}

impl tower::Service<Uri> for UpstreamConnector {
    type Response = UpstreamIo;
    type Error = ConnectError;
    type Future = Pin<Box<dyn Future<Output = Result<UpstreamIo, ConnectError>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, dst: Uri) -> Self::Future {
        Box::pin(self.clone().connect(dst))
    }
}

/// Transport handed to hyper: plain TCP or TLS over TCP.
pub enum UpstreamIo {
    Plain(TokioIo<TcpStream>),
    Tls(TokioIo<TlsStream<TcpStream>>),
}

impl Connection for UpstreamIo {
    fn connected(&self) -> Connected {
        Connected::new()
    }
}

impl Read for UpstreamIo {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: ReadBufCursor<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            UpstreamIo::Plain(io) => Pin::new(io).poll_read(cx, buf),
            UpstreamIo::Tls(io) => Pin::new(io).poll_read(cx, buf),
        }
    }
}

impl Write for UpstreamIo {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            UpstreamIo::Plain(io) => Pin::new(io).poll_write(cx, buf),
            UpstreamIo::Tls(io) => Pin::new(io).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            UpstreamIo::Plain(io) => Pin::new(io).poll_flush(cx),
            UpstreamIo::Tls(io) => Pin::new(io).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            UpstreamIo::Plain(io) => Pin::new(io).poll_shutdown(cx),
            UpstreamIo::Tls(io) => Pin::new(io).poll_shutdown(cx),
        }
    }
}
