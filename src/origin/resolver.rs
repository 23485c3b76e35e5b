//! HTTP client for the origin-metadata collaborator.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use std::time::Duration;

use crate::config::OriginConfig;
use crate::origin::{OriginError, OriginLookup, OriginMetadata};

/// Wire shape of a lookup response. Missing fields decode as empty.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct LookupBody {
    asn: String,
    country: String,
    tsp: String,
    city: String,
}

/// Resolves origins through `GET <endpoint>?ip=<address>`.
///
/// The inner `reqwest::Client` keeps a connection pool that is shared by all
/// in-flight requests.
#[derive(Clone)]
pub struct HttpOriginResolver {
    client: reqwest::Client,
    endpoint: String,
    timeout: Duration,
}

impl HttpOriginResolver {
    /// Create a resolver from configuration.
    pub fn new(config: &OriginConfig) -> Result<Self, reqwest::Error> {
        let timeout = Duration::from_millis(config.timeout_ms);
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .pool_idle_timeout(Duration::from_secs(90))
            .redirect(reqwest::redirect::Policy::none())
            .no_proxy()
            .build()?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            timeout,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl OriginLookup for HttpOriginResolver {
    async fn lookup(&self, ip: &str) -> Result<Option<OriginMetadata>, OriginError> {
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[("ip", ip)])
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    OriginError::Timeout(self.timeout)
                } else {
                    OriginError::Transport(e)
                }
            })?;

        match response.status() {
            StatusCode::OK => {}
            StatusCode::NOT_FOUND => {
                tracing::debug!(client_ip = %ip, "No origin data for address");
                return Ok(None);
            }
            other => return Err(OriginError::Status(other.as_u16())),
        }

        let body: LookupBody = response.json().await.map_err(|e| {
            if e.is_timeout() {
                OriginError::Timeout(self.timeout)
            } else {
                OriginError::Decode(e)
            }
        })?;

        Ok(Some(OriginMetadata::normalized(
            &body.asn,
            &body.country,
            &body.tsp,
            &body.city,
        )))
    }
}
