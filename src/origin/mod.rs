//! Origin metadata subsystem.
//!
//! # Data Flow
//! ```text
//! client IP
//!     → resolver.rs (GET <endpoint>?ip=<address>)
//!     → raw {asn, country, tsp, city}
//!     → OriginMetadata::normalized (trim, "-" → empty, casing)
//!     → rule key generation
//! ```
//!
//! # Design Decisions
//! - "No data for this address" is `Ok(None)`, never an error
//! - Every `OriginError` is fail-open for the caller
//! - Metadata lives for one request and is never persisted

pub mod resolver;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

pub use resolver::HttpOriginResolver;

/// Placeholder emitted by upstream data sources for unknown fields.
const PLACEHOLDER: &str = "-";

/// Network origin attributes for one client address.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OriginMetadata {
    /// Autonomous system number, `AS<digits>` or empty.
    pub asn: String,
    /// Upper-case ISO country code or empty.
    pub country: String,
    /// Lower-case transit service provider name or empty.
    pub tsp: String,
    /// City name; informational, not part of rule keys.
    pub city: String,
}

impl OriginMetadata {
    /// Build metadata from raw collaborator fields, enforcing the field invariants.
    pub fn normalized(asn: &str, country: &str, tsp: &str, city: &str) -> Self {
        Self {
            asn: normalize_asn(asn),
            country: normalize_country(country),
            tsp: clean_field(tsp).to_lowercase(),
            city: clean_field(city).to_string(),
        }
    }

    /// True when no field carries usable data.
    pub fn is_empty(&self) -> bool {
        self.asn.is_empty() && self.country.is_empty() && self.tsp.is_empty()
    }
}

/// Trim whitespace and map the placeholder value to empty.
fn clean_field(raw: &str) -> &str {
    let trimmed = raw.trim();
    if trimmed == PLACEHOLDER {
        ""
    } else {
        trimmed
    }
}

/// Accepts `AS123`, `as123` and bare `123`; anything else becomes empty.
fn normalize_asn(raw: &str) -> String {
    let cleaned = clean_field(raw).to_ascii_uppercase();
    let digits = cleaned.strip_prefix("AS").unwrap_or(&cleaned);
    if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) {
        format!("AS{}", digits)
    } else {
        if !cleaned.is_empty() {
            tracing::debug!(asn = %cleaned, "Discarding malformed ASN");
        }
        String::new()
    }
}

fn normalize_country(raw: &str) -> String {
    let cleaned = clean_field(raw).to_ascii_uppercase();
    if cleaned.len() == 2 && cleaned.bytes().all(|b| b.is_ascii_alphabetic()) {
        cleaned
    } else {
        if !cleaned.is_empty() {
            tracing::debug!(country = %cleaned, "Discarding malformed country code");
        }
        String::new()
    }
}

/// Errors raised while calling the origin-metadata collaborator.
#[derive(Debug, Error)]
pub enum OriginError {
    /// Connection or protocol failure.
    #[error("origin lookup transport error: {0}")]
    Transport(#[source] reqwest::Error),

    /// Any status other than 200 or 404.
    #[error("origin lookup returned status {0}")]
    Status(u16),

    /// Response body was not a metadata record.
    #[error("origin lookup returned malformed body: {0}")]
    Decode(#[source] reqwest::Error),

    /// Lookup exceeded its budget.
    #[error("origin lookup timed out after {0:?}")]
    Timeout(Duration),
}

/// Resolves a client address to its network origin.
#[async_trait]
pub trait OriginLookup: Send + Sync {
    /// Returns `Ok(None)` when the collaborator has no data for `ip`.
    async fn lookup(&self, ip: &str) -> Result<Option<OriginMetadata>, OriginError>;
}
