//! Per-request admission pipeline.
//!
//! ```text
//! client IP → origin lookup → candidate keys → rule lookup → decide → record
//! ```
//!
//! Failures in the origin or rule stages never reach the caller: they are
//! logged, counted, and turned into an Allow so that losing the admission
//! subsystem cannot take the protected service down.

use std::sync::Arc;
use std::time::Duration;

use crate::admission::decision::{decide, Decision, Stage};
use crate::observability::metrics::TrafficMetrics;
use crate::origin::{OriginError, OriginLookup, OriginMetadata};
use crate::rules::{keys_for, LookupError, RuleKey, RuleLookup};

/// Result of evaluating one request.
#[derive(Debug, Clone)]
pub struct Verdict {
    pub decision: Decision,
    /// Normalized origin; empty when unknown or the lookup failed.
    pub origin: OriginMetadata,
    pub matched_key: Option<RuleKey>,
}

/// The admission pipeline shared by all in-flight requests.
#[derive(Clone)]
pub struct AdmissionGate {
    origin: Arc<dyn OriginLookup>,
    rules: RuleLookup,
    metrics: Arc<dyn TrafficMetrics>,
    origin_budget: Duration,
}

impl AdmissionGate {
    pub fn new(
        origin: Arc<dyn OriginLookup>,
        rules: RuleLookup,
        metrics: Arc<dyn TrafficMetrics>,
        origin_budget: Duration,
    ) -> Self {
        Self {
            origin,
            rules,
            metrics,
            origin_budget,
        }
    }

    pub fn metrics(&self) -> &Arc<dyn TrafficMetrics> {
        &self.metrics
    }

    /// Evaluate a request from `client_ip` and record it.
    pub async fn evaluate(&self, client_ip: &str) -> Verdict {
        let verdict = self.assess(client_ip).await;

        self.metrics.record_request(&verdict.origin);
        if verdict.decision.is_drop() {
            self.metrics.record_drop(&verdict.origin);
        }
        verdict
    }

    async fn assess(&self, client_ip: &str) -> Verdict {
        // 1. Origin
        let origin = match self.resolve_origin(client_ip).await {
            Ok(Some(origin)) => origin,
            Ok(None) => OriginMetadata::default(),
            Err(e) => {
                return self.fail_open(client_ip, Stage::Origin, &e, OriginMetadata::default());
            }
        };

        // 2. Candidate keys
        let keys = keys_for(&origin);
        tracing::debug!(
            client_ip = %client_ip,
            asn = %origin.asn,
            country = %origin.country,
            tsp = %origin.tsp,
            keys = ?keys.iter().map(ToString::to_string).collect::<Vec<_>>(),
            "Evaluating rule keys"
        );

        // 3. Rule lookup
        let matched = match self.rules.resolve(&keys).await {
            Ok(matched) => matched,
            Err(e) => {
                let stage = match e {
                    LookupError::Decode { .. } => Stage::RuleDecode,
                    LookupError::Store { .. } | LookupError::Timeout(_) => Stage::RuleStore,
                };
                return self.fail_open(client_ip, stage, &e, origin);
            }
        };

        // 4. Decide
        let decision = decide(matched.as_ref().map(|m| &m.rule), client_ip);
        let matched_key = matched.map(|m| {
            tracing::debug!(
                client_ip = %client_ip,
                key = %m.key,
                drop_percent = m.rule.drop_percent,
                enabled = m.rule.enabled,
                bucket = ?decision.bucket,
                action = ?decision.action,
                "Rule evaluated"
            );
            m.key
        });

        if decision.is_drop() {
            tracing::info!(
                client_ip = %client_ip,
                key = %matched_key.as_ref().map(ToString::to_string).unwrap_or_default(),
                bucket = ?decision.bucket,
                asn = %origin.asn,
                country = %origin.country,
                tsp = %origin.tsp,
                "Request dropped"
            );
        }

        Verdict {
            decision,
            origin,
            matched_key,
        }
    }

    async fn resolve_origin(&self, client_ip: &str) -> Result<Option<OriginMetadata>, OriginError> {
        match tokio::time::timeout(self.origin_budget, self.origin.lookup(client_ip)).await {
            Ok(result) => result,
            Err(_) => Err(OriginError::Timeout(self.origin_budget)),
        }
    }

    fn fail_open(
        &self,
        client_ip: &str,
        stage: Stage,
        error: &dyn std::error::Error,
        origin: OriginMetadata,
    ) -> Verdict {
        tracing::warn!(
            client_ip = %client_ip,
            stage = stage.as_str(),
            error = %error,
            "Admission lookup failed, allowing request (fail-open)"
        );
        self.metrics.record_fail_open(stage.as_str());

        Verdict {
            decision: Decision::fail_open(stage),
            origin,
            matched_key: None,
        }
    }
}
