//! Cascading rule lookup.
//!
//! Queries the store for each candidate key in order and returns the first
//! present rule. A missing key moves on to the next candidate; anything else
//! (transport failure, timeout, undecodable value) ends the lookup with an
//! error so the caller can fail open.

use serde::de::Unexpected;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::rules::key::RuleKey;
use crate::rules::store::{RuleStore, RuleStoreError};

/// Admission rule as stored by the administration layer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Rule {
    pub asn: String,
    pub country: String,
    pub tsp: String,
    /// Share of client buckets to drop, 0..=100.
    pub drop_percent: i64,
    /// Expiry in seconds, managed by the administration layer.
    pub ttl: Option<i64>,
    pub enabled: bool,
}

impl Rule {
    /// Decode a stored value, clamping `drop_percent` into [0, 100].
    ///
    /// Only a JSON object is a rule; arrays and scalars are rejected.
    pub fn decode(raw: &str) -> Result<Self, serde_json::Error> {
        let value: Value = serde_json::from_str(raw)?;
        if !value.is_object() {
            return Err(serde::de::Error::invalid_type(
                unexpected(&value),
                &"a rule object",
            ));
        }
        let mut rule: Rule = serde_json::from_value(value)?;
        if !(0..=100).contains(&rule.drop_percent) {
            tracing::warn!(
                drop_percent = rule.drop_percent,
                "Rule drop_percent out of range, clamping"
            );
            rule.drop_percent = rule.drop_percent.clamp(0, 100);
        }
        Ok(rule)
    }

    /// Drop share as a bucket threshold.
    pub fn threshold(&self) -> u8 {
        self.drop_percent.clamp(0, 100) as u8
    }
}

fn unexpected(value: &Value) -> Unexpected<'_> {
    match value {
        Value::Null => Unexpected::Unit,
        Value::Bool(b) => Unexpected::Bool(*b),
        Value::Number(_) => Unexpected::Other("number"),
        Value::String(s) => Unexpected::Str(s),
        Value::Array(_) => Unexpected::Seq,
        Value::Object(_) => Unexpected::Map,
    }
}

/// A rule together with the key it was found under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchedRule {
    pub key: RuleKey,
    pub rule: Rule,
}

/// Failures that abort the cascade.
#[derive(Debug, Error)]
pub enum LookupError {
    #[error("rule store error at {key}: {source}")]
    Store {
        key: String,
        #[source]
        source: RuleStoreError,
    },

    #[error("corrupt rule at {key}: {source}")]
    Decode {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("rule lookup timed out after {0:?}")]
    Timeout(Duration),
}

/// First-hit lookup over an ordered key list.
#[derive(Clone)]
pub struct RuleLookup {
    store: Arc<dyn RuleStore>,
    budget: Duration,
}

impl RuleLookup {
    /// `budget` bounds the whole cascade, not each key.
    pub fn new(store: Arc<dyn RuleStore>, budget: Duration) -> Self {
        Self { store, budget }
    }

    /// Resolve the most specific rule among `keys`.
    pub async fn resolve(&self, keys: &[RuleKey]) -> Result<Option<MatchedRule>, LookupError> {
        match tokio::time::timeout(self.budget, self.cascade(keys)).await {
            Ok(result) => result,
            Err(_) => Err(LookupError::Timeout(self.budget)),
        }
    }

    async fn cascade(&self, keys: &[RuleKey]) -> Result<Option<MatchedRule>, LookupError> {
        for key in keys {
            let rendered = key.to_string();
            let raw = match self.store.get(&rendered).await {
                Ok(Some(raw)) => raw,
                Ok(None) => continue,
                Err(source) => {
                    return Err(LookupError::Store {
                        key: rendered,
                        source,
                    })
                }
            };

            let rule = Rule::decode(&raw).map_err(|source| LookupError::Decode {
                key: rendered.clone(),
                source,
            })?;

            tracing::debug!(key = %rendered, "Rule matched");
            return Ok(Some(MatchedRule {
                key: key.clone(),
                rule,
            }));
        }
        Ok(None)
    }
}
