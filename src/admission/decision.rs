//! Admission decision engine.
//!
//! # Responsibilities
//! - Map a client IP to a stable bucket in [0, 99]
//! - Decide Allow/Drop from the resolved rule and the bucket
//!
//! # Design Decisions
//! - 32-bit FNV-1a over the IP string: deterministic across processes and
//!   hosts, so repeated requests from one source get the same outcome
//! - Pure functions: no I/O, no shared state, safe to call concurrently

use crate::rules::Rule;

const FNV_OFFSET_BASIS: u32 = 0x811c_9dc5;
const FNV_PRIME: u32 = 0x0100_0193;

/// Number of buckets; a rule's `drop_percent` selects the lower buckets.
pub const BUCKETS: u32 = 100;

/// 32-bit FNV-1a hash.
pub const fn fnv1a32(bytes: &[u8]) -> u32 {
    let mut hash = FNV_OFFSET_BASIS;
    let mut i = 0;
    while i < bytes.len() {
        hash ^= bytes[i] as u32;
        hash = hash.wrapping_mul(FNV_PRIME);
        i += 1;
    }
    hash
}

/// Bucket of a client IP, always in [0, 99].
pub fn hash_bucket(client_ip: &str) -> u8 {
    (fnv1a32(client_ip.as_bytes()) % BUCKETS) as u8
}

/// What happens to the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Allow,
    Drop,
}

/// Pipeline stage whose failure forced an Allow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Origin,
    RuleStore,
    RuleDecode,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Origin => "origin",
            Stage::RuleStore => "rule_store",
            Stage::RuleDecode => "rule_decode",
        }
    }
}

/// Why a decision was reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reason {
    NoRule,
    RuleDisabled,
    /// Bucket is at or above the rule's threshold.
    Admitted,
    /// Bucket is below the rule's threshold.
    Shed,
    FailOpen(Stage),
}

/// Outcome plus the evidence used for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    pub action: Action,
    pub reason: Reason,
    /// Bucket computed for the client, when a rule was evaluated.
    pub bucket: Option<u8>,
}

impl Decision {
    pub fn allow(reason: Reason) -> Self {
        Self {
            action: Action::Allow,
            reason,
            bucket: None,
        }
    }

    pub fn fail_open(stage: Stage) -> Self {
        Self::allow(Reason::FailOpen(stage))
    }

    pub fn is_drop(&self) -> bool {
        self.action == Action::Drop
    }
}

/// Decide for `client_ip` given the resolved rule, if any.
pub fn decide(rule: Option<&Rule>, client_ip: &str) -> Decision {
    let rule = match rule {
        None => return Decision::allow(Reason::NoRule),
        Some(rule) if !rule.enabled => return Decision::allow(Reason::RuleDisabled),
        Some(rule) => rule,
    };

    let bucket = hash_bucket(client_ip);
    let (action, reason) = if bucket < rule.threshold() {
        (Action::Drop, Reason::Shed)
    } else {
        (Action::Allow, Reason::Admitted)
    };

    Decision {
        action,
        reason,
        bucket: Some(bucket),
    }
}
