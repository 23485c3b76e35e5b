//! Rule key generation.
//!
//! # Responsibilities
//! - Represent a (asn, country, tsp) key with wildcard positions
//! - Serialize keys to the canonical `rule:<ASN>:<COUNTRY>:<TSP>` form
//! - Enumerate candidate keys for an origin, most specific first
//!
//! # Design Decisions
//! - Specificity is encoded purely by enumeration order; no scoring
//! - ASN and TSP form a required pair: an ASN-scoped key is only generated
//!   when the TSP is also known
//! - The global key `rule:*:*:*` always terminates the cascade

use std::fmt;

use crate::origin::OriginMetadata;

/// Prefix shared by every rule key in the store.
pub const KEY_PREFIX: &str = "rule";

/// Marker for a wildcard position.
pub const WILDCARD: &str = "*";

/// One position-wise rule key. `None` is a wildcard.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct RuleKey {
    pub asn: Option<String>,
    pub country: Option<String>,
    pub tsp: Option<String>,
}

impl RuleKey {
    /// Build a key, normalizing casing. Empty strings and `*` become wildcards.
    pub fn new(asn: Option<&str>, country: Option<&str>, tsp: Option<&str>) -> Self {
        Self {
            asn: position(asn).map(str::to_ascii_uppercase),
            country: position(country).map(str::to_ascii_uppercase),
            tsp: position(tsp).map(str::to_lowercase),
        }
    }

    /// The key matching every origin.
    pub fn global() -> Self {
        Self::default()
    }

    pub fn is_global(&self) -> bool {
        self.asn.is_none() && self.country.is_none() && self.tsp.is_none()
    }

    /// Number of concrete (non-wildcard) positions.
    pub fn specificity(&self) -> usize {
        [&self.asn, &self.country, &self.tsp]
            .iter()
            .filter(|p| p.is_some())
            .count()
    }
}

fn position(value: Option<&str>) -> Option<&str> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty() && *v != WILDCARD)
}

impl fmt::Display for RuleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let part = |p: &Option<String>| p.clone().unwrap_or_else(|| WILDCARD.to_string());
        write!(
            f,
            "{}:{}:{}:{}",
            KEY_PREFIX,
            part(&self.asn),
            part(&self.country),
            part(&self.tsp)
        )
    }
}

/// Origin-specific candidate keys, most specific first, without the global key.
pub fn specific_keys(meta: &OriginMetadata) -> Vec<RuleKey> {
    let asn = non_empty(&meta.asn);
    let country = non_empty(&meta.country);
    let tsp = non_empty(&meta.tsp);

    match (asn, country, tsp) {
        (Some(asn), Some(country), Some(tsp)) => vec![
            RuleKey::new(Some(asn), Some(country), Some(tsp)),
            RuleKey::new(Some(asn), Some(country), None),
            RuleKey::new(Some(asn), None, Some(tsp)),
            RuleKey::new(Some(asn), None, None),
        ],
        (Some(asn), None, Some(tsp)) => vec![
            RuleKey::new(Some(asn), None, Some(tsp)),
            RuleKey::new(Some(asn), None, None),
        ],
        (_, Some(country), _) => vec![RuleKey::new(None, Some(country), None)],
        _ => Vec::new(),
    }
}

/// Full lookup cascade for an origin, terminated by the global key.
pub fn keys_for(meta: &OriginMetadata) -> Vec<RuleKey> {
    let mut keys = specific_keys(meta);
    keys.push(RuleKey::global());
    keys
}

fn non_empty(value: &str) -> Option<&str> {
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(asn: &str, country: &str, tsp: &str) -> OriginMetadata {
        OriginMetadata::normalized(asn, country, tsp, "")
    }

    fn rendered(keys: &[RuleKey]) -> Vec<String> {
        keys.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn test_full_metadata_cascade() {
        let keys = keys_for(&meta("AS44244", "IR", "irancell"));
        assert_eq!(
            rendered(&keys),
            vec![
                "rule:AS44244:IR:irancell",
                "rule:AS44244:IR:*",
                "rule:AS44244:*:irancell",
                "rule:AS44244:*:*",
                "rule:*:*:*",
            ]
        );
        assert_eq!(specific_keys(&meta("AS44244", "IR", "irancell")).len(), 4);
    }

    #[test]
    fn test_missing_country() {
        let keys = keys_for(&meta("AS44244", "", "irancell"));
        assert_eq!(
            rendered(&keys),
            vec!["rule:AS44244:*:irancell", "rule:AS44244:*:*", "rule:*:*:*"]
        );
    }

    #[test]
    fn test_asn_without_tsp_falls_back_to_country() {
        let keys = keys_for(&meta("AS44244", "IR", ""));
        assert_eq!(rendered(&keys), vec!["rule:*:IR:*", "rule:*:*:*"]);
    }

    #[test]
    fn test_country_only() {
        let keys = keys_for(&meta("", "de", ""));
        assert_eq!(rendered(&keys), vec!["rule:*:DE:*", "rule:*:*:*"]);
    }

    #[test]
    fn test_empty_metadata_yields_global_only() {
        let keys = keys_for(&OriginMetadata::default());
        assert_eq!(rendered(&keys), vec!["rule:*:*:*"]);
        assert!(keys[0].is_global());
    }

    #[test]
    fn test_key_normalization() {
        let key = RuleKey::new(Some("as1"), Some("us"), Some("Big ISP"));
        assert_eq!(key.to_string(), "rule:AS1:US:big isp");
        assert_eq!(key.specificity(), 3);

        let wild = RuleKey::new(Some("*"), Some(""), None);
        assert!(wild.is_global());
    }

    #[test]
    fn test_cascade_order_is_non_increasing_specificity() {
        let keys = keys_for(&meta("AS1", "US", "isp"));
        for pair in keys.windows(2) {
            assert!(pair[0].specificity() >= pair[1].specificity());
        }
    }
}
