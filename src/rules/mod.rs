//! Rule resolution subsystem.
//!
//! # Data Flow
//! ```text
//! OriginMetadata
//!     → key.rs (ordered candidate keys, global last)
//!     → lookup.rs (query store per key, stop at first hit)
//!     → store.rs (Redis GET / in-memory map)
//!     → Rule + matched key, or no match
//! ```
//!
//! # Design Decisions
//! - Rules are owned by the administration layer; the gateway never writes
//! - "Absent" continues the cascade; store and decode failures abort it

pub mod key;
pub mod lookup;
pub mod store;

pub use key::{keys_for, specific_keys, RuleKey};
pub use lookup::{LookupError, MatchedRule, Rule, RuleLookup};
pub use store::{MemoryRuleStore, RedisRuleStore, RuleStore, RuleStoreError};
