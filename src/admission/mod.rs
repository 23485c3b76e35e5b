//! Admission control subsystem.
//!
//! # Data Flow
//! ```text
//! client IP
//!     → gate.rs (origin → keys → rule lookup, fail-open handling, counters)
//!     → decision.rs (hash bucket, Allow/Drop)
//!     → Verdict handed back to the HTTP layer
//! ```
//!
//! # Design Decisions
//! - Availability over strictness: origin and rule-store failures admit
//! - The decision itself is a pure function of (rule, client IP)

pub mod decision;
pub mod gate;

pub use decision::{decide, hash_bucket, Action, Decision, Reason, Stage};
pub use gate::{AdmissionGate, Verdict};
