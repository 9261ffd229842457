//! Cardinal rules for governed artifacts
//!
//! Every lifecycle operation on a governed artifact (algorithm, schema,
//! protocol, package, runtime) needs a minimum verification strength. The
//! cardinal rule table holds those minimums; the checker compares a presented
//! strength against them using the same algebra as edge constraints.
//!
//! The presented [`StrengthLevel`] comes from an external signature or anchor
//! verifier and is trusted as given.
//!
//! # Example
//!
//! ```
//! use gaid_cardinal::{ArtifactType, CardinalChecker, Operation, StrengthLevel};
//!
//! let checker = CardinalChecker::default();
//! assert!(checker.check(ArtifactType::Alg, Operation::Register, StrengthLevel::TelAnchored).allowed);
//! assert!(!checker.check(ArtifactType::Sch, Operation::Rotate, StrengthLevel::KelAnchored).allowed);
//! ```

pub mod checker;
pub mod config;
pub mod rules;
pub mod types;

// Re-export main types
pub use acdc_governance::{CheckResult, StrengthLevel};
pub use checker::CardinalChecker;
pub use config::{CardinalConfig, CardinalConfigError};
pub use rules::{default_cardinal_rules, CardinalRule, CardinalRules};
pub use types::{ArtifactType, Operation};
