//! Governance constraint evaluation for ACDC credential ecosystems
//!
//! A governance framework is itself a credential: its SAID names an immutable
//! set of rules over the edges of a credential graph. This crate turns such a
//! credential into decisions:
//!
//! - **Resolve**: fetch and parse the framework credential, once per SAID
//! - **Compile**: turn declarative rules into lookup tables and field predicates
//! - **Check**: answer whether an edge, field, delegation chain or role action
//!   is permitted
//!
//! Undeclared edges and fields are always denied.
//!
//! # Key Components
//!
//! - [`EdgeOperator`], [`StrengthLevel`]: totally ordered constraint values
//! - [`FrameworkResolver`]: single-flight, cached SAID resolution
//! - [`ConstraintCompiler`]: per-SAID compilation cache
//! - [`ConstraintChecker`]: edge, field, depth and action checks
//! - [`patterns`]: reusable rule templates
//!
//! # Example
//!
//! ```ignore
//! use acdc_governance::{ConstraintChecker, ConstraintCompiler, EdgeOperator, FrameworkResolver};
//!
//! let resolver = FrameworkResolver::new(fetcher);
//! let framework = resolver.resolve("EFramework...").await?;
//! let compiled = ConstraintCompiler::new().compile(&framework)?;
//! let checker = ConstraintChecker::new(compiled);
//!
//! let result = checker.check_edge("qvi_issue", EdgeOperator::DI2I);
//! assert!(result.allowed);
//! ```

pub mod chain;
pub mod checker;
pub mod compiler;
pub mod config;
pub mod framework;
pub mod patterns;
pub mod primitives;
pub mod resolver;
pub mod types;

// Re-export main types
pub use chain::VersionChain;
pub use checker::{ConstraintChecker, UNDECLARED_EDGE_REASON};
pub use compiler::{
    compile_field_expression, compile_framework, Comparison, CompiledFieldConstraint,
    CompiledFramework, ConstraintCompiler, MatrixCell, Operand,
};
pub use config::ResolverConfig;
pub use framework::{
    compute_said, ConstraintRule, CredentialMatrixEntry, EdgeRequirement, FieldConstraintSpec,
    FrameworkBuilder, GovernanceFramework, RuleEnforcement, FRAMEWORK_SCHEMA,
};
pub use primitives::{satisfies, ConstraintOrder, EdgeOperator, StrengthLevel, UnknownValue};
pub use resolver::{BundledCredentialStore, CredentialFetcher, FetchError, FrameworkResolver};
pub use types::*;
