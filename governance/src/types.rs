//! Check results and error kinds shared by every evaluator.
//!
//! A denied check is an expected outcome, not an error: it is reported through
//! [`CheckResult::allowed`] with a human-readable reason for audit logging.
//! Errors are reserved for frameworks that cannot be resolved, parsed, or
//! compiled; callers must treat them as deny.

use serde::{Deserialize, Serialize};

/// Outcome of evaluating one constraint.
///
/// Freshly produced per call. `required` and `actual` carry the compared
/// values for audit; either may be absent when nothing was declared or
/// presented.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckResult<T> {
    /// Whether the governed action may proceed
    pub allowed: bool,
    /// Explanation; always present when `allowed` is false
    pub reason: Option<String>,
    /// The requirement that was applied
    pub required: Option<T>,
    /// The value that was presented
    pub actual: Option<T>,
}

impl<T> CheckResult<T> {
    /// An allowed outcome.
    pub fn allow(required: Option<T>, actual: Option<T>) -> Self {
        Self {
            allowed: true,
            reason: None,
            required,
            actual,
        }
    }

    /// A denied outcome. The reason is mandatory.
    pub fn deny(reason: impl Into<String>, required: Option<T>, actual: Option<T>) -> Self {
        Self {
            allowed: false,
            reason: Some(reason.into()),
            required,
            actual,
        }
    }

    /// Attach an explanatory note to the result.
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Whether the outcome denies the action.
    pub fn is_denied(&self) -> bool {
        !self.allowed
    }
}

/// Error types for framework resolution and compilation.
///
/// `Clone` so a single failure can be delivered to every caller waiting on
/// the same coalesced resolution.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GovernanceError {
    /// The framework credential could not be fetched (not found, transport
    /// failure, timeout)
    #[error("Unresolved framework {said}: {reason}")]
    UnresolvedFramework { said: String, reason: String },

    /// The fetched data does not parse into a validly typed framework
    #[error("Malformed framework {said}: {reason}")]
    MalformedFramework { said: String, reason: String },

    /// A declarative constraint references an unknown operator or field
    #[error("Compilation failed for {target}: {reason}")]
    Compilation { target: String, reason: String },
}

impl GovernanceError {
    pub(crate) fn unresolved(said: &str, reason: impl Into<String>) -> Self {
        Self::UnresolvedFramework {
            said: said.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn malformed(said: &str, reason: impl Into<String>) -> Self {
        Self::MalformedFramework {
            said: said.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn compilation(target: &str, reason: impl Into<String>) -> Self {
        Self::Compilation {
            target: target.to_string(),
            reason: reason.into(),
        }
    }

    /// The framework SAID (or compilation target) the error concerns.
    pub fn said(&self) -> &str {
        match self {
            Self::UnresolvedFramework { said, .. } | Self::MalformedFramework { said, .. } => said,
            Self::Compilation { target, .. } => target,
        }
    }

    /// True when a retry could succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::UnresolvedFramework { .. })
    }
}

pub type Result<T> = std::result::Result<T, GovernanceError>;
