//! Constraint algebra.
//!
//! Two totally ordered domains govern the credential ecosystem:
//!
//! - [`EdgeOperator`]: how strongly a credential-graph edge binds issuer to
//!   subject (`I2I > DI2I > NI2I > ANY`)
//! - [`StrengthLevel`]: how strongly an artifact operation was verified
//!   (`TEL_ANCHORED > KEL_ANCHORED > SAID_ONLY > ANY`)
//!
//! Both follow the same rule: a candidate satisfies a requirement iff its rank
//! is greater than or equal to the required rank. The rule is written once, in
//! [`satisfies`], and shared by every domain implementing [`ConstraintOrder`].

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[cfg(feature = "typescript")]
use ts_rs::TS;

/// A small, totally ordered domain usable in the constraint algebra.
pub trait ConstraintOrder: Copy + Eq + fmt::Debug + 'static {
    /// Position in the order (higher = stronger).
    fn rank(self) -> u8;

    /// Every member, strongest first.
    fn all_descending() -> &'static [Self];

    /// Whether `self` meets or exceeds `required`.
    fn satisfies(self, required: Self) -> bool {
        satisfies(self, required)
    }
}

/// `candidate` satisfies `required` iff `rank(candidate) >= rank(required)`.
pub fn satisfies<T: ConstraintOrder>(candidate: T, required: T) -> bool {
    candidate.rank() >= required.rank()
}

/// Error returned when parsing an unknown operator or strength code.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {domain} value: {value}")]
pub struct UnknownValue {
    pub domain: &'static str,
    pub value: String,
}

/// Edge constraint operators for credential-graph traversal.
///
/// - `I2I`: issuer-to-issuer (child issuer is the parent subject)
/// - `DI2I`: delegated issuer-to-issuer (child issuer is in the delegation chain)
/// - `NI2I`: no issuer binding (third-party attestation)
/// - `ANY`: any valid edge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub enum EdgeOperator {
    #[serde(rename = "I2I")]
    I2I,
    #[serde(rename = "DI2I")]
    DI2I,
    #[serde(rename = "NI2I")]
    NI2I,
    #[serde(rename = "ANY")]
    Any,
}

impl EdgeOperator {
    /// Wire code as it appears in framework credentials.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::I2I => "I2I",
            Self::DI2I => "DI2I",
            Self::NI2I => "NI2I",
            Self::Any => "ANY",
        }
    }

    /// Human-readable name for audit output.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::I2I => "Issuer-to-Issuer",
            Self::DI2I => "Delegated-Issuer-to-Issuer",
            Self::NI2I => "Non-Issuer-to-Issuer",
            Self::Any => "Any",
        }
    }
}

impl ConstraintOrder for EdgeOperator {
    fn rank(self) -> u8 {
        match self {
            Self::Any => 0,
            Self::NI2I => 1,
            Self::DI2I => 2,
            Self::I2I => 3,
        }
    }

    fn all_descending() -> &'static [Self] {
        &[Self::I2I, Self::DI2I, Self::NI2I, Self::Any]
    }
}

impl fmt::Display for EdgeOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EdgeOperator {
    type Err = UnknownValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "I2I" => Ok(Self::I2I),
            "DI2I" => Ok(Self::DI2I),
            "NI2I" => Ok(Self::NI2I),
            "ANY" => Ok(Self::Any),
            other => Err(UnknownValue {
                domain: "edge operator",
                value: other.to_string(),
            }),
        }
    }
}

/// Verification strength achieved for an artifact operation.
///
/// Established by an external signature/anchor verifier; this crate trusts the
/// presented level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StrengthLevel {
    /// Full credential chain anchored in a transaction event log
    TelAnchored,
    /// Signature verified against key state
    KelAnchored,
    /// Content integrity via self-addressing identifier only
    SaidOnly,
    /// No verification
    Any,
}

impl StrengthLevel {
    /// Wire code as it appears in configuration.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TelAnchored => "TEL_ANCHORED",
            Self::KelAnchored => "KEL_ANCHORED",
            Self::SaidOnly => "SAID_ONLY",
            Self::Any => "ANY",
        }
    }

    /// Human-readable name for audit output.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::TelAnchored => "TEL-Anchored",
            Self::KelAnchored => "KEL-Anchored",
            Self::SaidOnly => "SAID-Only",
            Self::Any => "Any",
        }
    }
}

impl ConstraintOrder for StrengthLevel {
    fn rank(self) -> u8 {
        match self {
            Self::Any => 0,
            Self::SaidOnly => 1,
            Self::KelAnchored => 2,
            Self::TelAnchored => 3,
        }
    }

    fn all_descending() -> &'static [Self] {
        &[
            Self::TelAnchored,
            Self::KelAnchored,
            Self::SaidOnly,
            Self::Any,
        ]
    }
}

impl fmt::Display for StrengthLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StrengthLevel {
    type Err = UnknownValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "TEL_ANCHORED" => Ok(Self::TelAnchored),
            "KEL_ANCHORED" => Ok(Self::KelAnchored),
            "SAID_ONLY" => Ok(Self::SaidOnly),
            "ANY" => Ok(Self::Any),
            other => Err(UnknownValue {
                domain: "strength level",
                value: other.to_string(),
            }),
        }
    }
}
