//! Artifact types and lifecycle operations.

use std::fmt;
use std::str::FromStr;

use acdc_governance::UnknownValue;
use serde::{Deserialize, Serialize};

#[cfg(feature = "typescript")]
use ts_rs::TS;

/// Class of governed artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
#[serde(rename_all = "lowercase")]
pub enum ArtifactType {
    /// Algorithms (cryptographic, hashing, KDF)
    Alg,
    /// Credential schemas
    Sch,
    /// Communication and exchange protocols
    Pro,
    /// Software packages
    Pkg,
    /// Execution environments
    Run,
}

impl ArtifactType {
    pub const ALL: [ArtifactType; 5] = [Self::Alg, Self::Sch, Self::Pro, Self::Pkg, Self::Run];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Alg => "alg",
            Self::Sch => "sch",
            Self::Pro => "pro",
            Self::Pkg => "pkg",
            Self::Run => "run",
        }
    }

    /// Upper-case code used in audit output.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Alg => "ALG",
            Self::Sch => "SCH",
            Self::Pro => "PRO",
            Self::Pkg => "PKG",
            Self::Run => "RUN",
        }
    }
}

impl fmt::Display for ArtifactType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ArtifactType {
    type Err = UnknownValue;

    /// Accepts either the wire value (`alg`) or the code (`ALG`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s || t.code() == s)
            .ok_or_else(|| UnknownValue {
                domain: "artifact type",
                value: s.to_string(),
            })
    }
}

/// Artifact lifecycle operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    /// First registration
    Register,
    /// New version, same identity
    Rotate,
    /// Deprecation with successor
    Deprecate,
    /// Hard revocation
    Revoke,
    /// Integrity verification
    Verify,
    /// Identifier resolution
    Resolve,
    /// Use or execution
    Execute,
}

impl Operation {
    pub const ALL: [Operation; 7] = [
        Self::Register,
        Self::Rotate,
        Self::Deprecate,
        Self::Revoke,
        Self::Verify,
        Self::Resolve,
        Self::Execute,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Register => "register",
            Self::Rotate => "rotate",
            Self::Deprecate => "deprecate",
            Self::Revoke => "revoke",
            Self::Verify => "verify",
            Self::Resolve => "resolve",
            Self::Execute => "execute",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operation {
    type Err = UnknownValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|op| op.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| UnknownValue {
                domain: "operation",
                value: s.to_string(),
            })
    }
}
