//! Cardinal rule table.
//!
//! Maps each (artifact type, operation) pair to the minimum verification
//! strength it needs. Lookups never fail: a pair with no rule requires
//! [`StrengthLevel::Any`].

use std::collections::BTreeMap;

use acdc_governance::{ConstraintOrder, StrengthLevel};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::CardinalConfig;
use crate::types::{ArtifactType, Operation};

#[cfg(feature = "typescript")]
use ts_rs::TS;

/// Minimum strength for one operation on one artifact type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct CardinalRule {
    pub artifact_type: ArtifactType,
    pub operation: Operation,
    pub min_strength: StrengthLevel,
    /// Why this minimum applies
    #[serde(default)]
    pub rationale: String,
}

impl CardinalRule {
    pub fn new(artifact_type: ArtifactType, operation: Operation, min_strength: StrengthLevel) -> Self {
        Self {
            artifact_type,
            operation,
            min_strength,
            rationale: String::new(),
        }
    }

    /// Builder: set rationale.
    pub fn with_rationale(mut self, rationale: impl Into<String>) -> Self {
        self.rationale = rationale.into();
        self
    }

    fn key(&self) -> (ArtifactType, Operation) {
        (self.artifact_type, self.operation)
    }
}

/// Cardinal rules indexed by (artifact type, operation).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CardinalRules {
    rules: BTreeMap<(ArtifactType, Operation), CardinalRule>,
}

impl CardinalRules {
    /// Empty table; every lookup resolves to `ANY`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a rule. Returns the replaced rule.
    pub fn add(&mut self, rule: CardinalRule) -> Option<CardinalRule> {
        self.rules.insert(rule.key(), rule)
    }

    pub fn get(&self, artifact_type: ArtifactType, operation: Operation) -> Option<&CardinalRule> {
        self.rules.get(&(artifact_type, operation))
    }

    pub fn contains(&self, artifact_type: ArtifactType, operation: Operation) -> bool {
        self.rules.contains_key(&(artifact_type, operation))
    }

    /// Minimum strength for the pair, `ANY` when no rule exists.
    pub fn minimum_for(&self, artifact_type: ArtifactType, operation: Operation) -> StrengthLevel {
        self.get(artifact_type, operation)
            .map(|rule| rule.min_strength)
            .unwrap_or(StrengthLevel::Any)
    }

    /// Rules governing one artifact type, in operation order.
    pub fn rules_for_type(&self, artifact_type: ArtifactType) -> Vec<&CardinalRule> {
        self.rules
            .values()
            .filter(|rule| rule.artifact_type == artifact_type)
            .collect()
    }

    pub fn all_rules(&self) -> impl Iterator<Item = &CardinalRule> {
        self.rules.values()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Merge caller-supplied rules over this table.
    ///
    /// Overrides are applied as given. An override that lowers an existing
    /// minimum is logged; no floor is enforced here.
    pub fn with_overrides(mut self, overrides: impl IntoIterator<Item = CardinalRule>) -> Self {
        for rule in overrides {
            let previous = self.minimum_for(rule.artifact_type, rule.operation);
            if rule.min_strength.rank() < previous.rank() {
                warn!(
                    artifact_type = %rule.artifact_type,
                    operation = %rule.operation,
                    previous = %previous,
                    override_level = %rule.min_strength,
                    "Cardinal override weakens minimum strength"
                );
            } else {
                debug!(
                    artifact_type = %rule.artifact_type,
                    operation = %rule.operation,
                    min_strength = %rule.min_strength,
                    "Applied cardinal override"
                );
            }
            self.add(rule);
        }
        self
    }

    /// Merge the overrides of a loaded configuration.
    pub fn with_config(self, config: &CardinalConfig) -> Self {
        self.with_overrides(config.overrides.iter().cloned())
    }
}

impl FromIterator<CardinalRule> for CardinalRules {
    fn from_iter<I: IntoIterator<Item = CardinalRule>>(iter: I) -> Self {
        let mut rules = Self::new();
        for rule in iter {
            rules.add(rule);
        }
        rules
    }
}

/// The baseline table.
///
/// Registration and revocation need a full credential chain everywhere.
/// Rotation needs TEL anchoring for schemas and packages, whose new versions
/// can break dependents, and key-state verification otherwise. Deprecation
/// needs key-state verification, verification needs content integrity and
/// resolution needs nothing. Execution is governed for algorithms, packages
/// and runtimes only.
pub fn default_cardinal_rules() -> CardinalRules {
    use ArtifactType::*;
    use Operation::*;
    use StrengthLevel::{Any, KelAnchored, SaidOnly, TelAnchored};

    let table: [(ArtifactType, Operation, StrengthLevel, &str); 33] = [
        (Alg, Register, TelAnchored, "Algorithm registration requires full credential chain for trust root"),
        (Alg, Rotate, KelAnchored, "Algorithm version rotation requires key-state verified signature"),
        (Alg, Deprecate, KelAnchored, "Deprecation requires verifiable authority from algorithm controller"),
        (Alg, Revoke, TelAnchored, "Revocation requires full credential chain (security-critical)"),
        (Alg, Verify, SaidOnly, "Verification only needs content integrity"),
        (Alg, Resolve, Any, "Resolution is a read-only lookup"),
        (Alg, Execute, SaidOnly, "Execution requires integrity verification of algorithm content"),
        (Sch, Register, TelAnchored, "Schema registration requires full credential chain for governance"),
        (Sch, Rotate, TelAnchored, "Schema rotation requires TEL anchoring (breaking changes affect credentials)"),
        (Sch, Deprecate, KelAnchored, "Schema deprecation requires verifiable authority"),
        (Sch, Revoke, TelAnchored, "Schema revocation is credential-critical"),
        (Sch, Verify, SaidOnly, "Schema verification needs content integrity"),
        (Sch, Resolve, Any, "Schema resolution is a read-only lookup"),
        (Pro, Register, TelAnchored, "Protocol registration requires full credential chain"),
        (Pro, Rotate, KelAnchored, "Protocol version rotation requires key-state verification"),
        (Pro, Deprecate, KelAnchored, "Protocol deprecation requires verifiable authority"),
        (Pro, Revoke, TelAnchored, "Protocol revocation requires full credential chain"),
        (Pro, Verify, SaidOnly, "Protocol verification needs content integrity"),
        (Pro, Resolve, Any, "Protocol resolution is a read-only lookup"),
        (Pkg, Register, TelAnchored, "Package registration requires publisher credential (supply chain)"),
        (Pkg, Rotate, TelAnchored, "Package version requires TEL anchoring (supply chain integrity)"),
        (Pkg, Deprecate, KelAnchored, "Package deprecation (yank) requires publisher authority"),
        (Pkg, Revoke, TelAnchored, "Package revocation (hijack response) requires full credential chain"),
        (Pkg, Verify, SaidOnly, "Package verification needs content integrity (hash check)"),
        (Pkg, Resolve, Any, "Package resolution is a read-only lookup"),
        (Pkg, Execute, KelAnchored, "Package installation requires publisher signature verification"),
        (Run, Register, TelAnchored, "Runtime registration requires full credential chain"),
        (Run, Rotate, KelAnchored, "Runtime version rotation requires key-state verification"),
        (Run, Deprecate, KelAnchored, "Runtime deprecation requires verifiable authority"),
        (Run, Revoke, TelAnchored, "Runtime revocation is security-critical"),
        (Run, Verify, SaidOnly, "Runtime verification needs content integrity"),
        (Run, Resolve, Any, "Runtime resolution is a read-only lookup"),
        (Run, Execute, KelAnchored, "Runtime execution requires verified environment"),
    ];

    table
        .into_iter()
        .map(|(artifact_type, operation, min_strength, rationale)| {
            CardinalRule::new(artifact_type, operation, min_strength).with_rationale(rationale)
        })
        .collect()
}
