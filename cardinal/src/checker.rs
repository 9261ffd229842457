//! Cardinal checker.

use std::collections::BTreeMap;

use acdc_governance::{satisfies, CheckResult, StrengthLevel};
use tracing::debug;

use crate::rules::{default_cardinal_rules, CardinalRules};
use crate::types::{ArtifactType, Operation};

/// Evaluates artifact operations against a cardinal rule table.
///
/// `required` in each result is the minimum that applied and `actual` the
/// presented strength. Unknown pairs never fail; they require `ANY`.
#[derive(Debug, Clone)]
pub struct CardinalChecker {
    rules: CardinalRules,
}

impl CardinalChecker {
    pub fn new(rules: CardinalRules) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &CardinalRules {
        &self.rules
    }

    /// Check whether `presented` meets the minimum for `operation` on
    /// `artifact_type`.
    pub fn check(
        &self,
        artifact_type: ArtifactType,
        operation: Operation,
        presented: StrengthLevel,
    ) -> CheckResult<StrengthLevel> {
        let Some(rule) = self.rules.get(artifact_type, operation) else {
            return CheckResult::allow(Some(StrengthLevel::Any), Some(presented)).with_reason(
                format!(
                    "no cardinal rule for {}:{}; minimum is ANY",
                    artifact_type, operation
                ),
            );
        };

        if satisfies(presented, rule.min_strength) {
            CheckResult::allow(Some(rule.min_strength), Some(presented))
        } else {
            debug!(
                artifact_type = %artifact_type,
                operation = %operation,
                required = %rule.min_strength,
                presented = %presented,
                "Denied artifact operation"
            );
            let mut reason = format!(
                "{} on {} requires {} but has {}",
                operation,
                artifact_type.code(),
                rule.min_strength,
                presented
            );
            if !rule.rationale.is_empty() {
                reason.push_str(": ");
                reason.push_str(&rule.rationale);
            }
            CheckResult::deny(reason, Some(rule.min_strength), Some(presented))
        }
    }

    /// Check every governed operation on `artifact_type` at one strength.
    pub fn check_all(
        &self,
        artifact_type: ArtifactType,
        presented: StrengthLevel,
    ) -> BTreeMap<Operation, CheckResult<StrengthLevel>> {
        self.rules
            .rules_for_type(artifact_type)
            .into_iter()
            .map(|rule| {
                (
                    rule.operation,
                    self.check(artifact_type, rule.operation, presented),
                )
            })
            .collect()
    }
}

impl Default for CardinalChecker {
    fn default() -> Self {
        Self::new(default_cardinal_rules())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::CardinalRule;

    fn checker() -> CardinalChecker {
        CardinalChecker::new(
            [
                CardinalRule::new(ArtifactType::Alg, Operation::Register, StrengthLevel::TelAnchored),
                CardinalRule::new(ArtifactType::Alg, Operation::Rotate, StrengthLevel::KelAnchored),
                CardinalRule::new(ArtifactType::Alg, Operation::Verify, StrengthLevel::SaidOnly),
                CardinalRule::new(ArtifactType::Alg, Operation::Resolve, StrengthLevel::Any),
            ]
            .into_iter()
            .collect(),
        )
    }

    #[test]
    fn test_meets_and_exceeds() {
        let checker = checker();
        assert!(checker
            .check(ArtifactType::Alg, Operation::Register, StrengthLevel::TelAnchored)
            .allowed);
        assert!(checker
            .check(ArtifactType::Alg, Operation::Rotate, StrengthLevel::TelAnchored)
            .allowed);
        assert!(checker
            .check(ArtifactType::Alg, Operation::Resolve, StrengthLevel::Any)
            .allowed);
    }

    #[test]
    fn test_insufficient_strength() {
        let result = checker().check(ArtifactType::Alg, Operation::Register, StrengthLevel::KelAnchored);
        assert!(!result.allowed);
        assert_eq!(result.required, Some(StrengthLevel::TelAnchored));
        assert_eq!(result.actual, Some(StrengthLevel::KelAnchored));
        let reason = result.reason.unwrap();
        assert!(reason.contains("requires"));
        assert!(reason.contains("TEL_ANCHORED"));
    }

    #[test]
    fn test_ungoverned_pair_requires_any() {
        let checker = checker();
        let result = checker.check(ArtifactType::Alg, Operation::Execute, StrengthLevel::Any);
        assert!(result.allowed);
        assert_eq!(result.required, Some(StrengthLevel::Any));
        assert!(result.reason.unwrap().contains("no cardinal rule"));

        assert!(checker
            .check(ArtifactType::Pkg, Operation::Register, StrengthLevel::Any)
            .allowed);
    }

    #[test]
    fn test_deny_includes_rationale() {
        let result = CardinalChecker::default().check(
            ArtifactType::Pkg,
            Operation::Execute,
            StrengthLevel::SaidOnly,
        );
        assert!(!result.allowed);
        assert!(result.reason.unwrap().contains("publisher signature"));
    }

    #[test]
    fn test_check_all() {
        let results = checker().check_all(ArtifactType::Alg, StrengthLevel::SaidOnly);
        assert_eq!(results.len(), 4);
        assert!(!results[&Operation::Register].allowed);
        assert!(!results[&Operation::Rotate].allowed);
        assert!(results[&Operation::Verify].allowed);
        assert!(results[&Operation::Resolve].allowed);

        assert!(checker().check_all(ArtifactType::Run, StrengthLevel::Any).is_empty());
    }
}
