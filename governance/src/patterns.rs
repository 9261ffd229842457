//! Reusable rule templates.
//!
//! Each pattern produces rules or matrix entries for a common governance
//! scenario. Compose them into a [`FrameworkBuilder`]:
//!
//! ```
//! use acdc_governance::patterns::{delegation_depth, jurisdiction_match};
//! use acdc_governance::{EdgeOperator, GovernanceFramework, RuleEnforcement};
//!
//! let framework = GovernanceFramework::builder("Regional")
//!     .rules(jurisdiction_match("iss", "jurisdiction", "country", RuleEnforcement::Strict))
//!     .rules(delegation_depth("delegate", 3, EdgeOperator::DI2I, RuleEnforcement::Strict))
//!     .build()
//!     .unwrap();
//! assert_eq!(framework.rules().len(), 2);
//! ```

use crate::framework::{
    ConstraintRule, CredentialMatrixEntry, FrameworkBuilder, GovernanceFramework, RuleEnforcement,
};
use crate::primitives::EdgeOperator;

/// Issuer and subject must share a jurisdiction.
///
/// Produces a constraint on the `jurisdiction` field comparing
/// `$issuer.<issuer_field>` with `$subject.<subject_field>`.
pub fn jurisdiction_match(
    applies_to: &str,
    issuer_field: &str,
    subject_field: &str,
    enforcement: RuleEnforcement,
) -> Vec<ConstraintRule> {
    vec![ConstraintRule::new("jurisdiction-match", applies_to, EdgeOperator::DI2I)
        .with_description(format!(
            "Issuer {} must match subject {}",
            issuer_field, subject_field
        ))
        .with_field_constraint(
            "jurisdiction",
            format!("$issuer.{} == $subject.{}", issuer_field, subject_field),
        )
        .with_enforcement(enforcement)]
}

/// Bound the length of delegation chains through `applies_to`.
pub fn delegation_depth(
    applies_to: &str,
    max_depth: u32,
    required_operator: EdgeOperator,
    enforcement: RuleEnforcement,
) -> Vec<ConstraintRule> {
    vec![
        ConstraintRule::new("delegation-depth-limit", applies_to, required_operator)
            .with_description(format!(
                "Delegation chain must not exceed depth {}",
                max_depth
            ))
            .with_max_delegation_depth(max_depth)
            .with_enforcement(enforcement),
    ]
}

/// Require at least `minimum` on every listed edge label.
pub fn operator_floor(
    edge_labels: &[&str],
    minimum: EdgeOperator,
    enforcement: RuleEnforcement,
) -> Vec<ConstraintRule> {
    edge_labels
        .iter()
        .map(|label| {
            ConstraintRule::new(format!("operator-floor-{}", label), *label, minimum)
                .with_description(format!(
                    "Edge '{}' requires at least @{} operator",
                    label, minimum
                ))
                .with_enforcement(enforcement)
        })
        .collect()
}

/// One matrix entry per (action, role) pair.
///
/// Pairs listed in `denied` are refused outright; pairs in `overrides` take
/// the given operator instead of `default_operator`.
pub fn role_action_matrix(
    roles: &[&str],
    actions: &[&str],
    default_operator: EdgeOperator,
    denied: &[(&str, &str)],
    overrides: &[(&str, &str, EdgeOperator)],
) -> Vec<CredentialMatrixEntry> {
    let mut entries = Vec::with_capacity(roles.len() * actions.len());
    for action in actions {
        for role in roles {
            let is_denied = denied.iter().any(|(a, r)| a == action && r == role);
            let required_operator = if is_denied {
                EdgeOperator::Any
            } else {
                overrides
                    .iter()
                    .find(|(a, r, _)| a == action && r == role)
                    .map(|(_, _, op)| *op)
                    .unwrap_or(default_operator)
            };
            entries.push(CredentialMatrixEntry {
                action: action.to_string(),
                role: role.to_string(),
                required_operator,
                allowed: !is_denied,
            });
        }
    }
    entries
}

/// Expiry and freshness checks on the subject credential.
///
/// Expiry compares `$subject.<expiry_field>` against `$now.timestamp`, so the
/// candidate must carry the evaluation time under `now.timestamp` in the same
/// format (ISO-8601 strings order correctly). Freshness is always advisory.
pub fn temporal_validity(
    applies_to: &str,
    freshness_field: &str,
    expiry_field: &str,
    enforcement: RuleEnforcement,
) -> Vec<ConstraintRule> {
    vec![
        ConstraintRule::new("temporal-not-expired", applies_to, EdgeOperator::Any)
            .with_description(format!("Credential {} must be in the future", expiry_field))
            .with_field_constraint(
                "expiry",
                format!("$subject.{} > $now.timestamp", expiry_field),
            )
            .with_enforcement(enforcement),
        ConstraintRule::new("temporal-freshness", applies_to, EdgeOperator::Any)
            .with_description(format!("Credential {} must exist", freshness_field))
            .with_field_constraint("freshness", format!("$subject.{} != \"\"", freshness_field))
            .with_enforcement(RuleEnforcement::Advisory),
    ]
}

/// Trust chain from root to leaf with weakening requirements.
///
/// The first label gets `root`, the last gets `leaf`, everything between gets
/// `intermediate`. A single-label chain is treated as a root.
pub fn chain_integrity(
    chain_edges: &[&str],
    root: EdgeOperator,
    intermediate: EdgeOperator,
    leaf: EdgeOperator,
) -> Vec<ConstraintRule> {
    let last = chain_edges.len().saturating_sub(1);
    chain_edges
        .iter()
        .enumerate()
        .map(|(i, label)| {
            let (position, operator) = match i {
                0 => ("root", root),
                i if i == last => ("leaf", leaf),
                _ => ("intermediate", intermediate),
            };
            ConstraintRule::new(format!("chain-{}-{}", position, label), *label, operator)
                .with_description(format!(
                    "Chain {} edge '{}' requires @{}",
                    position, label, operator
                ))
        })
        .collect()
}

/// A vLEI-style framework composed from the patterns above.
///
/// GLEIF -[I2I]-> QVI -[DI2I]-> LE, with jurisdiction matching and temporal
/// checks on QVI issuance and a three-link delegation limit.
pub fn vlei_standard_framework() -> FrameworkBuilder {
    let chain = ["gleif_auth", "qvi_issue", "le_assign"];

    GovernanceFramework::builder("vLEI Standard")
        .rules(jurisdiction_match(
            "qvi_issue",
            "jurisdiction",
            "country",
            RuleEnforcement::Strict,
        ))
        .rules(delegation_depth(
            "delegate",
            3,
            EdgeOperator::DI2I,
            RuleEnforcement::Strict,
        ))
        .rules(operator_floor(&chain, EdgeOperator::DI2I, RuleEnforcement::Strict))
        .rules(chain_integrity(
            &chain,
            EdgeOperator::I2I,
            EdgeOperator::DI2I,
            EdgeOperator::NI2I,
        ))
        .rules(temporal_validity(
            "qvi_issue",
            "issuance_date",
            "expiry_date",
            RuleEnforcement::Strict,
        ))
        .matrix_entries(role_action_matrix(
            &["GLEIF", "QVI", "LE"],
            &["issue", "revoke", "delegate", "query"],
            EdgeOperator::DI2I,
            &[("issue", "LE"), ("delegate", "LE")],
            &[
                ("issue", "GLEIF", EdgeOperator::I2I),
                ("revoke", "GLEIF", EdgeOperator::I2I),
                ("delegate", "GLEIF", EdgeOperator::I2I),
                ("query", "LE", EdgeOperator::NI2I),
            ],
        ))
}
