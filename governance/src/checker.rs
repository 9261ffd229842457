//! Constraint checker.
//!
//! Evaluates credential-graph traversals against a compiled framework. Every
//! check is pure and reentrant; the compiled framework is shared read-only.
//! Anything the framework does not declare is denied.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use crate::compiler::{compile_framework, CompiledFramework};
use crate::framework::GovernanceFramework;
use crate::primitives::{satisfies, EdgeOperator};
use crate::types::{CheckResult, Result};

/// Reason reported when an edge label is not declared by the framework.
pub const UNDECLARED_EDGE_REASON: &str = "undeclared edge label has no permitted traversal";

/// Checks edges, fields, delegation depth and role actions against one
/// framework.
#[derive(Debug, Clone)]
pub struct ConstraintChecker {
    compiled: Arc<CompiledFramework>,
}

impl ConstraintChecker {
    pub fn new(compiled: Arc<CompiledFramework>) -> Self {
        Self { compiled }
    }

    /// Compile a raw framework and check against it.
    pub fn from_framework(framework: &GovernanceFramework) -> Result<Self> {
        Ok(Self::new(Arc::new(compile_framework(framework)?)))
    }

    pub fn compiled(&self) -> &CompiledFramework {
        &self.compiled
    }

    /// Check one edge traversal with the operator the edge presents.
    pub fn check_edge(&self, label: &str, presented: EdgeOperator) -> CheckResult<EdgeOperator> {
        let Some(required) = self.compiled.required_operator(label) else {
            debug!(
                said = %self.compiled.said(),
                label = %label,
                "Denied traversal of undeclared edge"
            );
            return CheckResult::deny(
                format!("{}: `{}`", UNDECLARED_EDGE_REASON, label),
                None,
                Some(presented),
            );
        };

        if satisfies(presented, required) {
            CheckResult::allow(Some(required), Some(presented))
        } else {
            debug!(
                said = %self.compiled.said(),
                label = %label,
                required = %required,
                presented = %presented,
                "Denied edge traversal"
            );
            CheckResult::deny(
                format!(
                    "edge `{}` requires {} ({}) but presents {} ({})",
                    label,
                    required,
                    required.display_name(),
                    presented,
                    presented.display_name()
                ),
                Some(required),
                Some(presented),
            )
        }
    }

    /// Check every constraint declared for `field` against a candidate
    /// descriptor.
    pub fn check_field(&self, field: &str, candidate: &Value) -> CheckResult<Value> {
        let Some(constraints) = self.compiled.field_constraints(field) else {
            return CheckResult::deny(
                format!("undeclared field `{}` has no permitted value", field),
                None,
                candidate.get(field).cloned(),
            );
        };

        let mut advisories = Vec::new();
        let mut outcome = CheckResult::allow(None, None);
        for constraint in constraints {
            let result = constraint.evaluate(candidate);
            if result.is_denied() {
                debug!(
                    said = %self.compiled.said(),
                    field = %field,
                    rule = %constraint.rule,
                    "Denied field constraint"
                );
                return result;
            }
            if let Some(note) = &result.reason {
                advisories.push(note.clone());
            }
            outcome = result;
        }

        if advisories.is_empty() {
            outcome.reason = None;
        } else {
            outcome.reason = Some(advisories.join("; "));
        }
        outcome
    }

    /// Check every declared field.
    pub fn check_fields(&self, candidate: &Value) -> BTreeMap<String, CheckResult<Value>> {
        self.compiled
            .field_names()
            .map(|field| (field.to_string(), self.check_field(field, candidate)))
            .collect()
    }

    /// Check a delegation chain of `depth` links through `label`.
    pub fn check_delegation_depth(&self, label: &str, depth: u32) -> CheckResult<u32> {
        let Some(edge) = self.compiled.edge(label) else {
            return CheckResult::deny(
                format!("{}: `{}`", UNDECLARED_EDGE_REASON, label),
                None,
                Some(depth),
            );
        };

        match edge.max_delegation_depth {
            Some(limit) if depth > limit => CheckResult::deny(
                format!(
                    "delegation depth {} through `{}` exceeds limit {}",
                    depth, label, limit
                ),
                Some(limit),
                Some(depth),
            ),
            limit => CheckResult::allow(limit, Some(depth)),
        }
    }

    /// Check whether `role` may perform `action` with the operator its
    /// credential edge presents.
    pub fn check_action(
        &self,
        action: &str,
        role: &str,
        presented: EdgeOperator,
    ) -> CheckResult<EdgeOperator> {
        match self.compiled.matrix_cell(action, role) {
            None => CheckResult::deny(
                format!("no matrix entry permits `{}` for role `{}`", action, role),
                None,
                Some(presented),
            ),
            Some(cell) if !cell.allowed => CheckResult::deny(
                format!("`{}` is denied for role `{}`", action, role),
                Some(cell.required_operator),
                Some(presented),
            ),
            Some(cell) if satisfies(presented, cell.required_operator) => {
                CheckResult::allow(Some(cell.required_operator), Some(presented))
            }
            Some(cell) => CheckResult::deny(
                format!(
                    "`{}` by role `{}` requires {} but presents {}",
                    action, role, cell.required_operator, presented
                ),
                Some(cell.required_operator),
                Some(presented),
            ),
        }
    }
}

impl From<Arc<CompiledFramework>> for ConstraintChecker {
    fn from(compiled: Arc<CompiledFramework>) -> Self {
        Self::new(compiled)
    }
}

impl From<CompiledFramework> for ConstraintChecker {
    fn from(compiled: CompiledFramework) -> Self {
        Self::new(Arc::new(compiled))
    }
}
