//! Constraint compiler.
//!
//! Turns a framework's declarative rules into executable form once, so checks
//! never re-parse rule text. Edge declarations compile to a plain lookup of
//! the required operator; field constraint expressions compile to
//! [`CompiledFieldConstraint`] predicates.
//!
//! # Field expression grammar
//!
//! ```text
//! expression := [operand] op operand
//! op         := "==" | "!=" | "in" | "not in" | ">" | ">=" | "<" | "<="
//! operand    := "$" path | JSON literal
//! path       := ident ("." ident)*
//! ```
//!
//! Tokens are separated by whitespace, except that a JSON literal operand may
//! contain spaces (`"New York" == $city`). A missing left operand means the
//! constrained field itself, so `in ["US", "CA"]` on field `country` reads
//! `$country in ["US", "CA"]`, and on field `subject.country` reads
//! `$subject.country`. `$path` reads a field of the candidate descriptor,
//! walking nested objects.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use serde_json::{Number, Value};
use tracing::{debug, info};

use crate::framework::{EdgeRequirement, GovernanceFramework, RuleEnforcement};
use crate::primitives::EdgeOperator;
use crate::types::{CheckResult, GovernanceError, Result};

/// Comparison operator of a field constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Eq,
    Ne,
    In,
    NotIn,
    Gt,
    Ge,
    Lt,
    Le,
}

impl Comparison {
    fn parse(token: &str) -> Option<Self> {
        match token {
            "==" => Some(Self::Eq),
            "!=" => Some(Self::Ne),
            "in" => Some(Self::In),
            ">" => Some(Self::Gt),
            ">=" => Some(Self::Ge),
            "<" => Some(Self::Lt),
            "<=" => Some(Self::Le),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::In => "in",
            Self::NotIn => "not in",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::Lt => "<",
            Self::Le => "<=",
        }
    }

    fn is_membership(&self) -> bool {
        matches!(self, Self::In | Self::NotIn)
    }

    fn is_ordering(&self) -> bool {
        matches!(self, Self::Gt | Self::Ge | Self::Lt | Self::Le)
    }

    /// Apply to resolved operands. `Err` means the operands cannot be compared.
    fn apply(&self, lhs: &Value, rhs: &Value) -> std::result::Result<bool, String> {
        match self {
            Self::Eq => Ok(values_equal(lhs, rhs)),
            Self::Ne => Ok(!values_equal(lhs, rhs)),
            Self::In | Self::NotIn => {
                let set = rhs
                    .as_array()
                    .ok_or_else(|| format!("membership set {} is not an array", rhs))?;
                let member = set.iter().any(|item| values_equal(lhs, item));
                Ok(member == (*self == Self::In))
            }
            Self::Gt | Self::Ge | Self::Lt | Self::Le => {
                let ordering = compare_values(lhs, rhs)
                    .ok_or_else(|| format!("cannot order {} against {}", lhs, rhs))?;
                Ok(match self {
                    Self::Gt => ordering == Ordering::Greater,
                    Self::Ge => ordering != Ordering::Less,
                    Self::Lt => ordering == Ordering::Less,
                    _ => ordering != Ordering::Greater,
                })
            }
        }
    }
}

impl fmt::Display for Comparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => compare_numbers(x, y) == Some(Ordering::Equal),
        _ => a == b,
    }
}

fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => compare_numbers(x, y),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

/// Integers compare exactly; `f64` only when either side is a float.
fn compare_numbers(x: &Number, y: &Number) -> Option<Ordering> {
    if x.is_f64() || y.is_f64() {
        return x.as_f64()?.partial_cmp(&y.as_f64()?);
    }
    let exact = |n: &Number| n.as_i64().map(i128::from).or_else(|| n.as_u64().map(i128::from));
    Some(exact(x)?.cmp(&exact(y)?))
}

/// One side of a field constraint.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// Path into the candidate descriptor
    Reference(Vec<String>),
    Literal(Value),
}

impl Operand {
    fn resolve<'a>(&'a self, candidate: &'a Value) -> Option<&'a Value> {
        match self {
            Self::Reference(path) => path
                .iter()
                .try_fold(candidate, |current, segment| current.get(segment.as_str())),
            Self::Literal(value) => Some(value),
        }
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Reference(path) => write!(f, "${}", path.join(".")),
            Self::Literal(value) => write!(f, "{}", value),
        }
    }
}

/// An executable field constraint.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledFieldConstraint {
    pub field: String,
    /// Source expression, kept for audit
    pub expression: String,
    pub rule: String,
    pub enforcement: RuleEnforcement,
    pub lhs: Operand,
    pub op: Comparison,
    pub rhs: Operand,
}

impl CompiledFieldConstraint {
    /// Evaluate against a candidate descriptor (a JSON object).
    ///
    /// `required` carries the right operand and `actual` the left operand as
    /// resolved from the candidate.
    pub fn evaluate(&self, candidate: &Value) -> CheckResult<Value> {
        let lhs = match self.lhs.resolve(candidate) {
            Some(value) => value.clone(),
            None => {
                return self.reject(
                    format!("reference {} not present in candidate", self.lhs),
                    None,
                    None,
                )
            }
        };
        let rhs = match self.rhs.resolve(candidate) {
            Some(value) => value.clone(),
            None => {
                return self.reject(
                    format!("reference {} not present in candidate", self.rhs),
                    None,
                    Some(lhs),
                )
            }
        };

        match self.op.apply(&lhs, &rhs) {
            Ok(true) => CheckResult::allow(Some(rhs), Some(lhs)),
            Ok(false) => self.reject(
                format!("{} {} {} does not hold", lhs, self.op, rhs),
                Some(rhs),
                Some(lhs),
            ),
            Err(detail) => self.reject(detail, Some(rhs), Some(lhs)),
        }
    }

    fn reject(&self, detail: String, required: Option<Value>, actual: Option<Value>) -> CheckResult<Value> {
        let reason = format!(
            "field `{}` violates `{}` (rule {}): {}",
            self.field, self.expression, self.rule, detail
        );
        match self.enforcement {
            RuleEnforcement::Strict => CheckResult::deny(reason, required, actual),
            RuleEnforcement::Advisory => {
                CheckResult::allow(required, actual).with_reason(format!("advisory: {}", reason))
            }
        }
    }
}

/// Compile one field constraint expression as a strict constraint.
pub fn compile_field_expression(field: &str, expression: &str) -> Result<CompiledFieldConstraint> {
    let target = format!("field `{}`", field);
    let error = |reason: String| GovernanceError::compilation(&target, reason);

    let (first, after_first) =
        leading_literal(expression).unwrap_or_else(|| next_token(expression));
    if first.is_empty() {
        return Err(error("empty expression".to_string()));
    }

    let (lhs, rest) = if first == "not" || Comparison::parse(first).is_some() {
        let implicit = parse_operand(&format!("${}", field)).map_err(error)?;
        (implicit, expression.trim())
    } else {
        (parse_operand(first).map_err(error)?, after_first)
    };

    let (op_token, rest) = next_token(rest);
    if op_token.is_empty() {
        return Err(error(format!("missing operator in `{}`", expression)));
    }
    let (op, rest) = if op_token == "not" {
        match next_token(rest) {
            ("in", rest) => (Comparison::NotIn, rest),
            _ => return Err(error(format!("unknown constraint operator `{}`", op_token))),
        }
    } else {
        let op = Comparison::parse(op_token)
            .ok_or_else(|| error(format!("unknown constraint operator `{}`", op_token)))?;
        (op, rest)
    };

    let rhs_text = rest.trim();
    if rhs_text.is_empty() {
        return Err(error(format!("missing right operand in `{}`", expression)));
    }
    let rhs = parse_operand(rhs_text).map_err(error)?;

    if let Operand::Literal(value) = &rhs {
        if op.is_membership() && !value.is_array() {
            return Err(error(format!("`{}` needs an array, got {}", op, value)));
        }
        if op.is_ordering() && !(value.is_number() || value.is_string()) {
            return Err(error(format!("`{}` needs a number or string, got {}", op, value)));
        }
    }
    if matches!((&lhs, &rhs), (Operand::Literal(_), Operand::Literal(_))) {
        return Err(error(format!("`{}` references no field", expression)));
    }

    Ok(CompiledFieldConstraint {
        field: field.to_string(),
        expression: expression.to_string(),
        rule: String::new(),
        enforcement: RuleEnforcement::Strict,
        lhs,
        op,
        rhs,
    })
}

/// Split off a leading JSON string, array or object literal, which may
/// contain whitespace.
fn leading_literal(text: &str) -> Option<(&str, &str)> {
    let text = text.trim_start();
    if !text.starts_with(|c| matches!(c, '"' | '[' | '{')) {
        return None;
    }
    let mut stream = serde_json::Deserializer::from_str(text).into_iter::<Value>();
    match stream.next() {
        Some(Ok(_)) => {
            let end = stream.byte_offset();
            Some((&text[..end], text[end..].trim_start()))
        }
        _ => None,
    }
}

/// Split off the first whitespace-delimited token.
fn next_token(text: &str) -> (&str, &str) {
    let text = text.trim_start();
    match text.find(char::is_whitespace) {
        Some(end) => (&text[..end], text[end..].trim_start()),
        None => (text, ""),
    }
}

fn parse_operand(token: &str) -> std::result::Result<Operand, String> {
    if let Some(path) = token.strip_prefix('$') {
        let segments: Vec<String> = path.split('.').map(str::to_string).collect();
        let valid = segments.iter().all(|s| {
            !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        });
        if !valid {
            return Err(format!("invalid field reference `{}`", token));
        }
        return Ok(Operand::Reference(segments));
    }

    match serde_json::from_str::<Value>(token) {
        Ok(value) => Ok(Operand::Literal(value)),
        Err(_) if token.chars().all(|c| c.is_ascii_punctuation()) => {
            Err(format!("unknown constraint operator `{}`", token))
        }
        Err(e) => Err(format!("invalid literal `{}`: {}", token, e)),
    }
}

/// Effective permission for one (action, role) cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatrixCell {
    pub required_operator: EdgeOperator,
    pub allowed: bool,
}

/// Executable form of a [`GovernanceFramework`], keyed by its SAID.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledFramework {
    said: String,
    edges: BTreeMap<String, EdgeRequirement>,
    fields: BTreeMap<String, Vec<CompiledFieldConstraint>>,
    matrix: BTreeMap<(String, String), MatrixCell>,
}

impl CompiledFramework {
    /// SAID of the source framework.
    pub fn said(&self) -> &str {
        &self.said
    }

    pub fn required_operator(&self, label: &str) -> Option<EdgeOperator> {
        self.edges.get(label).map(|e| e.required_operator)
    }

    pub fn edge(&self, label: &str) -> Option<&EdgeRequirement> {
        self.edges.get(label)
    }

    pub fn edge_labels(&self) -> impl Iterator<Item = &str> {
        self.edges.keys().map(String::as_str)
    }

    pub fn field_constraints(&self, field: &str) -> Option<&[CompiledFieldConstraint]> {
        self.fields.get(field).map(|v| v.as_slice())
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn matrix_cell(&self, action: &str, role: &str) -> Option<MatrixCell> {
        self.matrix
            .get(&(action.to_string(), role.to_string()))
            .copied()
    }

    /// Number of compiled edge, field and matrix constraints.
    pub fn constraint_count(&self) -> usize {
        self.edges.len() + self.fields.values().map(Vec::len).sum::<usize>() + self.matrix.len()
    }
}

/// Compile a framework. Pure and deterministic.
pub fn compile_framework(framework: &GovernanceFramework) -> Result<CompiledFramework> {
    let mut fields: BTreeMap<String, Vec<CompiledFieldConstraint>> = BTreeMap::new();
    for (field, specs) in framework.fields() {
        let compiled = specs
            .iter()
            .map(|spec| {
                compile_field_expression(field, &spec.expression).map(|c| CompiledFieldConstraint {
                    rule: spec.rule.clone(),
                    enforcement: spec.enforcement,
                    ..c
                })
            })
            .collect::<Result<Vec<_>>>()?;
        fields.insert(field.clone(), compiled);
    }

    let mut matrix = BTreeMap::new();
    for entry in framework.credential_matrix() {
        let key = (entry.action.clone(), entry.role.clone());
        let cell = MatrixCell {
            required_operator: entry.required_operator,
            allowed: entry.allowed,
        };
        if matrix.insert(key, cell).is_some() {
            return Err(GovernanceError::compilation(
                &format!("matrix cell {}/{}", entry.action, entry.role),
                "declared more than once",
            ));
        }
    }

    Ok(CompiledFramework {
        said: framework.said().to_string(),
        edges: framework.edges().clone(),
        fields,
        matrix,
    })
}

/// Compiler with a per-SAID cache. Frameworks never mutate, so a compiled
/// framework is never recompiled.
#[derive(Default)]
pub struct ConstraintCompiler {
    cache: DashMap<String, Arc<CompiledFramework>>,
}

impl ConstraintCompiler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compile a framework, or return the cached compilation for its SAID.
    pub fn compile(&self, framework: &GovernanceFramework) -> Result<Arc<CompiledFramework>> {
        if let Some(compiled) = self.cache.get(framework.said()) {
            debug!(said = %framework.said(), "Compiled framework cache hit");
            return Ok(Arc::clone(&compiled));
        }

        let compiled = Arc::new(compile_framework(framework)?);
        info!(
            said = %framework.said(),
            constraints = compiled.constraint_count(),
            "Compiled governance framework"
        );

        let entry = self
            .cache
            .entry(framework.said().to_string())
            .or_insert(compiled);
        Ok(Arc::clone(&entry))
    }

    pub fn is_cached(&self, said: &str) -> bool {
        self.cache.contains_key(said)
    }

    pub fn cached_count(&self) -> usize {
        self.cache.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::framework::ConstraintRule;
    use serde_json::json;

    fn framework() -> GovernanceFramework {
        GovernanceFramework::builder("Test")
            .said("ETest")
            .rule(
                ConstraintRule::new("jurisdiction-match", "qvi_issue", EdgeOperator::DI2I)
                    .with_field_constraint("jurisdiction", "$issuer.jurisdiction == $subject.country"),
            )
            .rule(
                ConstraintRule::new("country-list", "le_issue", EdgeOperator::NI2I)
                    .with_field_constraint("country", "in [\"US\", \"CA\"]"),
            )
            .build()
            .unwrap()
    }

    #[test]
    fn test_compile_framework() {
        let compiled = compile_framework(&framework()).unwrap();
        assert_eq!(compiled.said(), "ETest");
        assert_eq!(compiled.required_operator("qvi_issue"), Some(EdgeOperator::DI2I));
        assert_eq!(compiled.required_operator("missing"), None);
        assert_eq!(compiled.field_names().collect::<Vec<_>>(), vec!["country", "jurisdiction"]);
        assert_eq!(compiled.constraint_count(), 4);
    }

    #[test]
    fn test_compilation_is_deterministic() {
        let a = compile_framework(&framework()).unwrap();
        let b = compile_framework(&framework()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_parse_explicit_and_implicit_lhs() {
        let explicit = compile_field_expression("jurisdiction", "$issuer.jurisdiction == $subject.country")
            .unwrap();
        assert_eq!(
            explicit.lhs,
            Operand::Reference(vec!["issuer".into(), "jurisdiction".into()])
        );
        assert_eq!(explicit.op, Comparison::Eq);

        let implicit = compile_field_expression("country", "not in [\"KP\"]").unwrap();
        assert_eq!(implicit.lhs, Operand::Reference(vec!["country".into()]));
        assert_eq!(implicit.op, Comparison::NotIn);
        assert_eq!(implicit.rhs, Operand::Literal(json!(["KP"])));
    }

    #[test]
    fn test_unknown_operator_fails_at_compile_time() {
        for expression in ["$a ~= 3", "~= 3", "$a not 3", "$a LIKE \"x\""] {
            let err = compile_field_expression("a", expression).unwrap_err();
            assert!(
                matches!(err, GovernanceError::Compilation { .. }),
                "{} should fail to compile",
                expression
            );
        }

        let bad = GovernanceFramework::builder("Bad")
            .said("EBad")
            .rule(ConstraintRule::new("r", "e", EdgeOperator::Any).with_field_constraint("f", "$f =~ 1"))
            .build()
            .unwrap();
        let err = compile_framework(&bad).unwrap_err();
        assert!(err.to_string().contains("unknown constraint operator"));
    }

    #[test]
    fn test_malformed_expressions_fail() {
        assert!(compile_field_expression("a", "").is_err());
        assert!(compile_field_expression("a", "$a ==").is_err());
        assert!(compile_field_expression("a", "$a. == 1").is_err());
        assert!(compile_field_expression("a", "in \"US\"").is_err());
        assert!(compile_field_expression("a", "> true").is_err());
        assert!(compile_field_expression("a", "1 == 1").is_err());
        assert!(compile_field_expression("a", "== nope").is_err());
    }

    #[test]
    fn test_evaluate_sibling_reference() {
        let constraint =
            compile_field_expression("jurisdiction", "$issuer.jurisdiction == $subject.country").unwrap();

        let matching = json!({ "issuer": { "jurisdiction": "US" }, "subject": { "country": "US" } });
        let result = constraint.evaluate(&matching);
        assert!(result.allowed);
        assert_eq!(result.actual, Some(json!("US")));

        let mismatched = json!({ "issuer": { "jurisdiction": "US" }, "subject": { "country": "DE" } });
        let result = constraint.evaluate(&mismatched);
        assert!(!result.allowed);
        assert!(result.reason.unwrap().contains("does not hold"));
    }

    #[test]
    fn test_missing_reference_denies() {
        let constraint = compile_field_expression("country", "in [\"US\"]").unwrap();
        let result = constraint.evaluate(&json!({}));
        assert!(!result.allowed);
        assert!(result.reason.unwrap().contains("not present"));
    }

    #[test]
    fn test_ordering_and_numbers() {
        let constraint = compile_field_expression("expiry", "$subject.expiry > $now.timestamp").unwrap();
        let fresh = json!({ "subject": { "expiry": 2_000 }, "now": { "timestamp": 1_000 } });
        let stale = json!({ "subject": { "expiry": 500 }, "now": { "timestamp": 1_000 } });
        let incomparable = json!({ "subject": { "expiry": "soon" }, "now": { "timestamp": 1_000 } });

        assert!(constraint.evaluate(&fresh).allowed);
        assert!(!constraint.evaluate(&stale).allowed);
        assert!(constraint.evaluate(&incomparable).reason.unwrap().contains("cannot order"));

        let eq = compile_field_expression("level", "== 2").unwrap();
        assert!(eq.evaluate(&json!({ "level": 2.0 })).allowed);
    }

    #[test]
    fn test_large_integers_compare_exactly() {
        let candidate: Value = serde_json::from_str(r#"{ "id": 9007199254740992 }"#).unwrap();

        let eq = compile_field_expression("id", "== 9007199254740993").unwrap();
        assert!(!eq.evaluate(&candidate).allowed);
        let ne = compile_field_expression("id", "!= 9007199254740993").unwrap();
        assert!(ne.evaluate(&candidate).allowed);
        let gt = compile_field_expression("id", "< 9007199254740993").unwrap();
        assert!(gt.evaluate(&candidate).allowed);

        let near_max: Value = serde_json::from_str(r#"{ "id": 18446744073709551614 }"#).unwrap();
        let member = compile_field_expression("id", "in [18446744073709551615]").unwrap();
        assert!(!member.evaluate(&near_max).allowed);
        let excluded = compile_field_expression("id", "not in [18446744073709551615]").unwrap();
        assert!(excluded.evaluate(&near_max).allowed);

        // Signed against unsigned beyond i64
        let negative = compile_field_expression("id", "> -1").unwrap();
        assert!(negative.evaluate(&near_max).allowed);
    }

    #[test]
    fn test_implicit_operand_on_nested_field() {
        let constraint = compile_field_expression("subject.country", "in [\"US\"]").unwrap();
        assert_eq!(
            constraint.lhs,
            Operand::Reference(vec!["subject".into(), "country".into()])
        );
        assert!(constraint.evaluate(&json!({ "subject": { "country": "US" } })).allowed);

        let result = constraint.evaluate(&json!({ "subject": { "country": "FR" } }));
        assert!(!result.allowed);
        assert!(result.reason.unwrap().contains("does not hold"));

        assert!(compile_field_expression("subject..country", "== 1").is_err());
    }

    #[test]
    fn test_left_literal_with_spaces() {
        let constraint = compile_field_expression("city", "\"New York\" == $city").unwrap();
        assert_eq!(constraint.lhs, Operand::Literal(json!("New York")));
        assert_eq!(constraint.rhs, Operand::Reference(vec!["city".into()]));
        assert!(constraint.evaluate(&json!({ "city": "New York" })).allowed);
        assert!(!constraint.evaluate(&json!({ "city": "York" })).allowed);

        let listed = compile_field_expression("city", "[\"New York\", \"Boston\"] != $city").unwrap();
        assert!(listed.evaluate(&json!({ "city": "Boston" })).allowed);
    }

    #[test]
    fn test_advisory_constraint_never_denies() {
        let constraint = CompiledFieldConstraint {
            enforcement: RuleEnforcement::Advisory,
            ..compile_field_expression("freshness", "!= \"\"").unwrap()
        };
        let result = constraint.evaluate(&json!({ "freshness": "" }));
        assert!(result.allowed);
        assert!(result.reason.unwrap().starts_with("advisory:"));
    }

    #[test]
    fn test_duplicate_matrix_cell_fails() {
        use crate::framework::CredentialMatrixEntry;

        let cell = CredentialMatrixEntry {
            action: "issue".into(),
            role: "QVI".into(),
            required_operator: EdgeOperator::DI2I,
            allowed: true,
        };
        let framework = GovernanceFramework::builder("Dup")
            .said("EDup")
            .matrix_entries(vec![cell.clone(), cell])
            .build()
            .unwrap();
        assert!(compile_framework(&framework).is_err());
    }

    #[test]
    fn test_compiler_caches_by_said() {
        let compiler = ConstraintCompiler::new();
        let framework = framework();

        let first = compiler.compile(&framework).unwrap();
        let second = compiler.compile(&framework).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert!(compiler.is_cached("ETest"));
        assert_eq!(compiler.cached_count(), 1);
    }
}
