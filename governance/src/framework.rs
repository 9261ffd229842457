//! Governance framework data model.
//!
//! A governance framework is itself a credential: an immutable record named by
//! its self-addressing identifier (SAID). It declares which edge operator each
//! credential-graph edge label requires and which constraints apply to
//! credential fields. A new version is always a new SAID that points back at
//! its predecessor; a framework is never edited in place, so every field here
//! is private and read through accessors.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use sha2::{Digest, Sha256};

use crate::primitives::{ConstraintOrder, EdgeOperator};
use crate::types::{GovernanceError, Result};

/// Schema tag carried by framework credentials.
pub const FRAMEWORK_SCHEMA: &str = "GovernanceFramework";

/// How a rule's field constraints are enforced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleEnforcement {
    /// Violations deny
    #[default]
    Strict,
    /// Violations are reported but allowed
    Advisory,
}

/// A declarative rule as it appears in a framework credential.
///
/// Edge operator requirements are always enforced; `enforcement` governs the
/// rule's field constraints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConstraintRule {
    /// Rule name, unique within a framework by convention
    pub name: String,
    /// Human-readable description
    #[serde(default)]
    pub description: String,
    /// Edge label this rule governs
    pub applies_to: String,
    /// Minimum operator for traversing the edge
    pub required_operator: EdgeOperator,
    /// Field name -> constraint expression
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub field_constraints: BTreeMap<String, String>,
    /// Maximum delegation chain length through this edge
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_delegation_depth: Option<u32>,
    #[serde(default)]
    pub enforcement: RuleEnforcement,
}

impl ConstraintRule {
    /// Create a strict rule requiring `required_operator` on `applies_to`.
    pub fn new(
        name: impl Into<String>,
        applies_to: impl Into<String>,
        required_operator: EdgeOperator,
    ) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            applies_to: applies_to.into(),
            required_operator,
            field_constraints: BTreeMap::new(),
            max_delegation_depth: None,
            enforcement: RuleEnforcement::Strict,
        }
    }

    /// Builder: set description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Builder: add a field constraint expression.
    pub fn with_field_constraint(
        mut self,
        field: impl Into<String>,
        expression: impl Into<String>,
    ) -> Self {
        self.field_constraints.insert(field.into(), expression.into());
        self
    }

    /// Builder: limit delegation depth.
    pub fn with_max_delegation_depth(mut self, depth: u32) -> Self {
        self.max_delegation_depth = Some(depth);
        self
    }

    /// Builder: set enforcement.
    pub fn with_enforcement(mut self, enforcement: RuleEnforcement) -> Self {
        self.enforcement = enforcement;
        self
    }
}

/// One cell of a role/action authorization matrix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialMatrixEntry {
    pub action: String,
    pub role: String,
    pub required_operator: EdgeOperator,
    #[serde(default = "default_allowed")]
    pub allowed: bool,
}

fn default_allowed() -> bool {
    true
}

/// The effective requirement on one edge label, merged across every rule
/// naming it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeRequirement {
    /// Strongest operator required by any contributing rule
    pub required_operator: EdgeOperator,
    /// Tightest delegation depth limit, if any rule sets one
    pub max_delegation_depth: Option<u32>,
    /// Names of contributing rules
    pub rules: Vec<String>,
}

/// One declared constraint on a credential field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldConstraintSpec {
    pub field: String,
    pub expression: String,
    /// Rule that declared the constraint
    pub rule: String,
    pub enforcement: RuleEnforcement,
}

/// Attribute section (`a`) of a framework credential.
#[derive(Debug, Deserialize)]
struct FrameworkAttributes {
    #[serde(default)]
    name: String,
    #[serde(default = "default_version")]
    version: String,
    #[serde(default)]
    rules: Vec<ConstraintRule>,
    #[serde(default)]
    credential_matrix: Vec<CredentialMatrixEntry>,
    #[serde(default)]
    authorities: BTreeMap<String, Vec<String>>,
}

fn default_version() -> String {
    "1.0.0".to_string()
}

/// A resolved, immutable governance framework.
#[derive(Debug, Clone, PartialEq)]
pub struct GovernanceFramework {
    said: String,
    name: String,
    version: String,
    steward: Option<String>,
    supersedes: Option<String>,
    delegator: Option<String>,
    rules: Vec<ConstraintRule>,
    credential_matrix: Vec<CredentialMatrixEntry>,
    authorities: BTreeMap<String, Vec<String>>,
    edges: BTreeMap<String, EdgeRequirement>,
    fields: BTreeMap<String, Vec<FieldConstraintSpec>>,
}

impl GovernanceFramework {
    /// Parse a framework credential fetched for `expected_said`.
    ///
    /// The credential must carry `expected_said` as its own identifier;
    /// every operator code must be a known [`EdgeOperator`].
    pub fn from_credential(expected_said: &str, raw: &Value) -> Result<Self> {
        let malformed = |reason: String| GovernanceError::malformed(expected_said, reason);

        let object = raw
            .as_object()
            .ok_or_else(|| malformed("credential is not a JSON object".to_string()))?;

        let said = object
            .get("d")
            .and_then(Value::as_str)
            .ok_or_else(|| malformed("credential has no SAID (`d`)".to_string()))?;
        if said != expected_said {
            return Err(malformed(format!("credential carries SAID {}", said)));
        }

        let steward = optional_str(object, "i").map_err(malformed)?;

        let attributes = object
            .get("a")
            .ok_or_else(|| malformed("credential has no attribute section (`a`)".to_string()))?;
        let attributes: FrameworkAttributes = serde_json::from_value(attributes.clone())
            .map_err(|e| malformed(format!("invalid attribute section: {}", e)))?;

        let (supersedes, delegator) = match object.get("e") {
            None | Some(Value::Null) => (None, None),
            Some(Value::Object(edges)) => (
                edge_reference(edges, "supersedes", "d").map_err(malformed)?,
                edge_reference(edges, "delegator", "i").map_err(malformed)?,
            ),
            Some(_) => return Err(malformed("edge section (`e`) is not an object".to_string())),
        };

        Self::assemble(
            said.to_string(),
            attributes.name,
            attributes.version,
            steward,
            supersedes,
            delegator,
            attributes.rules,
            attributes.credential_matrix,
            attributes.authorities,
        )
    }

    /// Start building a framework in memory.
    pub fn builder(name: impl Into<String>) -> FrameworkBuilder {
        FrameworkBuilder::new(name)
    }

    #[allow(clippy::too_many_arguments)]
    fn assemble(
        said: String,
        name: String,
        version: String,
        steward: Option<String>,
        supersedes: Option<String>,
        delegator: Option<String>,
        rules: Vec<ConstraintRule>,
        credential_matrix: Vec<CredentialMatrixEntry>,
        authorities: BTreeMap<String, Vec<String>>,
    ) -> Result<Self> {
        if supersedes.as_deref() == Some(said.as_str()) {
            return Err(GovernanceError::malformed(&said, "framework supersedes itself"));
        }

        let mut edges: BTreeMap<String, EdgeRequirement> = BTreeMap::new();
        let mut fields: BTreeMap<String, Vec<FieldConstraintSpec>> = BTreeMap::new();

        for rule in &rules {
            if rule.applies_to.trim().is_empty() {
                return Err(GovernanceError::malformed(
                    &said,
                    format!("rule `{}` has an empty edge label", rule.name),
                ));
            }

            let requirement = edges
                .entry(rule.applies_to.clone())
                .or_insert_with(|| EdgeRequirement {
                    required_operator: rule.required_operator,
                    max_delegation_depth: None,
                    rules: Vec::new(),
                });
            if rule.required_operator.rank() > requirement.required_operator.rank() {
                requirement.required_operator = rule.required_operator;
            }
            requirement.max_delegation_depth =
                match (requirement.max_delegation_depth, rule.max_delegation_depth) {
                    (Some(current), Some(limit)) => Some(current.min(limit)),
                    (current, limit) => current.or(limit),
                };
            requirement.rules.push(rule.name.clone());

            for (field, expression) in &rule.field_constraints {
                fields.entry(field.clone()).or_default().push(FieldConstraintSpec {
                    field: field.clone(),
                    expression: expression.clone(),
                    rule: rule.name.clone(),
                    enforcement: rule.enforcement,
                });
            }
        }

        for entry in &credential_matrix {
            if entry.action.trim().is_empty() || entry.role.trim().is_empty() {
                return Err(GovernanceError::malformed(
                    &said,
                    "credential matrix entry has an empty action or role",
                ));
            }
        }

        Ok(Self {
            said,
            name,
            version,
            steward,
            supersedes,
            delegator,
            rules,
            credential_matrix,
            authorities,
            edges,
            fields,
        })
    }

    /// Self-addressing identifier.
    pub fn said(&self) -> &str {
        &self.said
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// Issuer of the framework credential.
    pub fn steward(&self) -> Option<&str> {
        self.steward.as_deref()
    }

    /// SAID of the framework this version replaces.
    pub fn supersedes(&self) -> Option<&str> {
        self.supersedes.as_deref()
    }

    /// Authority that delegated governance to the steward.
    pub fn delegator(&self) -> Option<&str> {
        self.delegator.as_deref()
    }

    pub fn rules(&self) -> &[ConstraintRule] {
        &self.rules
    }

    pub fn credential_matrix(&self) -> &[CredentialMatrixEntry] {
        &self.credential_matrix
    }

    pub fn authorities(&self) -> &BTreeMap<String, Vec<String>> {
        &self.authorities
    }

    /// AIDs authorized for a role.
    pub fn authorities_for(&self, role: &str) -> &[String] {
        self.authorities
            .get(role)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    /// Edge label -> effective requirement.
    pub fn edges(&self) -> &BTreeMap<String, EdgeRequirement> {
        &self.edges
    }

    pub fn edge(&self, label: &str) -> Option<&EdgeRequirement> {
        self.edges.get(label)
    }

    /// Field name -> declared constraints.
    pub fn fields(&self) -> &BTreeMap<String, Vec<FieldConstraintSpec>> {
        &self.fields
    }

    /// Rules governing an edge label.
    pub fn rules_for<'a>(&'a self, label: &'a str) -> impl Iterator<Item = &'a ConstraintRule> {
        self.rules.iter().filter(move |r| r.applies_to == label)
    }

    /// Render the framework as a credential, the inverse of
    /// [`GovernanceFramework::from_credential`].
    pub fn to_credential(&self) -> Value {
        let mut edges = Map::new();
        if let Some(prior) = &self.supersedes {
            edges.insert("supersedes".to_string(), json!({ "d": prior }));
        }
        if let Some(delegator) = &self.delegator {
            edges.insert("delegator".to_string(), json!({ "i": delegator }));
        }

        let mut credential = json!({
            "d": self.said,
            "s": FRAMEWORK_SCHEMA,
            "a": {
                "name": self.name,
                "version": self.version,
                "rules": self.rules,
                "credential_matrix": self.credential_matrix,
                "authorities": self.authorities,
            },
            "e": edges,
        });
        if let (Some(steward), Some(object)) = (&self.steward, credential.as_object_mut()) {
            object.insert("i".to_string(), Value::String(steward.clone()));
        }
        credential
    }
}

fn optional_str(object: &Map<String, Value>, key: &str) -> std::result::Result<Option<String>, String> {
    match object.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(format!("`{}` is not a string", key)),
    }
}

fn edge_reference(
    edges: &Map<String, Value>,
    edge: &str,
    key: &str,
) -> std::result::Result<Option<String>, String> {
    match edges.get(edge) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Object(node)) => match node.get(key) {
            Some(Value::String(s)) if !s.is_empty() => Ok(Some(s.clone())),
            _ => Err(format!("edge `{}` has no `{}` reference", edge, key)),
        },
        Some(_) => Err(format!("edge `{}` is not an object", edge)),
    }
}

/// Compute a content-derived identifier for a credential.
///
/// The `d` field is blanked before hashing so the identifier can be embedded
/// in the content it names.
pub fn compute_said(credential: &Value) -> String {
    let mut content = credential.clone();
    if let Some(object) = content.as_object_mut() {
        object.insert("d".to_string(), Value::String(String::new()));
    }
    let canonical = serde_json::to_string(&content).unwrap_or_default();

    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    format!("E{}", hex::encode(hasher.finalize()))
}

/// In-memory construction of frameworks, for locally bundled frameworks and
/// rule patterns.
#[derive(Debug, Clone, Default)]
pub struct FrameworkBuilder {
    said: Option<String>,
    name: String,
    version: Option<String>,
    steward: Option<String>,
    supersedes: Option<String>,
    delegator: Option<String>,
    rules: Vec<ConstraintRule>,
    credential_matrix: Vec<CredentialMatrixEntry>,
    authorities: BTreeMap<String, Vec<String>>,
}

impl FrameworkBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Use an explicit SAID instead of computing one from content.
    pub fn said(mut self, said: impl Into<String>) -> Self {
        self.said = Some(said.into());
        self
    }

    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn steward(mut self, steward: impl Into<String>) -> Self {
        self.steward = Some(steward.into());
        self
    }

    pub fn supersedes(mut self, prior_said: impl Into<String>) -> Self {
        self.supersedes = Some(prior_said.into());
        self
    }

    pub fn delegator(mut self, delegator: impl Into<String>) -> Self {
        self.delegator = Some(delegator.into());
        self
    }

    pub fn rule(mut self, rule: ConstraintRule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn rules(mut self, rules: impl IntoIterator<Item = ConstraintRule>) -> Self {
        self.rules.extend(rules);
        self
    }

    pub fn matrix_entries(mut self, entries: impl IntoIterator<Item = CredentialMatrixEntry>) -> Self {
        self.credential_matrix.extend(entries);
        self
    }

    pub fn authority(mut self, role: impl Into<String>, aid: impl Into<String>) -> Self {
        self.authorities.entry(role.into()).or_default().push(aid.into());
        self
    }

    /// Validate and build. Without an explicit SAID the identifier is derived
    /// from the rendered credential.
    pub fn build(self) -> Result<GovernanceFramework> {
        let explicit_said = self.said;
        let framework = GovernanceFramework::assemble(
            explicit_said.clone().unwrap_or_default(),
            self.name,
            self.version.unwrap_or_else(default_version),
            self.steward,
            self.supersedes,
            self.delegator,
            self.rules,
            self.credential_matrix,
            self.authorities,
        )?;

        match explicit_said {
            Some(_) => Ok(framework),
            None => {
                let said = compute_said(&framework.to_credential());
                if framework.supersedes.as_deref() == Some(said.as_str()) {
                    return Err(GovernanceError::malformed(&said, "framework supersedes itself"));
                }
                Ok(GovernanceFramework { said, ..framework })
            }
        }
    }
}
