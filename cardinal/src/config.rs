//! Override configuration for cardinal rules.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::rules::CardinalRule;

/// Errors loading a cardinal configuration.
#[derive(Debug, Error)]
pub enum CardinalConfigError {
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid config: {0}")]
    Parse(#[from] serde_yaml::Error),
}

/// Deployment overrides merged over the default cardinal rules.
///
/// ```yaml
/// overrides:
///   - artifact_type: sch
///     operation: execute
///     min_strength: SAID_ONLY
///     rationale: Schemas are loaded by validators
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardinalConfig {
    #[serde(default)]
    pub overrides: Vec<CardinalRule>,
}

impl CardinalConfig {
    /// Builder: add an override.
    pub fn with_override(mut self, rule: CardinalRule) -> Self {
        self.overrides.push(rule);
        self
    }

    /// Load config from YAML.
    pub fn from_yaml(yaml: &str) -> Result<Self, CardinalConfigError> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Load config from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, CardinalConfigError> {
        let yaml = std::fs::read_to_string(path)?;
        Self::from_yaml(&yaml)
    }

    /// Serialize to YAML.
    pub fn to_yaml(&self) -> Result<String, CardinalConfigError> {
        Ok(serde_yaml::to_string(self)?)
    }
}
