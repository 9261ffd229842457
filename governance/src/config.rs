//! Configuration for framework resolution.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Resolver configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolverConfig {
    /// Upper bound on a single collaborator fetch (ms); unbounded if absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fetch_timeout_ms: Option<u64>,
}

impl ResolverConfig {
    /// Builder: bound every fetch by `timeout`.
    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    pub fn fetch_timeout(&self) -> Option<Duration> {
        self.fetch_timeout_ms.map(Duration::from_millis)
    }

    /// Load config from YAML.
    pub fn from_yaml(yaml: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(yaml)
    }

    /// Serialize to YAML.
    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ResolverConfig::default();
        assert_eq!(config.fetch_timeout(), None);
    }

    #[test]
    fn test_yaml_roundtrip() {
        let config = ResolverConfig::default().with_fetch_timeout(Duration::from_secs(5));
        let yaml = config.to_yaml().unwrap();
        let parsed = ResolverConfig::from_yaml(&yaml).unwrap();
        assert_eq!(parsed.fetch_timeout(), Some(Duration::from_secs(5)));
    }

    #[test]
    fn test_yaml_defaults_missing_fields() {
        let parsed = ResolverConfig::from_yaml("{}").unwrap();
        assert_eq!(parsed, ResolverConfig::default());
    }
}
