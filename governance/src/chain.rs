//! Supersession chains.
//!
//! Each framework version points back at the version it replaces. A chain is
//! that lineage, resolved and ordered newest first.

use std::sync::Arc;

use crate::framework::GovernanceFramework;

/// A resolved framework lineage, newest (index 0) to oldest.
#[derive(Debug, Clone, Default)]
pub struct VersionChain {
    versions: Vec<Arc<GovernanceFramework>>,
}

impl VersionChain {
    pub(crate) fn new(versions: Vec<Arc<GovernanceFramework>>) -> Self {
        Self { versions }
    }

    /// The newest known version.
    pub fn active(&self) -> Option<&Arc<GovernanceFramework>> {
        self.versions.first()
    }

    pub fn active_said(&self) -> Option<&str> {
        self.active().map(|f| f.said())
    }

    /// The original version.
    pub fn root(&self) -> Option<&Arc<GovernanceFramework>> {
        self.versions.last()
    }

    pub fn depth(&self) -> usize {
        self.versions.len()
    }

    pub fn contains(&self, said: &str) -> bool {
        self.versions.iter().any(|v| v.said() == said)
    }

    pub fn get_version(&self, said: &str) -> Option<&Arc<GovernanceFramework>> {
        self.versions.iter().find(|v| v.said() == said)
    }

    /// All SAIDs, newest first.
    pub fn saids(&self) -> Vec<&str> {
        self.versions.iter().map(|v| v.said()).collect()
    }

    pub fn versions(&self) -> &[Arc<GovernanceFramework>] {
        &self.versions
    }

    pub fn into_active(self) -> Option<Arc<GovernanceFramework>> {
        self.versions.into_iter().next()
    }
}
