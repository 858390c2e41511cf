use serde::{Deserialize, Serialize};

use super::ProjectKey;
use crate::config::ProjectPull;

/// A GitLab project, identified by its path with namespace.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    /// Path with namespace (e.g., "group/project")
    pub name: String,
    /// Which refs and environments of the project are tracked
    pub pull: ProjectPull,
}

impl Project {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            pull: ProjectPull::default(),
        }
    }

    pub fn with_pull(name: impl Into<String>, pull: ProjectPull) -> Self {
        Self {
            name: name.into(),
            pull,
        }
    }

    pub fn key(&self) -> ProjectKey {
        ProjectKey(self.name.clone())
    }
}
