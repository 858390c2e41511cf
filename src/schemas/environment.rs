use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{EnvironmentKey, Labels, RefKind};

/// A deployment environment of a project.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Environment {
    pub project_name: String,
    pub name: String,
    /// GitLab numeric ID, 0 until resolved
    pub id: u64,
    pub external_url: String,
    pub available: bool,
    /// Tags considered when looking up the latest commit of a tag deployment
    pub tags_regexp: String,
    pub latest_deployment: Option<Deployment>,
    /// Latest commit of the deployed ref, resolved on each metrics pull
    #[serde(default)]
    pub latest_commit_short_id: String,
}

/// Summary of the most recent deployment to an environment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Deployment {
    pub ref_kind: RefKind,
    pub ref_name: String,
    pub username: String,
    pub commit_short_id: String,
    pub created_at: Option<DateTime<Utc>>,
    pub duration_seconds: f64,
    pub status: String,
}

impl Environment {
    pub fn new(project_name: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            project_name: project_name.into(),
            name: name.into(),
            ..Self::default()
        }
    }

    /// The numeric ID is an attribute: deployment hooks only carry the name.
    pub fn key(&self) -> EnvironmentKey {
        EnvironmentKey(format!("{}:{}", self.project_name, self.name))
    }

    /// Labels shared by every series of this environment.
    pub fn default_labels(&self) -> Labels {
        Labels::from([
            ("project".to_string(), self.project_name.clone()),
            ("environment".to_string(), self.name.clone()),
        ])
    }

    /// Labels of the information series, describing what is currently deployed.
    pub fn information_labels(&self) -> Labels {
        let mut labels = self.default_labels();
        let deployment = self.latest_deployment.as_ref();

        labels.extend([
            ("environment_id".to_string(), self.id.to_string()),
            ("external_url".to_string(), self.external_url.clone()),
            ("available".to_string(), self.available.to_string()),
            (
                "kind".to_string(),
                deployment.map_or_else(String::new, |d| d.ref_kind.to_string()),
            ),
            (
                "ref".to_string(),
                deployment.map_or_else(String::new, |d| d.ref_name.clone()),
            ),
            (
                "username".to_string(),
                deployment.map_or_else(String::new, |d| d.username.clone()),
            ),
            (
                "current_commit_short_id".to_string(),
                deployment.map_or_else(String::new, |d| d.commit_short_id.clone()),
            ),
            (
                "latest_commit_short_id".to_string(),
                self.latest_commit_short_id.clone(),
            ),
        ]);

        labels
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn deployment(commit: &str) -> Deployment {
        Deployment {
            ref_kind: RefKind::Branch,
            ref_name: "main".to_string(),
            username: "jdoe".to_string(),
            commit_short_id: commit.to_string(),
            created_at: None,
            duration_seconds: 12.0,
            status: "success".to_string(),
        }
    }

    #[test]
    fn test_key_ignores_id_and_deployment() {
        let mut resolved = Environment::new("group/app", "production");
        resolved.id = 7;
        resolved.latest_deployment = Some(deployment("abc1234"));

        let from_hook = Environment::new("group/app", "production");
        assert_eq!(resolved.key(), from_hook.key());
        assert_eq!(from_hook.key().as_str(), "group/app:production");
    }

    #[test]
    fn test_information_labels_carry_both_commits() {
        let mut env = Environment::new("group/app", "production");
        env.id = 7;
        env.latest_deployment = Some(deployment("abc1234"));
        env.latest_commit_short_id = "def5678".to_string();

        let labels = env.information_labels();
        assert_eq!(labels["environment_id"], "7");
        assert_eq!(labels["current_commit_short_id"], "abc1234");
        assert_eq!(labels["latest_commit_short_id"], "def5678");
        assert_eq!(labels["kind"], "branch");
        assert_eq!(labels["project"], "group/app");
    }

    #[test]
    fn test_information_labels_without_deployment() {
        let env = Environment::new("group/app", "review");
        let labels = env.information_labels();
        assert_eq!(labels["ref"], "");
        assert_eq!(labels["current_commit_short_id"], "");
        assert_eq!(labels["available"], "false");
    }
}
