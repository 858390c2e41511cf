//! REST v4 payloads, reduced to the fields the exporter reads.

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::fetcher::CommitSummary;
use crate::schemas::{Deployment, Environment, RefKind};

#[derive(Debug, Deserialize)]
pub struct ApiProject {
    pub path_with_namespace: String,
}

/// A branch or a tag.
#[derive(Debug, Deserialize)]
pub struct ApiRef {
    pub name: String,
    pub commit: Option<ApiCommit>,
}

#[derive(Debug, Deserialize)]
pub struct ApiMergeRequest {
    pub iid: u64,
}

#[derive(Debug, Deserialize)]
pub struct ApiPipelineSummary {
    pub id: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiCommit {
    pub short_id: String,
    pub committed_date: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct ApiCompare {
    #[serde(default)]
    pub commits: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
pub struct ApiEnvironmentSummary {
    pub id: u64,
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct ApiEnvironment {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub external_url: Option<String>,
    /// `available` or `stopped`
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub last_deployment: Option<ApiDeployment>,
}

#[derive(Debug, Deserialize)]
pub struct ApiDeployment {
    #[serde(rename = "ref")]
    pub ref_name: String,
    #[serde(default)]
    pub status: String,
    pub created_at: Option<DateTime<Utc>>,
    pub user: Option<ApiUser>,
    pub deployable: Option<ApiDeployable>,
    pub sha: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ApiUser {
    pub username: String,
}

/// The job that ran the deployment.
#[derive(Debug, Deserialize)]
pub struct ApiDeployable {
    #[serde(default)]
    pub tag: bool,
    pub duration: Option<f64>,
    pub commit: Option<ApiDeployableCommit>,
}

#[derive(Debug, Deserialize)]
pub struct ApiDeployableCommit {
    pub short_id: String,
}

impl From<ApiCommit> for CommitSummary {
    fn from(commit: ApiCommit) -> Self {
        Self {
            short_id: commit.short_id,
            committed_date: commit.committed_date,
        }
    }
}

impl ApiEnvironment {
    pub fn into_environment(self, project_name: &str) -> Environment {
        let latest_deployment = self.last_deployment.map(|d| {
            let deployable = d.deployable;
            let commit_short_id = deployable
                .as_ref()
                .and_then(|job| job.commit.as_ref())
                .map(|c| c.short_id.clone())
                .or_else(|| d.sha.map(|sha| sha.chars().take(8).collect()))
                .unwrap_or_default();

            Deployment {
                ref_kind: if deployable.as_ref().is_some_and(|job| job.tag) {
                    RefKind::Tag
                } else {
                    RefKind::Branch
                },
                ref_name: d.ref_name,
                username: d.user.map(|u| u.username).unwrap_or_default(),
                commit_short_id,
                created_at: d.created_at,
                duration_seconds: deployable.and_then(|job| job.duration).unwrap_or(0.0),
                status: d.status,
            }
        });

        Environment {
            project_name: project_name.to_string(),
            name: self.name,
            id: self.id,
            external_url: self.external_url.unwrap_or_default(),
            available: self.state == "available",
            latest_deployment,
            ..Environment::default()
        }
    }
}
