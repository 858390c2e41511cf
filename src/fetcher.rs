use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::config::Wildcard;
use crate::error::Result;
use crate::schemas::{Environment, Project, Ref, RefKind};

/// Pipeline as returned by the upstream API, before derivation.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct UpstreamPipeline {
    pub id: u64,
    pub coverage: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    /// Run duration in seconds
    pub duration: Option<u64>,
    pub status: String,
}

/// Identity of an environment as listed for a project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvironmentSummary {
    pub id: u64,
    pub name: String,
}

/// A commit, as needed to compare what is deployed against what is available.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitSummary {
    pub short_id: String,
    pub committed_date: DateTime<Utc>,
}

/// Read-only access to the upstream CI/CD API.
///
/// Every call may fail with a transport or HTTP error; callers abort the
/// current task and leave their state untouched.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Projects matching a wildcard's search and owner, pull config attached.
    async fn list_wildcard_projects(&self, wildcard: &Wildcard) -> Result<Vec<Project>>;

    /// Names of the branches, tags or open merge request IIDs of a project.
    async fn list_ref_names(&self, project_name: &str, kind: RefKind) -> Result<Vec<String>>;

    /// Environments of a project whose name matches `name_regexp`.
    async fn list_environments(
        &self,
        project_name: &str,
        name_regexp: &str,
    ) -> Result<Vec<EnvironmentSummary>>;

    /// Full environment detail, latest deployment included.
    async fn get_environment(&self, project_name: &str, environment_id: u64)
        -> Result<Environment>;

    /// Most recent pipeline of a ref, `None` when it never ran.
    async fn get_latest_pipeline(&self, r: &Ref) -> Result<Option<UpstreamPipeline>>;

    async fn get_branch_latest_commit(
        &self,
        project_name: &str,
        branch: &str,
    ) -> Result<CommitSummary>;

    /// Commit of the most recent tag whose name matches `tags_regexp`.
    async fn get_most_recent_tag_commit(
        &self,
        project_name: &str,
        tags_regexp: &str,
    ) -> Result<CommitSummary>;

    /// Number of commits reachable from `to` but not from `from`.
    async fn get_commit_count_between_refs(
        &self,
        project_name: &str,
        from: &str,
        to: &str,
    ) -> Result<u64>;
}
