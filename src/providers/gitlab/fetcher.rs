use async_trait::async_trait;

use super::GitLabClient;
use crate::config::Wildcard;
use crate::error::Result;
use crate::fetcher::{CommitSummary, EnvironmentSummary, Fetcher, UpstreamPipeline};
use crate::schemas::{Environment, Project, Ref, RefKind};

#[async_trait]
impl Fetcher for GitLabClient {
    async fn list_wildcard_projects(&self, wildcard: &Wildcard) -> Result<Vec<Project>> {
        Ok(self
            .fetch_projects(wildcard)
            .await?
            .into_iter()
            .map(|name| Project::with_pull(name, wildcard.pull.clone()))
            .collect())
    }

    async fn list_ref_names(&self, project_name: &str, kind: RefKind) -> Result<Vec<String>> {
        self.fetch_ref_names(project_name, kind).await
    }

    async fn list_environments(
        &self,
        project_name: &str,
        name_regexp: &str,
    ) -> Result<Vec<EnvironmentSummary>> {
        self.fetch_environments(project_name, name_regexp).await
    }

    async fn get_environment(
        &self,
        project_name: &str,
        environment_id: u64,
    ) -> Result<Environment> {
        self.fetch_environment(project_name, environment_id).await
    }

    async fn get_latest_pipeline(&self, r: &Ref) -> Result<Option<UpstreamPipeline>> {
        self.fetch_latest_pipeline(r).await
    }

    async fn get_branch_latest_commit(
        &self,
        project_name: &str,
        branch: &str,
    ) -> Result<CommitSummary> {
        self.fetch_branch_latest_commit(project_name, branch).await
    }

    async fn get_most_recent_tag_commit(
        &self,
        project_name: &str,
        tags_regexp: &str,
    ) -> Result<CommitSummary> {
        self.fetch_most_recent_tag_commit(project_name, tags_regexp)
            .await
    }

    async fn get_commit_count_between_refs(
        &self,
        project_name: &str,
        from: &str,
        to: &str,
    ) -> Result<u64> {
        self.fetch_commit_count_between_refs(project_name, from, to)
            .await
    }
}
