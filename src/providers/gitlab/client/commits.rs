use regex::Regex;

use super::core::GitLabClient;
use crate::error::{ExporterError, Result};
use crate::fetcher::CommitSummary;
use crate::providers::gitlab::types::{ApiCompare, ApiRef};

impl GitLabClient {
    pub async fn fetch_branch_latest_commit(
        &self,
        project: &str,
        branch: &str,
    ) -> Result<CommitSummary> {
        let url = self.project_url(
            project,
            &format!("repository/branches/{}", urlencoding::encode(branch)),
        )?;
        let branch_ref: ApiRef = self.get_json(url).await?;

        branch_ref
            .commit
            .map(CommitSummary::from)
            .ok_or_else(|| {
                ExporterError::NotFound(format!("commit of branch {branch} in {project}"))
            })
    }

    /// Tags come back most recently updated first, so the first match wins.
    pub async fn fetch_most_recent_tag_commit(
        &self,
        project: &str,
        tags_regexp: &str,
    ) -> Result<CommitSummary> {
        let re = Regex::new(tags_regexp)?;
        let tags: Vec<ApiRef> = self
            .get_paginated(self.project_url(project, "repository/tags")?)
            .await?;

        tags.into_iter()
            .filter(|tag| re.is_match(&tag.name))
            .find_map(|tag| tag.commit)
            .map(CommitSummary::from)
            .ok_or_else(|| {
                ExporterError::NotFound(format!("tag matching '{tags_regexp}' in {project}"))
            })
    }

    pub async fn fetch_commit_count_between_refs(
        &self,
        project: &str,
        from: &str,
        to: &str,
    ) -> Result<u64> {
        let mut url = self.project_url(project, "repository/compare")?;
        url.query_pairs_mut()
            .append_pair("from", from)
            .append_pair("to", to);

        let compare: ApiCompare = self.get_json(url).await?;
        Ok(compare.commits.len() as u64)
    }
}
