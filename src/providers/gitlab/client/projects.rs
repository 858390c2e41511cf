use super::core::GitLabClient;
use crate::config::Wildcard;
use crate::error::{ExporterError, Result};
use crate::providers::gitlab::types::{ApiMergeRequest, ApiProject, ApiRef};
use crate::schemas::RefKind;

impl GitLabClient {
    /// Paths of the projects a wildcard searches for.
    pub async fn fetch_projects(&self, wildcard: &Wildcard) -> Result<Vec<String>> {
        let owner = &wildcard.owner;
        let mut url = match owner.kind.as_str() {
            "" => self.api_url("projects")?,
            "user" => {
                self.api_url(&format!("users/{}/projects", urlencoding::encode(&owner.name)))?
            }
            "group" => {
                let mut url =
                    self.api_url(&format!("groups/{}/projects", urlencoding::encode(&owner.name)))?;
                url.query_pairs_mut().append_pair(
                    "include_subgroups",
                    if owner.include_subgroups { "true" } else { "false" },
                );
                url
            }
            other => {
                return Err(ExporterError::Config(format!(
                    "invalid wildcard owner kind '{other}'"
                )))
            }
        };

        {
            let mut query = url.query_pairs_mut();
            query.append_pair("archived", if wildcard.archived { "true" } else { "false" });
            if !wildcard.search.is_empty() {
                query.append_pair("search", &wildcard.search);
            }
        }

        let projects: Vec<ApiProject> = self.get_paginated(url).await?;
        Ok(projects.into_iter().map(|p| p.path_with_namespace).collect())
    }

    /// Branch and tag names, or IIDs of the open merge requests.
    pub async fn fetch_ref_names(&self, project: &str, kind: RefKind) -> Result<Vec<String>> {
        match kind {
            RefKind::Branch | RefKind::Tag => {
                let path = if kind == RefKind::Branch {
                    "repository/branches"
                } else {
                    "repository/tags"
                };
                let refs: Vec<ApiRef> =
                    self.get_paginated(self.project_url(project, path)?).await?;
                Ok(refs.into_iter().map(|r| r.name).collect())
            }
            RefKind::MergeRequest => {
                let mut url = self.project_url(project, "merge_requests")?;
                url.query_pairs_mut().append_pair("state", "opened");
                let mrs: Vec<ApiMergeRequest> = self.get_paginated(url).await?;
                Ok(mrs.into_iter().map(|mr| mr.iid.to_string()).collect())
            }
        }
    }
}
