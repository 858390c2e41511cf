use regex::Regex;

use super::core::GitLabClient;
use crate::error::Result;
use crate::fetcher::EnvironmentSummary;
use crate::providers::gitlab::types::{ApiEnvironment, ApiEnvironmentSummary};
use crate::schemas::Environment;

impl GitLabClient {
    /// Environments of a project whose name matches `name_regexp`.
    pub async fn fetch_environments(
        &self,
        project: &str,
        name_regexp: &str,
    ) -> Result<Vec<EnvironmentSummary>> {
        let re = Regex::new(name_regexp)?;
        let environments: Vec<ApiEnvironmentSummary> = self
            .get_paginated(self.project_url(project, "environments")?)
            .await?;

        Ok(environments
            .into_iter()
            .filter(|env| re.is_match(&env.name))
            .map(|env| EnvironmentSummary {
                id: env.id,
                name: env.name,
            })
            .collect())
    }

    pub async fn fetch_environment(
        &self,
        project: &str,
        environment_id: u64,
    ) -> Result<Environment> {
        let url = self.project_url(project, &format!("environments/{environment_id}"))?;
        let environment: ApiEnvironment = self.get_json(url).await?;
        Ok(environment.into_environment(project))
    }
}
