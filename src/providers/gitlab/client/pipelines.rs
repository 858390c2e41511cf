use super::core::GitLabClient;
use crate::error::Result;
use crate::fetcher::UpstreamPipeline;
use crate::providers::gitlab::types::ApiPipelineSummary;
use crate::schemas::{Ref, RefKind};

impl GitLabClient {
    /// Most recent pipeline of a ref, with the detail fields the list omits.
    pub async fn fetch_latest_pipeline(&self, r: &Ref) -> Result<Option<UpstreamPipeline>> {
        let ref_name = match r.kind {
            RefKind::MergeRequest => format!("refs/merge-requests/{}/head", r.name),
            RefKind::Branch | RefKind::Tag => r.name.clone(),
        };

        let mut url = self.project_url(&r.project.name, "pipelines")?;
        url.query_pairs_mut()
            .append_pair("ref", &ref_name)
            .append_pair("order_by", "id")
            .append_pair("sort", "desc")
            .append_pair("per_page", "1");

        let pipelines: Vec<ApiPipelineSummary> = self.get_json(url).await?;
        let Some(latest) = pipelines.first() else {
            return Ok(None);
        };

        let url = self.project_url(&r.project.name, &format!("pipelines/{}", latest.id))?;
        Ok(Some(self.get_json(url).await?))
    }
}
