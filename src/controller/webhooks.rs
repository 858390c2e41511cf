//! Pipeline and deployment hooks sent by GitLab.
//!
//! Only the fields needed to identify a ref or an environment are decoded.
//! Everything else about the run is fetched again when the pull executes.

use log::{debug, warn};
use serde::Deserialize;

use super::Controller;
use crate::schemas::{Environment, Project, Ref, RefKind};

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "object_kind", rename_all = "snake_case")]
pub enum WebhookEvent {
    Pipeline(PipelineEvent),
    Deployment(DeploymentEvent),
}

impl WebhookEvent {
    /// Whether hooks with this `object_kind` carry anything to pull.
    pub fn handles(object_kind: &str) -> bool {
        matches!(object_kind, "pipeline" | "deployment")
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PipelineEvent {
    pub object_attributes: PipelineAttributes,
    #[serde(default)]
    pub merge_request: Option<MergeRequestAttributes>,
    pub project: EventProject,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PipelineAttributes {
    #[serde(rename = "ref", default)]
    pub ref_name: String,
    #[serde(default)]
    pub tag: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MergeRequestAttributes {
    #[serde(default)]
    pub iid: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EventProject {
    #[serde(default)]
    pub path_with_namespace: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeploymentEvent {
    #[serde(default)]
    pub environment: String,
    pub project: EventProject,
}

impl PipelineEvent {
    /// The ref the pipeline ran for. Merge request pipelines are identified
    /// by the IID, not by the source branch.
    pub fn to_ref(&self) -> Ref {
        let project = Project::new(self.project.path_with_namespace.clone());

        match &self.merge_request {
            Some(mr) if mr.iid != 0 => Ref::new(project, RefKind::MergeRequest, mr.iid.to_string()),
            _ if self.object_attributes.tag => {
                Ref::new(project, RefKind::Tag, self.object_attributes.ref_name.clone())
            }
            _ => Ref::new(project, RefKind::Branch, self.object_attributes.ref_name.clone()),
        }
    }
}

impl DeploymentEvent {
    pub fn to_environment(&self) -> Environment {
        Environment::new(
            self.project.path_with_namespace.clone(),
            self.environment.clone(),
        )
    }
}

impl Controller {
    pub async fn process_event(&self, event: WebhookEvent) {
        match event {
            WebhookEvent::Pipeline(event) => self.process_pipeline_event(&event).await,
            WebhookEvent::Deployment(event) => self.process_deployment_event(&event).await,
        }
    }

    pub async fn process_pipeline_event(&self, event: &PipelineEvent) {
        let r = event.to_ref();
        if r.project.name.is_empty() || r.name.is_empty() {
            warn!("pipeline hook without project or ref, ignoring");
            return;
        }

        debug!("received pipeline hook for {}", r.key());
        self.trigger_ref_metrics_pull(r).await;
    }

    pub async fn process_deployment_event(&self, event: &DeploymentEvent) {
        let env = event.to_environment();
        if env.project_name.is_empty() || env.name.is_empty() {
            warn!("deployment hook without project or environment, ignoring");
            return;
        }

        debug!("received deployment hook for {}", env.key());
        self.trigger_environment_metrics_pull(env).await;
    }
}
