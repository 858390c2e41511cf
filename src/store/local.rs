use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use super::Store;
use crate::error::{ExporterError, Result};
use crate::schemas::{
    Environment, EnvironmentKey, Metric, MetricKey, Project, ProjectKey, Ref, RefKey,
};

/// In-memory store, lost on restart.
#[derive(Debug, Default)]
pub struct Local {
    projects: RwLock<HashMap<ProjectKey, Project>>,
    refs: RwLock<HashMap<RefKey, Ref>>,
    environments: RwLock<HashMap<EnvironmentKey, Environment>>,
    metrics: RwLock<HashMap<MetricKey, Metric>>,
}

impl Local {
    pub fn new() -> Self {
        Self::default()
    }
}

fn not_found(what: &str, key: impl std::fmt::Display) -> ExporterError {
    ExporterError::NotFound(format!("{what} '{key}'"))
}

#[async_trait]
impl Store for Local {
    async fn set_project(&self, project: Project) -> Result<()> {
        self.projects.write().await.insert(project.key(), project);
        Ok(())
    }

    async fn project_exists(&self, key: &ProjectKey) -> Result<bool> {
        Ok(self.projects.read().await.contains_key(key))
    }

    async fn get_project(&self, project: &mut Project) -> Result<()> {
        let key = project.key();
        let stored = self.projects.read().await.get(&key).cloned();
        *project = stored.ok_or_else(|| not_found("project", &key))?;
        Ok(())
    }

    async fn projects(&self) -> Result<Vec<Project>> {
        Ok(self.projects.read().await.values().cloned().collect())
    }

    async fn set_ref(&self, r: Ref) -> Result<()> {
        self.refs.write().await.insert(r.key(), r);
        Ok(())
    }

    async fn ref_exists(&self, key: &RefKey) -> Result<bool> {
        Ok(self.refs.read().await.contains_key(key))
    }

    async fn get_ref(&self, r: &mut Ref) -> Result<()> {
        let key = r.key();
        let stored = self.refs.read().await.get(&key).cloned();
        *r = stored.ok_or_else(|| not_found("ref", &key))?;
        Ok(())
    }

    async fn refs(&self) -> Result<Vec<Ref>> {
        Ok(self.refs.read().await.values().cloned().collect())
    }

    async fn set_environment(&self, env: Environment) -> Result<()> {
        self.environments.write().await.insert(env.key(), env);
        Ok(())
    }

    async fn environment_exists(&self, key: &EnvironmentKey) -> Result<bool> {
        Ok(self.environments.read().await.contains_key(key))
    }

    async fn get_environment(&self, env: &mut Environment) -> Result<()> {
        let key = env.key();
        let stored = self.environments.read().await.get(&key).cloned();
        *env = stored.ok_or_else(|| not_found("environment", &key))?;
        Ok(())
    }

    async fn environments(&self) -> Result<Vec<Environment>> {
        Ok(self.environments.read().await.values().cloned().collect())
    }

    async fn set_metric(&self, metric: Metric) -> Result<()> {
        self.metrics.write().await.insert(metric.key(), metric);
        Ok(())
    }

    async fn metric_exists(&self, key: &MetricKey) -> Result<bool> {
        Ok(self.metrics.read().await.contains_key(key))
    }

    async fn get_metric(&self, metric: &mut Metric) -> Result<()> {
        let key = metric.key();
        let stored = self.metrics.read().await.get(&key).cloned();
        *metric = stored.ok_or_else(|| not_found("metric", &key))?;
        Ok(())
    }

    async fn del_metric(&self, key: &MetricKey) -> Result<()> {
        let _removed = self.metrics.write().await.remove(key);
        Ok(())
    }
}
