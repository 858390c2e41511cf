//! State shared by every task: which projects, refs and environments are known
//! and the last value of each metric.
//!
//! Writes overwrite the whole entity. Callers needing a partial update read,
//! modify and write back. There are no cross-entity transactions.

mod local;

use async_trait::async_trait;

use crate::error::Result;
use crate::schemas::{
    Environment, EnvironmentKey, Metric, MetricKey, Project, ProjectKey, Ref, RefKey,
};

pub use local::Local;

#[async_trait]
pub trait Store: Send + Sync {
    async fn set_project(&self, project: Project) -> Result<()>;
    async fn project_exists(&self, key: &ProjectKey) -> Result<bool>;
    /// Fills `project` from the stored copy with the same key, `NotFound` if absent.
    async fn get_project(&self, project: &mut Project) -> Result<()>;
    async fn projects(&self) -> Result<Vec<Project>>;

    async fn set_ref(&self, r: Ref) -> Result<()>;
    async fn ref_exists(&self, key: &RefKey) -> Result<bool>;
    async fn get_ref(&self, r: &mut Ref) -> Result<()>;
    async fn refs(&self) -> Result<Vec<Ref>>;

    async fn set_environment(&self, env: Environment) -> Result<()>;
    async fn environment_exists(&self, key: &EnvironmentKey) -> Result<bool>;
    async fn get_environment(&self, env: &mut Environment) -> Result<()>;
    async fn environments(&self) -> Result<Vec<Environment>>;

    async fn set_metric(&self, metric: Metric) -> Result<()>;
    async fn metric_exists(&self, key: &MetricKey) -> Result<bool>;
    async fn get_metric(&self, metric: &mut Metric) -> Result<()>;
    async fn del_metric(&self, key: &MetricKey) -> Result<()>;
}
