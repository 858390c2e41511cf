//! Executes pull tasks: discovers projects, refs and environments, and turns
//! upstream pipelines and deployments into metrics.

mod discovery;
mod environments;
mod refs;
mod status;

use async_trait::async_trait;
use chrono::Utc;
use log::debug;
use std::sync::Arc;

use crate::error::Result;
use crate::fetcher::Fetcher;
use crate::metrics::MetricsSink;
use crate::scheduler::{Task, TaskHandler, TaskScheduler};
use crate::schemas::{Labels, Metric, MetricKind};
use crate::store::Store;

use status::{stale_status, status_labels, status_metrics};

pub struct Exporter {
    store: Arc<dyn Store>,
    fetcher: Arc<dyn Fetcher>,
    sink: Arc<dyn MetricsSink>,
}

impl Exporter {
    pub fn new(
        store: Arc<dyn Store>,
        fetcher: Arc<dyn Fetcher>,
        sink: Arc<dyn MetricsSink>,
    ) -> Self {
        Self {
            store,
            fetcher,
            sink,
        }
    }

    /// Records a gauge in the store, then publishes it.
    async fn emit(&self, metric: Metric) -> Result<()> {
        self.sink.set(metric.kind, &metric.labels, metric.value);
        self.store.set_metric(metric).await
    }

    async fn emit_all(&self, metrics: Vec<Metric>) -> Result<()> {
        for metric in metrics {
            self.emit(metric).await?;
        }
        Ok(())
    }

    /// Forgets a series in both the store and the sink.
    async fn retire(&self, kind: MetricKind, labels: &Labels) -> Result<()> {
        let metric = Metric::new(kind, labels.clone());
        debug!("retiring series {}", metric.key());
        self.store.del_metric(&metric.key()).await?;
        self.sink.remove(kind, labels);
        Ok(())
    }

    /// Keeps status series one-hot once an out-of-set status was replaced.
    async fn retire_stale_status(
        &self,
        kind: MetricKind,
        labels: &Labels,
        previous: Option<&str>,
        current: &str,
    ) -> Result<()> {
        match stale_status(previous, current) {
            Some(stale) => self.retire(kind, &status_labels(labels, stale)).await,
            None => Ok(()),
        }
    }
}

#[async_trait]
impl TaskHandler for Exporter {
    async fn handle(&self, scheduler: &TaskScheduler, task: Task) -> Result<()> {
        match task {
            Task::PullProjectsFromWildcard { id, wildcard } => {
                self.pull_projects_from_wildcard(scheduler, id, &wildcard).await
            }
            Task::PullRefsFromProject(project) => {
                self.pull_refs_from_project(scheduler, project).await
            }
            Task::PullEnvironmentsFromProject(project) => {
                self.pull_environments_from_project(scheduler, project).await
            }
            Task::PullRefMetrics(r) => self.pull_ref_metrics(r, Utc::now()).await,
            Task::PullEnvironmentMetrics(env) => self.pull_environment_metrics(env).await,
        }
    }
}
