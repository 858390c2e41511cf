//! Test doubles shared by the controller, exporter and server tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use regex::Regex;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::config::Wildcard;
use crate::error::{ExporterError, Result};
use crate::fetcher::{CommitSummary, EnvironmentSummary, Fetcher, UpstreamPipeline};
use crate::scheduler::{Task, TaskHandler, TaskScheduler};
use crate::schemas::{
    Environment, EnvironmentKey, Metric, MetricKey, Project, ProjectKey, Ref, RefKey, RefKind,
};
use crate::store::Store;

/// Canned upstream state.
#[derive(Debug, Default)]
pub struct MockData {
    pub wildcard_projects: Vec<Project>,
    pub ref_names: HashMap<(String, RefKind), Vec<String>>,
    pub environments: HashMap<String, Vec<Environment>>,
    /// Keyed by ref key
    pub pipelines: HashMap<String, UpstreamPipeline>,
    pub branch_commits: HashMap<(String, String), CommitSummary>,
    pub tag_commits: HashMap<String, CommitSummary>,
    pub commit_count: u64,
    /// Every call fails with a 502 when set
    pub unavailable: bool,
}

#[derive(Debug, Default)]
pub struct MockFetcher {
    data: Mutex<MockData>,
    calls: Mutex<Vec<&'static str>>,
}

impl MockFetcher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn update(&self, f: impl FnOnce(&mut MockData)) {
        f(&mut self.data.lock().unwrap());
    }

    /// How many times `method` was called.
    pub fn calls(&self, method: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|m| **m == method)
            .count()
    }

    fn record(&self, method: &'static str) -> Result<std::sync::MutexGuard<'_, MockData>> {
        self.calls.lock().unwrap().push(method);
        let data = self.data.lock().unwrap();
        if data.unavailable {
            return Err(ExporterError::ApiError {
                status: 502,
                message: "bad gateway".to_string(),
            });
        }
        Ok(data)
    }
}

#[async_trait]
impl Fetcher for MockFetcher {
    async fn list_wildcard_projects(&self, wildcard: &Wildcard) -> Result<Vec<Project>> {
        let data = self.record("list_wildcard_projects")?;
        Ok(data
            .wildcard_projects
            .iter()
            .map(|p| Project::with_pull(p.name.clone(), wildcard.pull.clone()))
            .collect())
    }

    async fn list_ref_names(&self, project_name: &str, kind: RefKind) -> Result<Vec<String>> {
        let data = self.record("list_ref_names")?;
        Ok(data
            .ref_names
            .get(&(project_name.to_string(), kind))
            .cloned()
            .unwrap_or_default())
    }

    async fn list_environments(
        &self,
        project_name: &str,
        name_regexp: &str,
    ) -> Result<Vec<EnvironmentSummary>> {
        let data = self.record("list_environments")?;
        let re = Regex::new(name_regexp)?;
        Ok(data
            .environments
            .get(project_name)
            .into_iter()
            .flatten()
            .filter(|env| re.is_match(&env.name))
            .map(|env| EnvironmentSummary {
                id: env.id,
                name: env.name.clone(),
            })
            .collect())
    }

    async fn get_environment(
        &self,
        project_name: &str,
        environment_id: u64,
    ) -> Result<Environment> {
        let data = self.record("get_environment")?;
        data.environments
            .get(project_name)
            .into_iter()
            .flatten()
            .find(|env| env.id == environment_id)
            .cloned()
            .ok_or_else(|| ExporterError::NotFound(format!("environment {environment_id}")))
    }

    async fn get_latest_pipeline(&self, r: &Ref) -> Result<Option<UpstreamPipeline>> {
        let data = self.record("get_latest_pipeline")?;
        Ok(data.pipelines.get(r.key().as_str()).cloned())
    }

    async fn get_branch_latest_commit(
        &self,
        project_name: &str,
        branch: &str,
    ) -> Result<CommitSummary> {
        let data = self.record("get_branch_latest_commit")?;
        data.branch_commits
            .get(&(project_name.to_string(), branch.to_string()))
            .cloned()
            .ok_or_else(|| ExporterError::NotFound(format!("branch {branch}")))
    }

    async fn get_most_recent_tag_commit(
        &self,
        project_name: &str,
        _tags_regexp: &str,
    ) -> Result<CommitSummary> {
        let data = self.record("get_most_recent_tag_commit")?;
        data.tag_commits
            .get(project_name)
            .cloned()
            .ok_or_else(|| ExporterError::NotFound(format!("tags of {project_name}")))
    }

    async fn get_commit_count_between_refs(
        &self,
        _project_name: &str,
        _from: &str,
        _to: &str,
    ) -> Result<u64> {
        let data = self.record("get_commit_count_between_refs")?;
        Ok(data.commit_count)
    }
}

/// Store whose backend is down: every call fails.
#[derive(Debug, Default)]
pub struct FailingStore;

impl FailingStore {
    fn unavailable<T>() -> Result<T> {
        Err(ExporterError::Io(std::io::Error::new(
            std::io::ErrorKind::ConnectionRefused,
            "store unavailable",
        )))
    }
}

#[async_trait]
impl Store for FailingStore {
    async fn set_project(&self, _project: Project) -> Result<()> {
        Self::unavailable()
    }
    async fn project_exists(&self, _key: &ProjectKey) -> Result<bool> {
        Self::unavailable()
    }
    async fn get_project(&self, _project: &mut Project) -> Result<()> {
        Self::unavailable()
    }
    async fn projects(&self) -> Result<Vec<Project>> {
        Self::unavailable()
    }

    async fn set_ref(&self, _r: Ref) -> Result<()> {
        Self::unavailable()
    }
    async fn ref_exists(&self, _key: &RefKey) -> Result<bool> {
        Self::unavailable()
    }
    async fn get_ref(&self, _r: &mut Ref) -> Result<()> {
        Self::unavailable()
    }
    async fn refs(&self) -> Result<Vec<Ref>> {
        Self::unavailable()
    }

    async fn set_environment(&self, _env: Environment) -> Result<()> {
        Self::unavailable()
    }
    async fn environment_exists(&self, _key: &EnvironmentKey) -> Result<bool> {
        Self::unavailable()
    }
    async fn get_environment(&self, _env: &mut Environment) -> Result<()> {
        Self::unavailable()
    }
    async fn environments(&self) -> Result<Vec<Environment>> {
        Self::unavailable()
    }

    async fn set_metric(&self, _metric: Metric) -> Result<()> {
        Self::unavailable()
    }
    async fn metric_exists(&self, _key: &MetricKey) -> Result<bool> {
        Self::unavailable()
    }
    async fn get_metric(&self, _metric: &mut Metric) -> Result<()> {
        Self::unavailable()
    }
    async fn del_metric(&self, _key: &MetricKey) -> Result<()> {
        Self::unavailable()
    }
}

/// Records every task it is handed without doing anything.
#[derive(Debug, Default)]
pub struct Recorder {
    tasks: Mutex<Vec<Task>>,
}

impl Recorder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn tasks(&self) -> Vec<Task> {
        self.tasks.lock().unwrap().clone()
    }

    /// `kind [dedup-key]` of every recorded task, in order.
    pub fn descriptions(&self) -> Vec<String> {
        self.tasks().iter().map(ToString::to_string).collect()
    }
}

#[async_trait]
impl TaskHandler for Recorder {
    async fn handle(&self, _scheduler: &TaskScheduler, task: Task) -> Result<()> {
        self.tasks.lock().unwrap().push(task);
        Ok(())
    }
}

/// Yields until every task spawned on `scheduler` has completed.
pub async fn settle(scheduler: &TaskScheduler) {
    tokio::task::yield_now().await;
    while scheduler.in_flight() > 0 {
        tokio::task::yield_now().await;
    }
}

pub fn commit(short_id: &str, committed_date: DateTime<Utc>) -> CommitSummary {
    CommitSummary {
        short_id: short_id.to_string(),
        committed_date,
    }
}
