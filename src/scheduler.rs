//! Runs pull tasks in the background, at most one at a time per task identity.
//!
//! A task is identified by its kind and a dedup key derived from its payload.
//! Scheduling a task whose identity is already running is a no-op, so a
//! webhook and a polling tick racing on the same ref only cost one pull.

use async_trait::async_trait;
use log::{debug, error};
use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::task::JoinHandle;

use crate::config::Wildcard;
use crate::error::Result;
use crate::schemas::{Environment, Project, Ref};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskKind {
    PullProjectsFromWildcard,
    PullRefsFromProject,
    PullEnvironmentsFromProject,
    PullRefMetrics,
    PullEnvironmentMetrics,
}

impl TaskKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PullProjectsFromWildcard => "pull-projects-from-wildcard",
            Self::PullRefsFromProject => "pull-refs-from-project",
            Self::PullEnvironmentsFromProject => "pull-environments-from-project",
            Self::PullRefMetrics => "pull-ref-metrics",
            Self::PullEnvironmentMetrics => "pull-environment-metrics",
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A unit of work together with its payload.
#[derive(Debug, Clone)]
pub enum Task {
    /// `id` is the wildcard's position in the configuration.
    PullProjectsFromWildcard { id: usize, wildcard: Wildcard },
    PullRefsFromProject(Project),
    PullEnvironmentsFromProject(Project),
    PullRefMetrics(Ref),
    PullEnvironmentMetrics(Environment),
}

impl Task {
    pub const fn kind(&self) -> TaskKind {
        match self {
            Self::PullProjectsFromWildcard { .. } => TaskKind::PullProjectsFromWildcard,
            Self::PullRefsFromProject(_) => TaskKind::PullRefsFromProject,
            Self::PullEnvironmentsFromProject(_) => TaskKind::PullEnvironmentsFromProject,
            Self::PullRefMetrics(_) => TaskKind::PullRefMetrics,
            Self::PullEnvironmentMetrics(_) => TaskKind::PullEnvironmentMetrics,
        }
    }

    pub fn dedup_key(&self) -> String {
        match self {
            Self::PullProjectsFromWildcard { id, .. } => id.to_string(),
            Self::PullRefsFromProject(project) | Self::PullEnvironmentsFromProject(project) => {
                project.key().to_string()
            }
            Self::PullRefMetrics(r) => r.key().to_string(),
            Self::PullEnvironmentMetrics(env) => env.key().to_string(),
        }
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]", self.kind(), self.dedup_key())
    }
}

/// Executes tasks handed out by the scheduler.
///
/// The scheduler is passed back in so that a task can schedule follow-ups.
#[async_trait]
pub trait TaskHandler: Send + Sync {
    async fn handle(&self, scheduler: &TaskScheduler, task: Task) -> Result<()>;
}

type TaskId = (TaskKind, String);

/// Deduplicating background executor. Cheap to clone, clones share state.
#[derive(Clone)]
pub struct TaskScheduler {
    handler: Arc<dyn TaskHandler>,
    in_flight: Arc<Mutex<HashSet<TaskId>>>,
}

impl fmt::Debug for TaskScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskScheduler")
            .field("in_flight", &self.in_flight())
            .finish_non_exhaustive()
    }
}

impl TaskScheduler {
    pub fn new(handler: Arc<dyn TaskHandler>) -> Self {
        Self {
            handler,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Spawns `task` unless a task with the same identity is running.
    ///
    /// Returns immediately in both cases, `None` meaning the request was
    /// dropped as a duplicate. Must be called from within a tokio runtime.
    pub fn schedule(&self, task: Task) -> Option<JoinHandle<()>> {
        let id: TaskId = (task.kind(), task.dedup_key());

        let inserted = self
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id.clone());

        if !inserted {
            debug!("{task} is already running, skipping");
            return None;
        }

        let guard = InFlightGuard {
            id,
            in_flight: Arc::clone(&self.in_flight),
        };
        let scheduler = self.clone();

        Some(tokio::spawn(async move {
            // Released on completion, error or panic
            let _guard = guard;
            let description = task.to_string();

            debug!("running {description}");
            if let Err(err) = scheduler.handler.handle(&scheduler, task).await {
                error!("{description} failed: {err}");
            }
        }))
    }

    /// Number of tasks currently running.
    pub fn in_flight(&self) -> usize {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

struct InFlightGuard {
    id: TaskId,
    in_flight: Arc<Mutex<HashSet<TaskId>>>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        let _released = self
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.id);
    }
}
