//! Periodic pulls, for everything webhooks do not cover.

use log::{error, info};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::Controller;
use crate::config::PullSchedule;
use crate::scheduler::Task;
use crate::schemas::Project;

/// What a polling loop schedules on each tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollTarget {
    ProjectsFromWildcards,
    RefsFromProjects,
    EnvironmentsFromProjects,
    Metrics,
}

impl fmt::Display for PollTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::ProjectsFromWildcards => "projects from wildcards",
            Self::RefsFromProjects => "refs from projects",
            Self::EnvironmentsFromProjects => "environments from projects",
            Self::Metrics => "metrics",
        })
    }
}

impl Controller {
    /// Stores the explicitly configured projects, replacing the pull
    /// configuration of any that were discovered through a wildcard.
    pub async fn register_configured_projects(&self) {
        let config = self.config.snapshot();

        for project_config in &config.projects {
            let project = Project::with_pull(
                project_config.name.clone(),
                config.project_pull(project_config),
            );
            if let Err(err) = self.store.set_project(project).await {
                error!("could not register project {}: {err}", project_config.name);
            }
        }

        info!("registered {} configured projects", config.projects.len());
    }

    /// Schedules one round of `target`.
    pub async fn poll(&self, target: PollTarget) {
        match target {
            PollTarget::ProjectsFromWildcards => {
                let config = self.config.snapshot();
                for (id, wildcard) in config.wildcards.iter().enumerate() {
                    let _handle = self.scheduler.schedule(Task::PullProjectsFromWildcard {
                        id,
                        wildcard: wildcard.clone(),
                    });
                }
            }
            PollTarget::RefsFromProjects => match self.store.projects().await {
                Ok(projects) => {
                    for project in projects {
                        let _handle = self.scheduler.schedule(Task::PullRefsFromProject(project));
                    }
                }
                Err(err) => error!("could not list projects: {err}"),
            },
            PollTarget::EnvironmentsFromProjects => match self.store.projects().await {
                Ok(projects) => {
                    for project in projects.into_iter().filter(|p| p.pull.environments.enabled) {
                        let _handle = self
                            .scheduler
                            .schedule(Task::PullEnvironmentsFromProject(project));
                    }
                }
                Err(err) => error!("could not list projects: {err}"),
            },
            PollTarget::Metrics => {
                match self.store.refs().await {
                    Ok(refs) => {
                        for r in refs {
                            let _handle = self.scheduler.schedule(Task::PullRefMetrics(r));
                        }
                    }
                    Err(err) => error!("could not list refs: {err}"),
                }
                match self.store.environments().await {
                    Ok(envs) => {
                        for env in envs {
                            let _handle =
                                self.scheduler.schedule(Task::PullEnvironmentMetrics(env));
                        }
                    }
                    Err(err) => error!("could not list environments: {err}"),
                }
            }
        }
    }

    /// Spawns one loop per poll target, following the schedules of the
    /// configuration current at the time of the call.
    pub fn spawn_polling(self: &Arc<Self>) -> Vec<JoinHandle<()>> {
        let pull = self.config.snapshot().pull.clone();

        [
            (PollTarget::ProjectsFromWildcards, pull.projects_from_wildcards),
            (PollTarget::RefsFromProjects, pull.refs_from_projects),
            (PollTarget::EnvironmentsFromProjects, pull.environments_from_projects),
            (PollTarget::Metrics, pull.metrics),
        ]
        .into_iter()
        .map(|(target, schedule)| {
            let controller = Arc::clone(self);
            tokio::spawn(async move { controller.poll_loop(target, schedule).await })
        })
        .collect()
    }

    async fn poll_loop(&self, target: PollTarget, schedule: PullSchedule) {
        if schedule.on_init {
            info!("initial pull of {target}");
            self.poll(target).await;
        }

        if !schedule.scheduled || schedule.interval_seconds == 0 {
            return;
        }

        let mut ticker = tokio::time::interval(Duration::from_secs(schedule.interval_seconds));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately
        ticker.tick().await;

        loop {
            ticker.tick().await;
            self.poll(target).await;
        }
    }
}
