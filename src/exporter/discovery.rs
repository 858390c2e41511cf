use log::{debug, info, warn};

use super::Exporter;
use crate::config::Wildcard;
use crate::error::Result;
use crate::matcher::ref_matches_pull_config;
use crate::scheduler::{Task, TaskScheduler};
use crate::schemas::{Environment, Project, Ref, RefKind};

impl Exporter {
    /// Registers the projects found by a wildcard that are not tracked yet.
    /// Explicitly configured projects keep their own pull configuration.
    pub(super) async fn pull_projects_from_wildcard(
        &self,
        scheduler: &TaskScheduler,
        id: usize,
        wildcard: &Wildcard,
    ) -> Result<()> {
        let projects = self.fetcher.list_wildcard_projects(wildcard).await?;
        debug!("wildcard {id} matched {} projects", projects.len());

        for project in projects {
            if self.store.project_exists(&project.key()).await? {
                continue;
            }

            info!("discovered project-name={} through wildcard {id}", project.name);
            self.store.set_project(project.clone()).await?;

            if project.pull.environments.enabled {
                let _handle =
                    scheduler.schedule(Task::PullEnvironmentsFromProject(project.clone()));
            }
            let _handle = scheduler.schedule(Task::PullRefsFromProject(project));
        }

        Ok(())
    }

    /// Registers the refs of `project` that its pull configuration tracks.
    pub(super) async fn pull_refs_from_project(
        &self,
        scheduler: &TaskScheduler,
        mut project: Project,
    ) -> Result<()> {
        if self.store.project_exists(&project.key()).await? {
            self.store.get_project(&mut project).await?;
        }

        for kind in RefKind::ALL {
            let rule = match kind {
                RefKind::Branch => &project.pull.refs.branches,
                RefKind::Tag => &project.pull.refs.tags,
                RefKind::MergeRequest => &project.pull.refs.merge_requests,
            };
            if !rule.enabled {
                continue;
            }

            let names = self.fetcher.list_ref_names(&project.name, kind).await?;

            for name in names {
                let r = Ref::new(project.clone(), kind, name);

                match ref_matches_pull_config(&project.pull.refs, &r) {
                    Ok(true) => {}
                    Ok(false) => continue,
                    Err(err) => {
                        warn!(
                            "project-name={} has an invalid {kind} regexp: {err}",
                            project.name
                        );
                        break;
                    }
                }

                if self.store.ref_exists(&r.key()).await? {
                    continue;
                }

                info!(
                    "discovered ref project-name={} ref-kind={kind} ref={}",
                    project.name, r.name
                );
                self.store.set_ref(r.clone()).await?;
                let _handle = scheduler.schedule(Task::PullRefMetrics(r));
            }
        }

        Ok(())
    }

    /// Registers the environments of `project` whose name is tracked.
    pub(super) async fn pull_environments_from_project(
        &self,
        scheduler: &TaskScheduler,
        mut project: Project,
    ) -> Result<()> {
        if self.store.project_exists(&project.key()).await? {
            self.store.get_project(&mut project).await?;
        }

        let pull = &project.pull.environments;
        if !pull.enabled {
            return Ok(());
        }

        let summaries = self
            .fetcher
            .list_environments(&project.name, &pull.regexp)
            .await?;

        for summary in summaries {
            let mut env = Environment::new(project.name.clone(), summary.name);
            env.id = summary.id;
            env.tags_regexp = pull.tags_regexp.clone();

            if self.store.environment_exists(&env.key()).await? {
                continue;
            }

            info!(
                "discovered environment project-name={} environment-name={} environment-id={}",
                env.project_name, env.name, env.id
            );
            self.store.set_environment(env.clone()).await?;
            let _handle = scheduler.schedule(Task::PullEnvironmentMetrics(env));
        }

        Ok(())
    }
}
