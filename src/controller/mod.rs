//! Entry point for everything that asks for a pull: webhooks and polling ticks.
//!
//! Incoming refs and environments are resolved against the store and the
//! configuration, then turned into at most one scheduled task each.

mod polling;
mod webhooks;

use log::{error, info, warn};
use std::sync::Arc;

use crate::config::{Config, ConfigHandle, Wildcard};
use crate::error::{ExporterError, Result};
use crate::fetcher::Fetcher;
use crate::matcher::{
    environment_matches_pull_config, environment_matches_wildcard, ref_matches_pull_config,
    ref_matches_wildcard,
};
use crate::scheduler::{Task, TaskScheduler};
use crate::schemas::{Environment, Project, Ref};
use crate::store::Store;

pub use polling::PollTarget;
pub use webhooks::WebhookEvent;

/// Outcome of resolving an entity named by an event.
#[derive(Debug)]
enum Resolution<T> {
    /// Known, or newly registered under a known project. Its metrics are pulled.
    Registered(T),
    /// Unknown project, but these wildcards (by position) may own it.
    WildcardMatched(Vec<usize>),
    Unmatched,
}

pub struct Controller {
    config: ConfigHandle,
    store: Arc<dyn Store>,
    fetcher: Arc<dyn Fetcher>,
    scheduler: TaskScheduler,
}

impl Controller {
    pub fn new(
        config: ConfigHandle,
        store: Arc<dyn Store>,
        fetcher: Arc<dyn Fetcher>,
        scheduler: TaskScheduler,
    ) -> Self {
        Self {
            config,
            store,
            fetcher,
            scheduler,
        }
    }

    /// Pulls the metrics of `r` if it is tracked, registering it first when
    /// its project tracks refs like it.
    pub async fn trigger_ref_metrics_pull(&self, r: Ref) {
        let config = self.config.snapshot();
        let key = r.key();

        match self.resolve_ref(&config, r).await {
            Ok(Resolution::Registered(r)) => {
                info!("scheduling metrics pull for ref {key}");
                let _handle = self.scheduler.schedule(Task::PullRefMetrics(r));
            }
            Ok(Resolution::WildcardMatched(ids)) => {
                info!("ref {key} belongs to an unknown project, scheduling wildcard discovery");
                self.schedule_wildcards(&config, ids);
            }
            Ok(Resolution::Unmatched) => {
                info!("ref {key} is not tracked, ignoring");
            }
            Err(err) => error!("could not resolve ref {key}: {err}"),
        }
    }

    /// Same as [`Self::trigger_ref_metrics_pull`] for environments. The numeric
    /// ID missing from deployment hooks is resolved on the way.
    pub async fn trigger_environment_metrics_pull(&self, env: Environment) {
        let config = self.config.snapshot();
        let key = env.key();

        match self.resolve_environment(&config, env).await {
            Ok(Resolution::Registered(env)) => {
                info!("scheduling metrics pull for environment {key}");
                let _handle = self.scheduler.schedule(Task::PullEnvironmentMetrics(env));
            }
            Ok(Resolution::WildcardMatched(ids)) => {
                info!(
                    "environment {key} belongs to an unknown project, scheduling wildcard discovery"
                );
                self.schedule_wildcards(&config, ids);
            }
            Ok(Resolution::Unmatched) => {
                info!("environment {key} is not tracked, ignoring");
            }
            Err(err) => error!("could not resolve environment {key}: {err}"),
        }
    }

    async fn resolve_ref(&self, config: &Config, mut r: Ref) -> Result<Resolution<Ref>> {
        if self.store.ref_exists(&r.key()).await? {
            return Ok(Resolution::Registered(r));
        }

        let mut project = Project::new(r.project.name.clone());
        if !self.store.project_exists(&project.key()).await? {
            return Ok(matching_wildcards(config, |w| ref_matches_wildcard(w, &r)));
        }

        self.store.get_project(&mut project).await?;
        match ref_matches_pull_config(&project.pull.refs, &r) {
            Ok(true) => {}
            Ok(false) => return Ok(Resolution::Unmatched),
            Err(err) => {
                warn!("project {} has an invalid ref regexp: {err}", project.name);
                return Ok(Resolution::Unmatched);
            }
        }

        r.project = project;
        self.store.set_ref(r.clone()).await?;
        Ok(Resolution::Registered(r))
    }

    async fn resolve_environment(
        &self,
        config: &Config,
        mut env: Environment,
    ) -> Result<Resolution<Environment>> {
        if self.store.environment_exists(&env.key()).await? {
            if env.id == 0 {
                let mut stored = env.clone();
                match self.store.get_environment(&mut stored).await {
                    Ok(()) => env = stored,
                    Err(err) => error!("could not read environment {}: {err}", env.key()),
                }
                if env.id == 0 {
                    warn!("environment {} has no known ID yet, pulling anyway", env.key());
                }
            }
            return Ok(Resolution::Registered(env));
        }

        let mut project = Project::new(env.project_name.clone());
        if !self.store.project_exists(&project.key()).await? {
            return Ok(matching_wildcards(config, |w| {
                environment_matches_wildcard(w, &env)
            }));
        }

        self.store.get_project(&mut project).await?;
        match environment_matches_pull_config(&project.pull.environments, &env) {
            Ok(true) => {}
            Ok(false) => return Ok(Resolution::Unmatched),
            Err(err) => {
                warn!("project {} has an invalid environment regexp: {err}", project.name);
                return Ok(Resolution::Unmatched);
            }
        }

        let exact_name = format!("^{}$", regex::escape(&env.name));
        let summary = self
            .fetcher
            .list_environments(&env.project_name, &exact_name)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| ExporterError::NotFound(format!("environment {}", env.key())))?;

        env.id = summary.id;
        env.tags_regexp = project.pull.environments.tags_regexp.clone();
        self.store.set_environment(env.clone()).await?;
        Ok(Resolution::Registered(env))
    }

    fn schedule_wildcards(&self, config: &Config, ids: Vec<usize>) {
        for id in ids {
            if let Some(wildcard) = config.wildcards.get(id) {
                let _handle = self.scheduler.schedule(Task::PullProjectsFromWildcard {
                    id,
                    wildcard: wildcard.clone(),
                });
            }
        }
    }
}

/// Positions of the wildcards for which `matches` holds. A wildcard whose
/// regexp does not compile is logged and skipped.
fn matching_wildcards<T>(
    config: &Config,
    matches: impl Fn(&Wildcard) -> Result<bool>,
) -> Resolution<T> {
    let ids: Vec<usize> = config
        .wildcards
        .iter()
        .enumerate()
        .filter_map(|(id, wildcard)| match matches(wildcard) {
            Ok(true) => Some(id),
            Ok(false) => None,
            Err(err) => {
                warn!("wildcard {id} has an invalid regexp: {err}");
                None
            }
        })
        .collect();

    if ids.is_empty() {
        Resolution::Unmatched
    } else {
        Resolution::WildcardMatched(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ProjectPull, WildcardOwner};
    use crate::scheduler::TaskKind;
    use crate::schemas::RefKind;
    use crate::store::Local;
    use crate::testing::{settle, FailingStore, MockFetcher, Recorder};

    pub(super) struct Harness {
        pub controller: Controller,
        pub store: Arc<Local>,
        pub fetcher: Arc<MockFetcher>,
        pub recorder: Arc<Recorder>,
        pub scheduler: TaskScheduler,
    }

    impl Harness {
        pub fn new(config: Config) -> Self {
            let store = Arc::new(Local::new());
            let fetcher = MockFetcher::new();
            let recorder = Recorder::new();
            let scheduler = TaskScheduler::new(recorder.clone());
            let controller = Controller::new(
                ConfigHandle::new(config),
                store.clone(),
                fetcher.clone(),
                scheduler.clone(),
            );
            Self {
                controller,
                store,
                fetcher,
                recorder,
                scheduler,
            }
        }

        pub async fn settled_tasks(&self) -> Vec<String> {
            settle(&self.scheduler).await;
            self.recorder.descriptions()
        }
    }

    fn group_wildcard(owner: &str) -> Wildcard {
        Wildcard {
            owner: WildcardOwner {
                name: owner.to_string(),
                kind: "group".to_string(),
                include_subgroups: true,
            },
            ..Wildcard::default()
        }
    }

    fn envs_enabled() -> ProjectPull {
        let mut pull = ProjectPull::default();
        pull.environments.enabled = true;
        pull.environments.tags_regexp = "^v".to_string();
        pull
    }

    fn main_branch() -> Ref {
        Ref::new(Project::new("group/app"), RefKind::Branch, "main")
    }

    #[tokio::test]
    async fn test_known_ref_schedules_exactly_one_pull() {
        let h = Harness::new(Config::default());
        h.store.set_ref(main_branch()).await.unwrap();

        h.controller.trigger_ref_metrics_pull(main_branch()).await;

        assert_eq!(
            h.settled_tasks().await,
            vec!["pull-ref-metrics [group/app:branch:main]"]
        );
    }

    #[tokio::test]
    async fn test_unknown_project_without_wildcards_schedules_nothing() {
        let h = Harness::new(Config::default());

        h.controller.trigger_ref_metrics_pull(main_branch()).await;

        assert!(h.settled_tasks().await.is_empty());
        assert!(!h.store.ref_exists(&main_branch().key()).await.unwrap());
    }

    #[tokio::test]
    async fn test_deployment_of_unlisted_project_is_dropped() {
        let h = Harness::new(Config::default());

        h.controller
            .trigger_environment_metrics_pull(Environment::new("group/unlisted", "production"))
            .await;

        assert!(h.settled_tasks().await.is_empty());
        assert_eq!(h.fetcher.calls("list_environments"), 0);
    }

    #[tokio::test]
    async fn test_unknown_project_schedules_matching_wildcards() {
        let config = Config {
            wildcards: vec![group_wildcard("other"), group_wildcard("group")],
            ..Config::default()
        };
        let h = Harness::new(config);

        h.controller.trigger_ref_metrics_pull(main_branch()).await;

        assert_eq!(
            h.settled_tasks().await,
            vec!["pull-projects-from-wildcard [1]"]
        );
        assert!(!h.store.ref_exists(&main_branch().key()).await.unwrap());
    }

    #[tokio::test]
    async fn test_known_project_registers_matching_ref() {
        let h = Harness::new(Config::default());
        h.store
            .set_project(Project::new("group/app"))
            .await
            .unwrap();

        h.controller.trigger_ref_metrics_pull(main_branch()).await;

        assert_eq!(
            h.settled_tasks().await,
            vec!["pull-ref-metrics [group/app:branch:main]"]
        );
        let mut stored = main_branch();
        h.store.get_ref(&mut stored).await.unwrap();
        assert_eq!(stored.project.pull, ProjectPull::default());
    }

    #[tokio::test]
    async fn test_known_project_ignores_untracked_ref() {
        let h = Harness::new(Config::default());
        h.store
            .set_project(Project::new("group/app"))
            .await
            .unwrap();
        let feature = Ref::new(Project::new("group/app"), RefKind::Branch, "feature/x");

        h.controller.trigger_ref_metrics_pull(feature.clone()).await;

        assert!(h.settled_tasks().await.is_empty());
        assert!(!h.store.ref_exists(&feature.key()).await.unwrap());
    }

    #[tokio::test]
    async fn test_known_environment_without_id_is_backfilled() {
        let h = Harness::new(Config::default());
        let mut stored = Environment::new("group/app", "production");
        stored.id = 42;
        h.store.set_environment(stored).await.unwrap();

        h.controller
            .trigger_environment_metrics_pull(Environment::new("group/app", "production"))
            .await;
        settle(&h.scheduler).await;

        let tasks = h.recorder.tasks();
        assert_eq!(tasks.len(), 1);
        match &tasks[0] {
            Task::PullEnvironmentMetrics(env) => assert_eq!(env.id, 42),
            other => panic!("unexpected task {other}"),
        }
    }

    #[tokio::test]
    async fn test_known_environment_still_pulled_when_id_unknown() {
        let h = Harness::new(Config::default());
        h.store
            .set_environment(Environment::new("group/app", "production"))
            .await
            .unwrap();

        h.controller
            .trigger_environment_metrics_pull(Environment::new("group/app", "production"))
            .await;

        assert_eq!(
            h.settled_tasks().await,
            vec!["pull-environment-metrics [group/app:production]"]
        );
    }

    #[tokio::test]
    async fn test_unknown_environment_of_known_project_resolves_its_id() {
        let h = Harness::new(Config::default());
        h.store
            .set_project(Project::with_pull("group/app", envs_enabled()))
            .await
            .unwrap();
        h.fetcher.update(|data| {
            let mut env = Environment::new("group/app", "production");
            env.id = 7;
            let mut review = Environment::new("group/app", "production-eu");
            review.id = 8;
            data.environments
                .insert("group/app".to_string(), vec![review, env]);
        });

        h.controller
            .trigger_environment_metrics_pull(Environment::new("group/app", "production"))
            .await;
        settle(&h.scheduler).await;

        let mut stored = Environment::new("group/app", "production");
        h.store.get_environment(&mut stored).await.unwrap();
        assert_eq!(stored.id, 7);
        assert_eq!(stored.tags_regexp, "^v");
        assert_eq!(h.recorder.tasks()[0].kind(), TaskKind::PullEnvironmentMetrics);
    }

    #[tokio::test]
    async fn test_environment_of_project_without_environments_is_ignored() {
        let h = Harness::new(Config::default());
        h.store
            .set_project(Project::new("group/app"))
            .await
            .unwrap();

        h.controller
            .trigger_environment_metrics_pull(Environment::new("group/app", "production"))
            .await;

        assert!(h.settled_tasks().await.is_empty());
        assert_eq!(h.fetcher.calls("list_environments"), 0);
    }

    #[tokio::test]
    async fn test_upstream_failure_drops_the_trigger() {
        let h = Harness::new(Config::default());
        h.store
            .set_project(Project::with_pull("group/app", envs_enabled()))
            .await
            .unwrap();
        h.fetcher.update(|data| data.unavailable = true);

        h.controller
            .trigger_environment_metrics_pull(Environment::new("group/app", "production"))
            .await;

        assert!(h.settled_tasks().await.is_empty());
        let key = Environment::new("group/app", "production").key();
        assert!(!h.store.environment_exists(&key).await.unwrap());
    }

    #[tokio::test]
    async fn test_invalid_wildcard_regexp_does_not_hide_other_wildcards() {
        let mut broken = group_wildcard("group");
        broken.pull.refs.branches.regexp = "(".to_string();
        let config = Config {
            wildcards: vec![broken, group_wildcard("group")],
            ..Config::default()
        };
        let h = Harness::new(config);

        h.controller.trigger_ref_metrics_pull(main_branch()).await;

        assert_eq!(
            h.settled_tasks().await,
            vec!["pull-projects-from-wildcard [1]"]
        );
    }

    #[tokio::test]
    async fn test_deployment_of_unknown_project_schedules_matching_wildcards() {
        let mut with_environments = group_wildcard("group");
        with_environments.pull = envs_enabled();
        let config = Config {
            wildcards: vec![group_wildcard("group"), with_environments],
            ..Config::default()
        };
        let h = Harness::new(config);

        h.controller
            .trigger_environment_metrics_pull(Environment::new("group/app", "production"))
            .await;

        assert_eq!(
            h.settled_tasks().await,
            vec!["pull-projects-from-wildcard [1]"]
        );
        assert_eq!(h.fetcher.calls("list_environments"), 0);
    }

    fn with_failing_store(config: Config) -> (Controller, Arc<Recorder>, TaskScheduler) {
        let recorder = Recorder::new();
        let scheduler = TaskScheduler::new(recorder.clone());
        let controller = Controller::new(
            ConfigHandle::new(config),
            Arc::new(FailingStore),
            MockFetcher::new(),
            scheduler.clone(),
        );
        (controller, recorder, scheduler)
    }

    #[tokio::test]
    async fn test_store_failure_drops_ref_trigger() {
        // A matching wildcard would otherwise be scheduled
        let config = Config {
            wildcards: vec![group_wildcard("group")],
            ..Config::default()
        };
        let (controller, recorder, scheduler) = with_failing_store(config);

        controller.trigger_ref_metrics_pull(main_branch()).await;

        settle(&scheduler).await;
        assert!(recorder.tasks().is_empty());
    }

    #[tokio::test]
    async fn test_store_failure_drops_environment_trigger() {
        let mut wildcard = group_wildcard("group");
        wildcard.pull = envs_enabled();
        let config = Config {
            wildcards: vec![wildcard],
            ..Config::default()
        };
        let (controller, recorder, scheduler) = with_failing_store(config);

        controller
            .trigger_environment_metrics_pull(Environment::new("group/app", "production"))
            .await;

        settle(&scheduler).await;
        assert!(recorder.tasks().is_empty());
    }
}
