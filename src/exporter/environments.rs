use log::{debug, info};

use super::{status_metrics, Exporter};
use crate::error::Result;
use crate::fetcher::CommitSummary;
use crate::schemas::{Environment, Metric, MetricKind, RefKind};

impl Exporter {
    /// Exports the latest deployment of `env` and how far it lags behind the
    /// most recent commit of the deployed ref.
    pub(super) async fn pull_environment_metrics(&self, env: Environment) -> Result<()> {
        let mut previous = env.clone();
        let known = self.store.environment_exists(&env.key()).await?;
        if known {
            self.store.get_environment(&mut previous).await?;
        }

        let id = if env.id == 0 { previous.id } else { env.id };
        let tags_regexp = if env.tags_regexp.is_empty() {
            previous.tags_regexp.clone()
        } else {
            env.tags_regexp.clone()
        };

        let mut current = self.fetcher.get_environment(&env.project_name, id).await?;
        current.tags_regexp = tags_regexp;

        let latest_commit = self.latest_commit(&current).await?;
        let deployed_commit = current
            .latest_deployment
            .as_ref()
            .map(|d| d.commit_short_id.clone())
            .unwrap_or_default();
        current.latest_commit_short_id = latest_commit
            .as_ref()
            .map_or_else(|| deployed_commit.clone(), |c| c.short_id.clone());

        let labels = current.default_labels();
        let previous_status = previous.latest_deployment.as_ref().map(|d| d.status.clone());
        let information_labels = current.information_labels();

        let mut behind_commits = 0.0;
        if !deployed_commit.is_empty() && current.latest_commit_short_id != deployed_commit {
            let information =
                Metric::new(MetricKind::EnvironmentInformation, information_labels.clone());
            if self.store.metric_exists(&information.key()).await? {
                // Same commit pair as the exported information series, so the
                // count cannot have moved. Reuse it instead of reporting 0 for a
                // skipped lookup, which would make the series flap between pulls.
                let mut last =
                    Metric::new(MetricKind::EnvironmentBehindCommitsCount, labels.clone());
                if self.store.metric_exists(&last.key()).await? {
                    self.store.get_metric(&mut last).await?;
                    behind_commits = last.value;
                }
            } else {
                let count = self
                    .fetcher
                    .get_commit_count_between_refs(
                        &current.project_name,
                        &deployed_commit,
                        &current.latest_commit_short_id,
                    )
                    .await?;
                #[allow(clippy::cast_precision_loss)]
                let count = count as f64;
                behind_commits = count;
            }
        }

        let deployment = current.latest_deployment.clone();
        let deployed_at = deployment.as_ref().and_then(|d| d.created_at);
        let behind_duration = match (&latest_commit, deployed_at) {
            #[allow(clippy::cast_precision_loss)]
            (Some(commit), Some(created_at)) => {
                (commit.committed_date - created_at).num_seconds().max(0) as f64
            }
            _ => 0.0,
        };

        self.store.set_environment(current.clone()).await?;

        if known {
            let previous_labels = previous.information_labels();
            if previous_labels != information_labels {
                info!(
                    "environment project-name={} environment-name={} changed, replacing its information series",
                    current.project_name, current.name
                );
                self.retire(MetricKind::EnvironmentInformation, &previous_labels)
                    .await?;
            }
        }

        let mut metrics = vec![
            Metric::with_value(
                MetricKind::EnvironmentBehindCommitsCount,
                labels.clone(),
                behind_commits,
            ),
            Metric::with_value(
                MetricKind::EnvironmentBehindDurationSeconds,
                labels.clone(),
                behind_duration,
            ),
        ];

        if let Some(deployment) = &deployment {
            metrics.push(Metric::with_value(
                MetricKind::EnvironmentDeploymentDurationSeconds,
                labels.clone(),
                deployment.duration_seconds,
            ));
            if let Some(created_at) = deployment.created_at {
                #[allow(clippy::cast_precision_loss)]
                let timestamp = created_at.timestamp() as f64;
                metrics.push(Metric::with_value(
                    MetricKind::EnvironmentDeploymentTimestamp,
                    labels.clone(),
                    timestamp,
                ));
            }
            metrics.extend(status_metrics(
                MetricKind::EnvironmentDeploymentStatus,
                &labels,
                &deployment.status,
            ));
        }

        metrics.push(Metric::with_value(
            MetricKind::EnvironmentInformation,
            information_labels,
            1.0,
        ));

        self.emit_all(metrics).await?;
        self.retire_stale_status(
            MetricKind::EnvironmentDeploymentStatus,
            &labels,
            previous_status.as_deref(),
            deployment.as_ref().map_or("", |d| d.status.as_str()),
        )
        .await
    }

    /// Most recent commit of the ref kind that was last deployed. Merge
    /// request deployments and environments never deployed have none.
    async fn latest_commit(&self, env: &Environment) -> Result<Option<CommitSummary>> {
        let Some(deployment) = &env.latest_deployment else {
            debug!(
                "environment project-name={} environment-name={} has no deployment",
                env.project_name, env.name
            );
            return Ok(None);
        };

        match deployment.ref_kind {
            RefKind::Branch => self
                .fetcher
                .get_branch_latest_commit(&env.project_name, &deployment.ref_name)
                .await
                .map(Some),
            RefKind::Tag => self
                .fetcher
                .get_most_recent_tag_commit(&env.project_name, &env.tags_regexp)
                .await
                .map(Some),
            RefKind::MergeRequest => Ok(None),
        }
    }
}
