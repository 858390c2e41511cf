use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::MetricKey;

/// Label names to values. Sorted, so that label order never changes a key.
pub type Labels = BTreeMap<String, String>;

/// Every series the exporter emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum MetricKind {
    Coverage,
    DurationSeconds,
    QueuedDurationSeconds,
    Id,
    Status,
    RunCount,
    Timestamp,
    TimeSinceLastRun,
    EnvironmentBehindCommitsCount,
    EnvironmentBehindDurationSeconds,
    EnvironmentDeploymentDurationSeconds,
    EnvironmentDeploymentStatus,
    EnvironmentDeploymentTimestamp,
    EnvironmentInformation,
}

impl MetricKind {
    pub const ALL: [Self; 14] = [
        Self::Coverage,
        Self::DurationSeconds,
        Self::QueuedDurationSeconds,
        Self::Id,
        Self::Status,
        Self::RunCount,
        Self::Timestamp,
        Self::TimeSinceLastRun,
        Self::EnvironmentBehindCommitsCount,
        Self::EnvironmentBehindDurationSeconds,
        Self::EnvironmentDeploymentDurationSeconds,
        Self::EnvironmentDeploymentStatus,
        Self::EnvironmentDeploymentTimestamp,
        Self::EnvironmentInformation,
    ];

    /// Exposed series name.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Coverage => "gitlab_ci_pipeline_coverage",
            Self::DurationSeconds => "gitlab_ci_pipeline_last_run_duration_seconds",
            Self::QueuedDurationSeconds => "gitlab_ci_pipeline_queued_duration_seconds",
            Self::Id => "gitlab_ci_pipeline_last_run_id",
            Self::Status => "gitlab_ci_pipeline_last_run_status",
            Self::RunCount => "gitlab_ci_pipeline_run_count",
            Self::Timestamp => "gitlab_ci_pipeline_timestamp",
            Self::TimeSinceLastRun => "gitlab_ci_pipeline_time_since_last_run_seconds",
            Self::EnvironmentBehindCommitsCount => "gitlab_ci_environment_behind_commits_count",
            Self::EnvironmentBehindDurationSeconds => {
                "gitlab_ci_environment_behind_duration_seconds"
            }
            Self::EnvironmentDeploymentDurationSeconds => {
                "gitlab_ci_environment_deployment_duration_seconds"
            }
            Self::EnvironmentDeploymentStatus => "gitlab_ci_environment_deployment_status",
            Self::EnvironmentDeploymentTimestamp => "gitlab_ci_environment_deployment_timestamp",
            Self::EnvironmentInformation => "gitlab_ci_environment_information",
        }
    }

    pub const fn help(self) -> &'static str {
        match self {
            Self::Coverage => "Coverage of the most recent pipeline",
            Self::DurationSeconds => "Duration of last pipeline run",
            Self::QueuedDurationSeconds => {
                "Duration for which the most recent pipeline has been queued"
            }
            Self::Id => "ID of the most recent pipeline",
            Self::Status => "Status of the most recent pipeline",
            Self::RunCount => "GitLab CI pipeline run count",
            Self::Timestamp => "Timestamp of the last update of the most recent pipeline",
            Self::TimeSinceLastRun => "Elapsed time since most recent GitLab CI pipeline run",
            Self::EnvironmentBehindCommitsCount => {
                "Number of commits the environment is behind given its last deployment"
            }
            Self::EnvironmentBehindDurationSeconds => {
                "Duration in seconds the environment is behind the most recent commit given its last deployment"
            }
            Self::EnvironmentDeploymentDurationSeconds => {
                "Duration of the latest deployment of the environment"
            }
            Self::EnvironmentDeploymentStatus => "Status of the latest deployment of the environment",
            Self::EnvironmentDeploymentTimestamp => {
                "Creation date of the latest deployment of the environment"
            }
            Self::EnvironmentInformation => "Information about the environment",
        }
    }

    pub const fn is_counter(self) -> bool {
        matches!(self, Self::RunCount)
    }
}

/// A single sample, addressed by its kind and labels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metric {
    pub kind: MetricKind,
    pub labels: Labels,
    pub value: f64,
}

impl Metric {
    pub fn new(kind: MetricKind, labels: Labels) -> Self {
        Self {
            kind,
            labels,
            value: 0.0,
        }
    }

    pub fn with_value(kind: MetricKind, labels: Labels, value: f64) -> Self {
        Self {
            kind,
            labels,
            value,
        }
    }

    pub fn key(&self) -> MetricKey {
        MetricKey(format!(
            "{}{{{}}}",
            self.kind.name(),
            format_labels(&self.labels)
        ))
    }
}

/// Renders `k="v",...` in label order, the identity part of a metric key.
fn format_labels(labels: &Labels) -> String {
    labels
        .iter()
        .map(|(name, value)| format!("{name}=\"{}\"", escape_label_value(value)))
        .collect::<Vec<_>>()
        .join(",")
}

fn escape_label_value(value: &str) -> String {
    value
        .replace('\\', r"\\")
        .replace('"', "\\\"")
        .replace('\n', r"\n")
}
