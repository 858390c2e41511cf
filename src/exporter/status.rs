use crate::schemas::{Labels, Metric, MetricKind};

/// Pipeline and deployment statuses, each exported as its own series.
pub const STATUSES: [&str; 11] = [
    "created",
    "waiting_for_resource",
    "preparing",
    "pending",
    "running",
    "success",
    "failed",
    "canceled",
    "skipped",
    "manual",
    "scheduled",
];

/// One sample per known status, 1 for `current` and 0 for the others.
///
/// A status outside of [`STATUSES`] gets a series of its own, so exactly one
/// sample is always set.
pub fn status_metrics(kind: MetricKind, labels: &Labels, current: &str) -> Vec<Metric> {
    let mut statuses: Vec<&str> = STATUSES.to_vec();
    if !current.is_empty() && !STATUSES.contains(&current) {
        statuses.push(current);
    }

    statuses
        .into_iter()
        .map(|status| {
            let value = if status == current { 1.0 } else { 0.0 };
            Metric::with_value(kind, status_labels(labels, status), value)
        })
        .collect()
}

pub fn status_labels(labels: &Labels, status: &str) -> Labels {
    let mut labels = labels.clone();
    labels.insert("status".to_string(), status.to_string());
    labels
}

/// The previous status when it had a series of its own that the emission of
/// `current` no longer covers.
pub fn stale_status<'a>(previous: Option<&'a str>, current: &str) -> Option<&'a str> {
    previous.filter(|previous| {
        !previous.is_empty() && *previous != current && !STATUSES.contains(previous)
    })
}

#[cfg(test)]
#[allow(clippy::float_cmp)]
mod tests {
    use super::*;

    fn labels() -> Labels {
        Labels::from([("project".to_string(), "group/app".to_string())])
    }

    fn set_statuses(metrics: &[Metric]) -> Vec<&str> {
        metrics
            .iter()
            .filter(|m| m.value == 1.0)
            .map(|m| m.labels["status"].as_str())
            .collect()
    }

    #[test]
    fn test_exactly_one_status_is_set() {
        let metrics = status_metrics(MetricKind::Status, &labels(), "failed");

        assert_eq!(metrics.len(), STATUSES.len());
        assert_eq!(set_statuses(&metrics), vec!["failed"]);
        assert!(metrics.iter().all(|m| m.labels["project"] == "group/app"));
    }

    #[test]
    fn test_unknown_status_gets_its_own_series() {
        let metrics = status_metrics(MetricKind::EnvironmentDeploymentStatus, &labels(), "blocked");

        assert_eq!(metrics.len(), STATUSES.len() + 1);
        assert_eq!(set_statuses(&metrics), vec!["blocked"]);
    }

    #[test]
    fn test_stale_status() {
        assert_eq!(stale_status(Some("blocked"), "success"), Some("blocked"));
        assert_eq!(stale_status(Some("blocked"), ""), Some("blocked"));
        assert_eq!(stale_status(Some("blocked"), "blocked"), None);
        assert_eq!(stale_status(Some("running"), "success"), None);
        assert_eq!(stale_status(None, "success"), None);
    }

    #[test]
    fn test_empty_status_sets_nothing() {
        let metrics = status_metrics(MetricKind::Status, &labels(), "");
        assert!(set_statuses(&metrics).is_empty());
    }
}
