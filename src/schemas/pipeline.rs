use log::warn;
use serde::{Deserialize, Serialize};

use crate::fetcher::UpstreamPipeline;

/// Snapshot of the most recent pipeline of a ref, as exported.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Pipeline {
    pub id: u64,
    /// Test coverage percentage, 0 when absent or unparsable
    pub coverage: f64,
    /// Unix timestamp of the last update, 0 when unknown
    pub timestamp: f64,
    pub duration_seconds: f64,
    /// Time spent waiting for a runner between creation and start
    pub queued_duration_seconds: f64,
    pub status: String,
}

impl Pipeline {
    /// Derives the exported snapshot from the upstream payload.
    ///
    /// Never fails: an unparsable coverage is logged and exported as 0.
    pub fn derive(upstream: &UpstreamPipeline) -> Self {
        let coverage = match upstream.coverage.as_deref() {
            None | Some("") => 0.0,
            Some(raw) => raw.parse::<f64>().unwrap_or_else(|err| {
                warn!(
                    "could not parse coverage string '{raw}' of pipeline {} into a float: {err}",
                    upstream.id
                );
                0.0
            }),
        };

        #[allow(clippy::cast_precision_loss)]
        let timestamp = upstream
            .updated_at
            .map_or(0.0, |updated_at| updated_at.timestamp() as f64);

        let queued_duration_seconds = match (upstream.created_at, upstream.started_at) {
            #[allow(clippy::cast_precision_loss)]
            (Some(created_at), Some(started_at)) if started_at > created_at => {
                (started_at - created_at).num_milliseconds() as f64 / 1000.0
            }
            _ => 0.0,
        };

        #[allow(clippy::cast_precision_loss)]
        let duration_seconds = upstream.duration.unwrap_or(0) as f64;

        Self {
            id: upstream.id,
            coverage,
            timestamp,
            duration_seconds,
            queued_duration_seconds,
            status: upstream.status.clone(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::float_cmp)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn upstream(id: u64, coverage: Option<&str>, status: &str) -> UpstreamPipeline {
        UpstreamPipeline {
            id,
            coverage: coverage.map(ToString::to_string),
            created_at: None,
            started_at: None,
            updated_at: Some(Utc.with_ymd_and_hms(2020, 10, 1, 13, 5, 10).unwrap()),
            duration: Some(15),
            status: status.to_string(),
        }
    }

    #[test]
    fn test_derive_pending_pipeline() {
        let pipeline = Pipeline::derive(&upstream(20, Some("25.6"), "pending"));

        assert_eq!(
            pipeline,
            Pipeline {
                id: 20,
                coverage: 25.6,
                timestamp: 1_601_557_510.0,
                duration_seconds: 15.0,
                queued_duration_seconds: 0.0,
                status: "pending".to_string(),
            }
        );
    }

    #[test]
    fn test_derive_running_pipeline_queued_duration() {
        let mut running = upstream(21, Some("25.6"), "running");
        running.created_at = Some(Utc.with_ymd_and_hms(2020, 10, 1, 13, 4, 10).unwrap());
        running.started_at = Some(Utc.with_ymd_and_hms(2020, 10, 1, 13, 5, 10).unwrap());

        let pipeline = Pipeline::derive(&running);
        assert_eq!(pipeline.queued_duration_seconds, 60.0);
        assert_eq!(pipeline.status, "running");
    }

    #[test]
    fn test_queued_duration_is_zero_when_started_before_creation() {
        let mut skewed = upstream(22, None, "running");
        skewed.created_at = Some(Utc.with_ymd_and_hms(2020, 10, 1, 13, 6, 0).unwrap());
        skewed.started_at = Some(Utc.with_ymd_and_hms(2020, 10, 1, 13, 5, 10).unwrap());

        assert_eq!(Pipeline::derive(&skewed).queued_duration_seconds, 0.0);
    }

    #[test]
    fn test_queued_duration_is_zero_when_started_at_creation() {
        let at = Utc.with_ymd_and_hms(2020, 10, 1, 13, 5, 10).unwrap();
        let mut instant = upstream(23, None, "running");
        instant.created_at = Some(at);
        instant.started_at = Some(at);

        assert_eq!(Pipeline::derive(&instant).queued_duration_seconds, 0.0);
    }

    #[test]
    fn test_queued_duration_is_zero_without_start() {
        let mut created = upstream(24, None, "created");
        created.created_at = Some(Utc.with_ymd_and_hms(2020, 10, 1, 13, 4, 10).unwrap());

        assert_eq!(Pipeline::derive(&created).queued_duration_seconds, 0.0);
    }

    #[test]
    fn test_unparsable_coverage_defaults_to_zero() {
        let pipeline = Pipeline::derive(&upstream(25, Some("n/a"), "success"));
        assert_eq!(pipeline.coverage, 0.0);
        assert_eq!(pipeline.id, 25);
        assert_eq!(pipeline.duration_seconds, 15.0);
    }

    #[test]
    fn test_missing_timestamps_default_to_zero() {
        let mut bare = upstream(26, None, "success");
        bare.updated_at = None;
        bare.duration = None;

        let pipeline = Pipeline::derive(&bare);
        assert_eq!(pipeline.timestamp, 0.0);
        assert_eq!(pipeline.duration_seconds, 0.0);
    }

    #[test]
    fn test_derive_is_deterministic() {
        let payload = upstream(27, Some("99.1"), "failed");
        assert_eq!(Pipeline::derive(&payload), Pipeline::derive(&payload));
    }
}
