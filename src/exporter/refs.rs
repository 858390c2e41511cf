use chrono::{DateTime, Utc};
use log::{debug, info};

use super::{status_metrics, Exporter};
use crate::error::Result;
use crate::schemas::{Labels, Metric, MetricKind, Pipeline, Ref};

impl Exporter {
    /// Exports the most recent pipeline of `r`.
    ///
    /// The run counter moves only when the pipeline differs from the one seen
    /// on the previous pull, so repeated pulls of the same run are harmless.
    pub(super) async fn pull_ref_metrics(&self, mut r: Ref, now: DateTime<Utc>) -> Result<()> {
        if self.store.ref_exists(&r.key()).await? {
            self.store.get_ref(&mut r).await?;
        }

        let Some(upstream) = self.fetcher.get_latest_pipeline(&r).await? else {
            debug!(
                "no pipeline found for project-name={} ref-kind={} ref={}",
                r.project.name, r.kind, r.name
            );
            return Ok(());
        };

        let pipeline = Pipeline::derive(&upstream);
        let labels = r.default_labels();
        let previous_status = r.latest_pipeline.as_ref().map(|p| p.status.clone());
        let new_run = r
            .latest_pipeline
            .as_ref()
            .map_or(true, |previous| previous.id != pipeline.id);

        let mut run_count = Metric::new(MetricKind::RunCount, labels.clone());
        if new_run && self.store.metric_exists(&run_count.key()).await? {
            self.store.get_metric(&mut run_count).await?;
        }

        r.latest_pipeline = Some(pipeline.clone());
        self.store.set_ref(r.clone()).await?;

        if new_run {
            info!(
                "new pipeline {} ({}) for project-name={} ref-kind={} ref={}",
                pipeline.id, pipeline.status, r.project.name, r.kind, r.name
            );
            run_count.value += 1.0;
            self.sink.inc(run_count.kind, &run_count.labels);
            self.store.set_metric(run_count).await?;
        }

        self.emit_all(ref_metrics(&labels, &pipeline, now)).await?;
        self.retire_stale_status(
            MetricKind::Status,
            &labels,
            previous_status.as_deref(),
            &pipeline.status,
        )
        .await
    }
}

/// Gauges describing `pipeline`, the run counter aside.
fn ref_metrics(labels: &Labels, pipeline: &Pipeline, now: DateTime<Utc>) -> Vec<Metric> {
    let gauge = |kind, value| Metric::with_value(kind, labels.clone(), value);

    #[allow(clippy::cast_precision_loss)]
    let mut metrics = vec![
        gauge(MetricKind::Coverage, pipeline.coverage),
        gauge(MetricKind::DurationSeconds, pipeline.duration_seconds),
        gauge(MetricKind::QueuedDurationSeconds, pipeline.queued_duration_seconds),
        gauge(MetricKind::Id, pipeline.id as f64),
        gauge(MetricKind::Timestamp, pipeline.timestamp),
    ];

    if pipeline.timestamp > 0.0 {
        #[allow(clippy::cast_precision_loss)]
        let elapsed = (now.timestamp() as f64 - pipeline.timestamp).max(0.0);
        metrics.push(gauge(MetricKind::TimeSinceLastRun, elapsed));
    }

    metrics.extend(status_metrics(MetricKind::Status, labels, &pipeline.status));
    metrics
}
