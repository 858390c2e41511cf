//! Where derived values are published for scraping.

use log::{debug, warn};
use prometheus::{CounterVec, Encoder, GaugeVec, Opts, TextEncoder};
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError};

use crate::error::{ExporterError, Result};
use crate::schemas::{Labels, MetricKind};

/// Destination of emitted samples. Exposition is the sink's concern.
pub trait MetricsSink: Send + Sync {
    /// Gauge semantics, last value wins.
    fn set(&self, kind: MetricKind, labels: &Labels, value: f64);

    /// Counter semantics, adds one to the current value.
    fn inc(&self, kind: MetricKind, labels: &Labels);

    /// Drops a series that no longer describes the current state.
    fn remove(&self, kind: MetricKind, labels: &Labels);
}

enum Series {
    Gauge(GaugeVec),
    Counter(CounterVec),
}

/// One registered vector. Its label names are fixed by the first sample.
struct Family {
    label_names: Vec<String>,
    series: Series,
}

impl Family {
    fn new(kind: MetricKind, labels: &Labels) -> prometheus::Result<Self> {
        let opts = Opts::new(kind.name(), kind.help());
        let names: Vec<&str> = labels.keys().map(String::as_str).collect();
        let series = if kind.is_counter() {
            Series::Counter(CounterVec::new(opts, &names)?)
        } else {
            Series::Gauge(GaugeVec::new(opts, &names)?)
        };

        Ok(Self {
            label_names: labels.keys().cloned().collect(),
            series,
        })
    }

    /// Label values in registration order, or `None` when the names differ.
    fn values<'a>(&self, labels: &'a Labels) -> Option<Vec<&'a str>> {
        labels
            .keys()
            .eq(self.label_names.iter())
            .then(|| labels.values().map(String::as_str).collect())
    }
}

/// Prometheus registry holding one vector per [`MetricKind`].
pub struct Registry {
    registry: prometheus::Registry,
    families: Mutex<BTreeMap<MetricKind, Family>>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    pub fn new() -> Self {
        Self {
            registry: prometheus::Registry::new(),
            families: Mutex::new(BTreeMap::new()),
        }
    }

    /// Current value of a series, if it was ever emitted.
    pub fn value(&self, kind: MetricKind, labels: &Labels) -> Option<f64> {
        self.samples(kind)
            .into_iter()
            .find_map(|(sample, value)| (&sample == labels).then_some(value))
    }

    /// Samples of one series kind, sorted by labels.
    pub fn samples(&self, kind: MetricKind) -> Vec<(Labels, f64)> {
        let mut samples: Vec<(Labels, f64)> = self
            .registry
            .gather()
            .iter()
            .filter(|family| family.get_name() == kind.name())
            .flat_map(|family| family.get_metric())
            .map(|metric| {
                let labels = metric
                    .get_label()
                    .iter()
                    .map(|pair| (pair.get_name().to_string(), pair.get_value().to_string()))
                    .collect();
                let value = if kind.is_counter() {
                    metric.get_counter().get_value()
                } else {
                    metric.get_gauge().get_value()
                };
                (labels, value)
            })
            .collect();

        samples.sort_by(|a, b| a.0.cmp(&b.0));
        samples
    }

    /// Text exposition of every live series.
    pub fn render(&self) -> Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer)
            .map_err(|err| ExporterError::Metrics(prometheus::Error::Msg(err.to_string())))
    }

    /// Runs `update` against the vector of `kind`, registering it on first use.
    fn update(
        &self,
        kind: MetricKind,
        labels: &Labels,
        update: impl FnOnce(&Series, &[&str]) -> prometheus::Result<()>,
    ) {
        let mut families = self.families.lock().unwrap_or_else(PoisonError::into_inner);

        let family = match families.entry(kind) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => match self.register(kind, labels) {
                Ok(family) => entry.insert(family),
                Err(err) => {
                    warn!("could not register series {}: {err}", kind.name());
                    return;
                }
            },
        };

        let Some(values) = family.values(labels) else {
            warn!(
                "series {} expects labels {:?}, dropping sample",
                kind.name(),
                family.label_names
            );
            return;
        };

        if let Err(err) = update(&family.series, &values) {
            warn!("could not update series {}: {err}", kind.name());
        }
    }

    fn register(&self, kind: MetricKind, labels: &Labels) -> prometheus::Result<Family> {
        let family = Family::new(kind, labels)?;
        match &family.series {
            Series::Gauge(vec) => self.registry.register(Box::new(vec.clone()))?,
            Series::Counter(vec) => self.registry.register(Box::new(vec.clone()))?,
        }
        Ok(family)
    }
}

impl MetricsSink for Registry {
    fn set(&self, kind: MetricKind, labels: &Labels, value: f64) {
        self.update(kind, labels, |series, values| {
            match series {
                Series::Gauge(vec) => vec.get_metric_with_label_values(values)?.set(value),
                // Counters cannot go down: restart from zero and add the value.
                Series::Counter(vec) => {
                    let counter = vec.get_metric_with_label_values(values)?;
                    counter.reset();
                    counter.inc_by(value);
                }
            }
            Ok(())
        });
    }

    fn inc(&self, kind: MetricKind, labels: &Labels) {
        self.update(kind, labels, |series, values| {
            match series {
                Series::Gauge(vec) => vec.get_metric_with_label_values(values)?.inc(),
                Series::Counter(vec) => vec.get_metric_with_label_values(values)?.inc(),
            }
            Ok(())
        });
    }

    fn remove(&self, kind: MetricKind, labels: &Labels) {
        let families = self.families.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(family) = families.get(&kind) else {
            return;
        };
        let Some(values) = family.values(labels) else {
            return;
        };

        let removed = match &family.series {
            Series::Gauge(vec) => vec.remove_label_values(&values),
            Series::Counter(vec) => vec.remove_label_values(&values),
        };
        if let Err(err) = removed {
            debug!("series {} was not exported: {err}", kind.name());
        }
    }
}
