//! Turns scraped metric families into the wire batch and into enriched
//! per-device records.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tracing::error;

use crate::metrics::gpu::GpuMetricRecord;
use crate::metrics::scraper::ScrapeResult;
use crate::metrics::types::*;
use crate::pb;
use crate::workload::WorkloadResolver;

/// Identity of one GPU (or MIG partition) within a scrape cycle. Samples
/// sharing this key collapse into one enriched record.
#[derive(Debug, Clone, Hash, PartialEq, Eq)]
struct GpuMetricKey {
    device: String,
    pod: String,
    namespace: String,
    container: String,
    device_id: String,
    device_uuid: String,
    mig_profile: String,
    mig_instance_id: String,
}

impl GpuMetricKey {
    fn from_labels(labels: &HashMap<String, String>) -> Self {
        Self {
            device: label_value(labels, DEVICE_LABEL),
            pod: label_value(labels, POD_LABEL),
            namespace: label_value(labels, NAMESPACE_LABEL),
            container: label_value(labels, CONTAINER_LABEL),
            device_id: label_value(labels, GPU_ID_LABEL),
            device_uuid: label_value(labels, GPU_UUID_LABEL),
            mig_profile: label_value(labels, MIG_PROFILE_LABEL),
            mig_instance_id: label_value(labels, MIG_INSTANCE_ID_LABEL),
        }
    }
}

fn label_value(labels: &HashMap<String, String>, name: &str) -> String {
    labels.get(name).cloned().unwrap_or_default()
}

pub struct MetricMapper {
    node_name: Option<String>,
    resolver: Arc<WorkloadResolver>,
}

impl MetricMapper {
    pub fn new(node_name: Option<String>, resolver: Arc<WorkloadResolver>) -> Self {
        Self {
            node_name,
            resolver,
        }
    }

    /// Builds the wire batch: one entry per enabled metric name, with every
    /// matching sample across all scrape results flattened into its
    /// measurement list.
    pub fn map(&self, results: &[ScrapeResult]) -> pb::MetricsBatch {
        let mut metrics: HashMap<String, pb::Metric> = HashMap::new();

        for result in results {
            for (name, family) in &result.families {
                if !metric_enabled(name) {
                    continue;
                }

                let metric = metrics.entry(name.clone()).or_insert_with(|| pb::Metric {
                    name: name.clone(),
                    measurements: Vec::new(),
                });

                for sample in &family.samples {
                    metric.measurements.push(pb::Measurement {
                        value: sample.value.numeric(),
                        labels: self.map_labels(&sample.labels),
                    });
                }
            }
        }

        pb::MetricsBatch {
            metrics: metrics.into_values().collect(),
        }
    }

    /// Builds enriched per-device records grouped by identity key. The first
    /// sample for a new key initializes the record and, when the key has a
    /// pod name, resolves workload attribution once; resolver failures leave
    /// attribution unset. Record order is unspecified.
    pub async fn map_enriched(&self, results: &[ScrapeResult]) -> Vec<GpuMetricRecord> {
        let mut records: HashMap<GpuMetricKey, GpuMetricRecord> = HashMap::new();
        let scraped_at = Utc::now();

        for result in results {
            for (name, family) in &result.families {
                if !metric_enabled(name) {
                    continue;
                }

                for sample in &family.samples {
                    let key = GpuMetricKey::from_labels(&sample.labels);

                    let record = match records.entry(key) {
                        Entry::Occupied(entry) => entry.into_mut(),
                        Entry::Vacant(entry) => {
                            let mut record = self.new_record(entry.key(), &sample.labels);
                            record.timestamp = scraped_at;

                            if !entry.key().pod.is_empty() {
                                match self
                                    .resolver
                                    .find_workload_for_pod(&entry.key().pod, &entry.key().namespace)
                                    .await
                                {
                                    Ok(workload) => {
                                        record.workload_name = workload.name.clone();
                                        record.workload_kind = workload.kind.clone();
                                    }
                                    Err(err) => {
                                        error!(
                                            pod = %entry.key().pod,
                                            namespace = %entry.key().namespace,
                                            error = %err,
                                            "failed to resolve workload"
                                        );
                                    }
                                }
                            }

                            entry.insert(record)
                        }
                    };

                    record.set_metric(name, sample.value.numeric());
                }
            }
        }

        records.into_values().collect()
    }

    fn new_record(&self, key: &GpuMetricKey, labels: &HashMap<String, String>) -> GpuMetricRecord {
        let node_name = match &self.node_name {
            Some(node) => node.clone(),
            None => label_value(labels, HOSTNAME_LABEL),
        };

        GpuMetricRecord {
            node_name,
            model_name: label_value(labels, MODEL_NAME_LABEL),
            device: key.device.clone(),
            device_id: key.device_id.clone(),
            device_uuid: key.device_uuid.clone(),
            mig_profile: key.mig_profile.clone(),
            mig_instance_id: key.mig_instance_id.clone(),
            pod: key.pod.clone(),
            container: key.container.clone(),
            namespace: key.namespace.clone(),
            ..Default::default()
        }
    }

    fn map_labels(&self, labels: &HashMap<String, String>) -> Vec<pb::MetricLabel> {
        labels
            .iter()
            .map(|(name, value)| {
                let value = match &self.node_name {
                    // The exporter may report a container hostname; keep node
                    // attribution pointed at the actual node.
                    Some(node) if name.eq_ignore_ascii_case(HOSTNAME_LABEL) => node.clone(),
                    _ => value.clone(),
                };

                pb::MetricLabel {
                    name: name.clone(),
                    value,
                }
            })
            .collect()
    }
}
