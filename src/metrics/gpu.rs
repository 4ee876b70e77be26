//! Enriched per-device metric records and the sink they are written to.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::metrics::types::*;
use crate::Result;

/// One row per GPU (or MIG partition) per scrape cycle, carrying device
/// identity, workload attribution and every enabled metric as a named field.
///
/// Records are built fresh each cycle; a metric absent from the cycle's
/// samples stays at zero rather than carrying over a previous value.
#[derive(Debug, Clone, Default, Serialize)]
pub struct GpuMetricRecord {
    pub node_name: String,
    pub model_name: String,
    pub device: String,
    pub device_id: String,
    pub device_uuid: String,
    pub mig_profile: String,
    pub mig_instance_id: String,

    pub pod: String,
    pub container: String,
    pub namespace: String,
    pub workload_name: String,
    pub workload_kind: String,

    pub sm_active: f64,
    pub sm_occupancy: f64,
    pub tensor_active: f64,
    pub dram_active: f64,
    pub pcie_tx_bytes: f64,
    pub pcie_rx_bytes: f64,
    pub nvlink_tx_bytes: f64,
    pub nvlink_rx_bytes: f64,
    pub graphics_engine_active: f64,
    pub framebuffer_total: f64,
    pub framebuffer_used: f64,
    pub framebuffer_free: f64,
    pub pcie_link_gen: f64,
    pub pcie_link_width: f64,
    pub temperature: f64,
    pub memory_temperature: f64,
    pub power_usage: f64,
    pub gpu_utilization: f64,
    pub int_pipe_active: f64,
    pub fp16_pipe_active: f64,
    pub fp32_pipe_active: f64,
    pub fp64_pipe_active: f64,
    pub clocks_event_reasons: f64,
    pub xid_errors: f64,
    pub power_violation: f64,
    pub thermal_violation: f64,

    #[serde(rename = "ts")]
    pub timestamp: DateTime<Utc>,
}

impl GpuMetricRecord {
    /// Writes one metric value into its named field. Unknown names are
    /// ignored; repeated names within a cycle are last-writer-wins.
    pub fn set_metric(&mut self, name: &str, value: f64) {
        match name {
            METRIC_SM_ACTIVE => self.sm_active = value,
            METRIC_SM_OCCUPANCY => self.sm_occupancy = value,
            METRIC_TENSOR_ACTIVE => self.tensor_active = value,
            METRIC_DRAM_ACTIVE => self.dram_active = value,
            METRIC_PCIE_TX_BYTES => self.pcie_tx_bytes = value,
            METRIC_PCIE_RX_BYTES => self.pcie_rx_bytes = value,
            METRIC_NVLINK_TX_BYTES => self.nvlink_tx_bytes = value,
            METRIC_NVLINK_RX_BYTES => self.nvlink_rx_bytes = value,
            METRIC_GRAPHICS_ENGINE_ACTIVE => self.graphics_engine_active = value,
            METRIC_FRAMEBUFFER_TOTAL => self.framebuffer_total = value,
            METRIC_FRAMEBUFFER_FREE => self.framebuffer_free = value,
            METRIC_FRAMEBUFFER_USED => self.framebuffer_used = value,
            METRIC_PCIE_LINK_GEN => self.pcie_link_gen = value,
            METRIC_PCIE_LINK_WIDTH => self.pcie_link_width = value,
            METRIC_GPU_TEMPERATURE => self.temperature = value,
            METRIC_MEMORY_TEMPERATURE => self.memory_temperature = value,
            METRIC_POWER_USAGE => self.power_usage = value,
            METRIC_GPU_UTILIZATION => self.gpu_utilization = value,
            METRIC_INT_PIPE_ACTIVE => self.int_pipe_active = value,
            METRIC_FP16_PIPE_ACTIVE => self.fp16_pipe_active = value,
            METRIC_FP32_PIPE_ACTIVE => self.fp32_pipe_active = value,
            METRIC_FP64_PIPE_ACTIVE => self.fp64_pipe_active = value,
            METRIC_CLOCKS_EVENT_REASONS => self.clocks_event_reasons = value,
            METRIC_XID_ERRORS => self.xid_errors = value,
            METRIC_POWER_VIOLATION => self.power_violation = value,
            METRIC_THERMAL_VIOLATION => self.thermal_violation = value,
            _ => {}
        }
    }
}

/// A secondary destination for enriched records, written one record at a
/// time. Optional: the exporter runs fine without one.
#[async_trait]
pub trait MetricSink: Send + Sync {
    async fn write(&self, record: &GpuMetricRecord) -> Result<()>;
}
