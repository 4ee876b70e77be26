//! DCGM metric and label names used across the pipeline.
//!
//! Keeping every name in one place prevents typos and makes the allow-list
//! auditable at a glance.

// Profiling metrics.
pub const METRIC_SM_ACTIVE: &str = "DCGM_FI_PROF_SM_ACTIVE";
pub const METRIC_SM_OCCUPANCY: &str = "DCGM_FI_PROF_SM_OCCUPANCY";
pub const METRIC_TENSOR_ACTIVE: &str = "DCGM_FI_PROF_PIPE_TENSOR_ACTIVE";
pub const METRIC_DRAM_ACTIVE: &str = "DCGM_FI_PROF_DRAM_ACTIVE";
pub const METRIC_PCIE_TX_BYTES: &str = "DCGM_FI_PROF_PCIE_TX_BYTES";
pub const METRIC_PCIE_RX_BYTES: &str = "DCGM_FI_PROF_PCIE_RX_BYTES";
pub const METRIC_NVLINK_TX_BYTES: &str = "DCGM_FI_PROF_NVLINK_TX_BYTES";
pub const METRIC_NVLINK_RX_BYTES: &str = "DCGM_FI_PROF_NVLINK_RX_BYTES";
pub const METRIC_GRAPHICS_ENGINE_ACTIVE: &str = "DCGM_FI_PROF_GR_ENGINE_ACTIVE";
pub const METRIC_INT_PIPE_ACTIVE: &str = "DCGM_FI_PROF_PIPE_INT_ACTIVE";
pub const METRIC_FP16_PIPE_ACTIVE: &str = "DCGM_FI_PROF_PIPE_FP16_ACTIVE";
pub const METRIC_FP32_PIPE_ACTIVE: &str = "DCGM_FI_PROF_PIPE_FP32_ACTIVE";
pub const METRIC_FP64_PIPE_ACTIVE: &str = "DCGM_FI_PROF_PIPE_FP64_ACTIVE";

// Device metrics.
pub const METRIC_FRAMEBUFFER_TOTAL: &str = "DCGM_FI_DEV_FB_TOTAL";
pub const METRIC_FRAMEBUFFER_FREE: &str = "DCGM_FI_DEV_FB_FREE";
pub const METRIC_FRAMEBUFFER_USED: &str = "DCGM_FI_DEV_FB_USED";
pub const METRIC_PCIE_LINK_GEN: &str = "DCGM_FI_DEV_PCIE_LINK_GEN";
pub const METRIC_PCIE_LINK_WIDTH: &str = "DCGM_FI_DEV_PCIE_LINK_WIDTH";
pub const METRIC_GPU_TEMPERATURE: &str = "DCGM_FI_DEV_GPU_TEMP";
pub const METRIC_MEMORY_TEMPERATURE: &str = "DCGM_FI_DEV_MEMORY_TEMP";
pub const METRIC_POWER_USAGE: &str = "DCGM_FI_DEV_POWER_USAGE";
pub const METRIC_GPU_UTILIZATION: &str = "DCGM_FI_DEV_GPU_UTIL";
pub const METRIC_CLOCKS_EVENT_REASONS: &str = "DCGM_FI_DEV_CLOCKS_EVENT_REASONS";
pub const METRIC_XID_ERRORS: &str = "DCGM_FI_DEV_XID_ERRORS";
pub const METRIC_POWER_VIOLATION: &str = "DCGM_FI_DEV_POWER_VIOLATION";
pub const METRIC_THERMAL_VIOLATION: &str = "DCGM_FI_DEV_THERMAL_VIOLATION";

// Labels attached by the DCGM exporter.
pub const HOSTNAME_LABEL: &str = "Hostname";
pub const MODEL_NAME_LABEL: &str = "modelName";
pub const DEVICE_LABEL: &str = "device";
pub const POD_LABEL: &str = "pod";
pub const CONTAINER_LABEL: &str = "container";
pub const NAMESPACE_LABEL: &str = "namespace";
pub const GPU_ID_LABEL: &str = "gpu";
pub const GPU_UUID_LABEL: &str = "UUID";
pub const MIG_PROFILE_LABEL: &str = "GPU_I_PROFILE";
pub const MIG_INSTANCE_ID_LABEL: &str = "GPU_I_ID";

/// The closed allow-list of metrics that make it onto the wire. Families not
/// listed here are dropped before any label processing; there is no wildcard
/// matching.
pub const ENABLED_METRICS: &[&str] = &[
    METRIC_GRAPHICS_ENGINE_ACTIVE,
    METRIC_FRAMEBUFFER_TOTAL,
    METRIC_FRAMEBUFFER_FREE,
    METRIC_FRAMEBUFFER_USED,
    METRIC_SM_ACTIVE,
    METRIC_SM_OCCUPANCY,
    METRIC_DRAM_ACTIVE,
    METRIC_INT_PIPE_ACTIVE,
    METRIC_FP16_PIPE_ACTIVE,
    METRIC_FP32_PIPE_ACTIVE,
    METRIC_FP64_PIPE_ACTIVE,
];

pub fn metric_enabled(name: &str) -> bool {
    ENABLED_METRICS.contains(&name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allow_list_is_closed() {
        assert!(metric_enabled(METRIC_SM_ACTIVE));
        assert!(metric_enabled(METRIC_FRAMEBUFFER_USED));
        assert!(!metric_enabled(METRIC_GPU_TEMPERATURE));
        assert!(!metric_enabled("DCGM_FI_PROF_SM_ACTIVE_extra"));
        assert!(!metric_enabled(""));
    }
}
