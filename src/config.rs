//! Process configuration. Every option maps to an environment variable,
//! which is how the agent is configured when it runs in-cluster; flags exist
//! mostly for local runs.

use std::time::Duration;

use clap::Parser;

#[derive(Debug, Clone, Parser)]
#[command(name = "gpufeed")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "GPU telemetry export agent for Kubernetes", long_about = None)]
pub struct Config {
    #[arg(long, env = "HTTP_LISTEN_PORT", default_value_t = 6061)]
    pub http_listen_port: u16,

    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Label selector identifying DCGM exporter pods.
    #[arg(
        long,
        env = "DCGM_LABELS",
        default_value = "app.kubernetes.io/name=dcgm-exporter"
    )]
    pub dcgm_labels: String,

    #[arg(long, env = "DCGM_PORT", default_value_t = 9400)]
    pub dcgm_port: u16,

    #[arg(long, env = "DCGM_METRICS_ENDPOINT", default_value = "/metrics")]
    pub dcgm_metrics_endpoint: String,

    /// Fixed scrape host. Set, pod discovery is bypassed entirely.
    #[arg(long, env = "DCGM_HOST")]
    pub dcgm_host: Option<String>,

    /// Node this agent runs on. Restricts discovery to that node and
    /// overrides the Hostname label on outgoing measurements.
    #[arg(long, env = "NODE_NAME")]
    pub node_name: Option<String>,

    #[arg(long, env = "EXPORT_INTERVAL_SECONDS", default_value_t = 15)]
    pub export_interval_seconds: u64,

    /// Base URL of the remote collector API.
    #[arg(long, env = "API_URL")]
    pub api_url: String,

    #[arg(long, env = "CLUSTER_ID")]
    pub cluster_id: String,

    #[arg(long, env = "API_KEY", hide_env_values = true)]
    pub api_key: String,

    #[arg(long, env = "WORKLOAD_CACHE_SIZE", default_value_t = 512)]
    pub workload_cache_size: usize,

    /// Pod label keys that name the workload directly, comma separated,
    /// checked in order.
    #[arg(
        long,
        env = "WORKLOAD_LABEL_KEYS",
        default_value = "gpufeed.io/workload",
        value_delimiter = ','
    )]
    pub workload_label_keys: Vec<String>,

    /// Whether exporting starts enabled.
    #[arg(
        long,
        env = "EXPORT_ENABLED",
        default_value_t = true,
        action = clap::ArgAction::Set
    )]
    pub export_enabled: bool,
}

impl Config {
    pub fn export_interval(&self) -> Duration {
        Duration::from_secs(self.export_interval_seconds)
    }
}
