use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use gpufeed::config::Config;
use gpufeed::k8s::KubeMetadataSource;
use gpufeed::metrics::{Exporter, ExporterConfig, HttpScraper, MetricMapper};
use gpufeed::upload::{UploadClient, UploadConfig};
use gpufeed::workload::{ResolverConfig, WorkloadResolver};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = Config::parse();

    let filter = EnvFilter::try_new(&cfg.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("Starting gpufeed v{}", gpufeed::VERSION);

    // Unrecoverable misconfiguration is fatal here; once the loop is running
    // the process only exits on a shutdown signal.
    let source = Arc::new(
        KubeMetadataSource::try_default()
            .await
            .context("failed to create kubernetes client")?,
    );

    let resolver = Arc::new(
        WorkloadResolver::new(
            source.clone(),
            ResolverConfig {
                label_keys: cfg.workload_label_keys.clone(),
                cache_size: cfg.workload_cache_size,
            },
        )
        .context("failed to create workload resolver")?,
    );

    let scraper = HttpScraper::new().context("failed to create scraper")?;
    let mapper = MetricMapper::new(cfg.node_name.clone(), resolver);

    let uploader = Arc::new(
        UploadClient::new(UploadConfig {
            api_url: cfg.api_url.clone(),
            api_key: cfg.api_key.clone(),
            cluster_id: cfg.cluster_id.clone(),
        })
        .context("failed to create upload client")?,
    );

    let exporter = Arc::new(Exporter::new(
        ExporterConfig {
            export_interval: cfg.export_interval(),
            scrape_port: cfg.dcgm_port,
            scrape_path: cfg.dcgm_metrics_endpoint.clone(),
            scrape_host: cfg.dcgm_host.clone(),
            selector: cfg.dcgm_labels.clone(),
            node_name: cfg.node_name.clone(),
            enabled: cfg.export_enabled,
        },
        source,
        scraper,
        mapper,
        uploader,
        None,
    ));

    let token = CancellationToken::new();
    let server_task = tokio::spawn(gpufeed::server::serve(cfg.http_listen_port, token.clone()));
    let export_task = tokio::spawn(exporter.start(token.clone()));

    let mut sigterm = signal(SignalKind::terminate()).context("failed to install SIGTERM handler")?;
    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("Interrupt received, shutting down"),
        _ = sigterm.recv() => info!("SIGTERM received, shutting down"),
    }
    token.cancel();

    if let Ok(Err(err)) = export_task.await {
        error!(error = %err, "exporter stopped with error");
    }
    if let Ok(Err(err)) = server_task.await {
        error!(error = %err, "health server stopped with error");
    }

    info!("gpufeed stopped");
    Ok(())
}
