//! The timed export loop: discover scrape targets, scrape, map, upload.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::k8s::MetadataSource;
use crate::metrics::gpu::MetricSink;
use crate::metrics::mapper::MetricMapper;
use crate::metrics::scraper::HttpScraper;
use crate::upload::BatchSink;
use crate::Result;

#[derive(Debug, Clone)]
pub struct ExporterConfig {
    pub export_interval: Duration,
    pub scrape_port: u16,
    pub scrape_path: String,
    /// A fixed scrape host. Set, discovery is bypassed and exactly one URL
    /// is scraped.
    pub scrape_host: Option<String>,
    /// Label selector identifying telemetry-exporter pods.
    pub selector: String,
    /// Restricts discovery to pods scheduled on this node.
    pub node_name: Option<String>,
    pub enabled: bool,
}

pub struct Exporter {
    cfg: ExporterConfig,
    source: Arc<dyn MetadataSource>,
    scraper: HttpScraper,
    mapper: MetricMapper,
    uploader: Arc<dyn BatchSink>,
    sink: Option<Arc<dyn MetricSink>>,
    enabled: AtomicBool,
}

impl Exporter {
    pub fn new(
        cfg: ExporterConfig,
        source: Arc<dyn MetadataSource>,
        scraper: HttpScraper,
        mapper: MetricMapper,
        uploader: Arc<dyn BatchSink>,
        sink: Option<Arc<dyn MetricSink>>,
    ) -> Self {
        let enabled = AtomicBool::new(cfg.enabled);

        Self {
            cfg,
            source,
            scraper,
            mapper,
            uploader,
            sink,
            enabled,
        }
    }

    pub fn enable(&self) {
        self.enabled.store(true, Ordering::SeqCst);
    }

    pub fn disable(&self) {
        self.enabled.store(false, Ordering::SeqCst);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    /// Runs the export loop until the token is cancelled. Ticks are
    /// independent: every enabled tick spawns its own cycle, so a slow cycle
    /// neither delays the next tick nor excludes overlapping with it.
    pub async fn start(self: Arc<Self>, token: CancellationToken) -> Result<()> {
        let mut ticker = tokio::time::interval(self.cfg.export_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first interval tick completes immediately; consume it so the
        // first cycle runs one full interval after startup.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = token.cancelled() => return Ok(()),
                _ = ticker.tick() => {
                    if !self.is_enabled() {
                        continue;
                    }

                    let exporter = Arc::clone(&self);
                    let cycle_token = token.clone();
                    tokio::spawn(async move {
                        if let Err(err) = exporter.export(&cycle_token).await {
                            error!(error = %err, "export error");
                        }
                    });
                }
            }
        }
    }

    /// One export cycle. Failures are cycle-scoped: this cycle's data is
    /// dropped and the next tick starts from fresh scrapes.
    pub async fn export(&self, token: &CancellationToken) -> Result<()> {
        let urls = self.scrape_urls().await?;
        if urls.is_empty() {
            info!("no telemetry endpoints to scrape");
            return Ok(());
        }

        let results = self.scraper.scrape(token, &urls).await?;
        if results.is_empty() {
            warn!(targets = urls.len(), "no metrics collected from telemetry endpoints");
            return Ok(());
        }

        let batch = self.mapper.map(&results);
        if batch.metrics.is_empty() {
            warn!(scraped = results.len(), "no enabled metrics to export");
            return Ok(());
        }

        let count = batch.metrics.len();
        let upload = self.uploader.upload_batch(token, &batch).await;
        if upload.is_ok() {
            info!(metrics = count, "successfully exported metrics");
        }

        // The enriched path runs regardless of the upload outcome; the two
        // are independent destinations.
        if let Some(sink) = &self.sink {
            let records = self.mapper.map_enriched(&results).await;
            for record in &records {
                if let Err(err) = sink.write(record).await {
                    warn!(error = %err, "enriched record write failed, dropping the rest of this cycle");
                    break;
                }
            }
        }

        upload
    }

    async fn scrape_urls(&self) -> Result<Vec<String>> {
        if let Some(host) = &self.cfg.scrape_host {
            return Ok(vec![format!(
                "http://{}:{}{}",
                host, self.cfg.scrape_port, self.cfg.scrape_path
            )]);
        }

        let pods = self
            .source
            .list_running_pods(&self.cfg.selector, self.cfg.node_name.as_deref())
            .await?;

        Ok(pods
            .into_iter()
            .filter_map(|pod| pod.pod_ip)
            .map(|ip| format!("http://{}:{}{}", ip, self.cfg.scrape_port, self.cfg.scrape_path))
            .collect())
    }
}
