//! Concurrent scraping of exposition-format telemetry endpoints.

use std::collections::HashMap;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::{GpufeedError, Result};

const MAX_CONCURRENT_SCRAPES: usize = 15;
const SCRAPE_TIMEOUT: Duration = Duration::from_secs(10);

/// Everything scraped from one endpoint in one cycle.
#[derive(Debug, Clone)]
pub struct ScrapeResult {
    pub endpoint: String,
    pub families: HashMap<String, MetricFamily>,
}

/// A named group of samples sharing one metric name.
#[derive(Debug, Clone)]
pub struct MetricFamily {
    pub name: String,
    pub samples: Vec<Sample>,
}

#[derive(Debug, Clone)]
pub struct Sample {
    pub labels: HashMap<String, String>,
    pub value: SampleValue,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SampleValue {
    Counter(f64),
    Gauge(f64),
    /// Histogram, summary or untyped samples. The mapper reads these as zero.
    Other,
}

impl SampleValue {
    pub fn numeric(self) -> f64 {
        match self {
            SampleValue::Counter(v) | SampleValue::Gauge(v) => v,
            SampleValue::Other => 0.0,
        }
    }
}

pub struct HttpScraper {
    http: reqwest::Client,
}

impl HttpScraper {
    pub fn new() -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(SCRAPE_TIMEOUT)
            .build()
            .map_err(|e| GpufeedError::Scrape(format!("failed to build http client: {}", e)))?;

        Ok(Self { http })
    }

    /// Fetches all URLs with at most [`MAX_CONCURRENT_SCRAPES`] requests in
    /// flight. A single endpoint failing (bad status, transport error, parse
    /// error) is logged and its result dropped; the call itself still
    /// succeeds with whatever survived. Result order does not follow input
    /// order.
    pub async fn scrape(
        &self,
        token: &CancellationToken,
        urls: &[String],
    ) -> Result<Vec<ScrapeResult>> {
        if urls.is_empty() {
            return Ok(Vec::new());
        }

        let results = stream::iter(urls.iter().cloned())
            .map(|url| {
                let token = token.clone();
                async move {
                    // Fetches not yet started are skipped outright on
                    // cancellation, not attempted and discarded.
                    if token.is_cancelled() {
                        return None;
                    }

                    match self.scrape_url(&url).await {
                        Ok(families) => Some(ScrapeResult {
                            endpoint: url,
                            families,
                        }),
                        Err(err) => {
                            warn!(endpoint = %url, error = %err, "failed to scrape telemetry endpoint");
                            None
                        }
                    }
                }
            })
            .buffer_unordered(MAX_CONCURRENT_SCRAPES)
            .filter_map(|result| async move { result })
            .collect::<Vec<_>>()
            .await;

        Ok(results)
    }

    async fn scrape_url(&self, url: &str) -> Result<HashMap<String, MetricFamily>> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| GpufeedError::Scrape(format!("error while making http request: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(GpufeedError::Scrape(format!(
                "request failed with status code: {}",
                status.as_u16()
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| GpufeedError::Scrape(format!("error reading response body: {}", e)))?;

        parse_families(&body)
    }
}

/// Parses an exposition-format payload into families keyed by metric name.
pub fn parse_families(body: &str) -> Result<HashMap<String, MetricFamily>> {
    let lines = body.lines().map(|line| Ok(line.to_string()));
    let scrape = prometheus_parse::Scrape::parse(lines)
        .map_err(|e| GpufeedError::Scrape(format!("cannot parse metrics: {}", e)))?;

    let mut families: HashMap<String, MetricFamily> = HashMap::new();
    for sample in scrape.samples {
        let value = match sample.value {
            prometheus_parse::Value::Counter(v) => SampleValue::Counter(v),
            prometheus_parse::Value::Gauge(v) => SampleValue::Gauge(v),
            _ => SampleValue::Other,
        };

        let labels = sample
            .labels
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        families
            .entry(sample.metric.clone())
            .or_insert_with(|| MetricFamily {
                name: sample.metric.clone(),
                samples: Vec::new(),
            })
            .samples
            .push(Sample { labels, value });
    }

    Ok(families)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    const GPU_TEMP_METRICS: &str = "# HELP DCGM_FI_DEV_GPU_TEMP Current temperature readings for the device in degrees C.\n# TYPE DCGM_FI_DEV_GPU_TEMP gauge\nDCGM_FI_DEV_GPU_TEMP{gpu=\"0\",UUID=\"GPU-93461651\",device=\"nvidia0\",modelName=\"Tesla T4\",Hostname=\"gke-gpu-node\",container=\"\",namespace=\"\",pod=\"\"} 40\n";

    /// Serves a fixed HTTP response on a loopback port for every connection.
    async fn serve_static(status_line: &'static str, body: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");

        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                let mut buf = [0u8; 4096];
                let _ = socket.read(&mut buf).await;
                let response = format!(
                    "HTTP/1.1 {}\r\nContent-Type: text/plain\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status_line,
                    body.len(),
                    body
                );
                let _ = socket.write_all(response.as_bytes()).await;
            }
        });

        format!("http://{}/metrics", addr)
    }

    /// A loopback URL nothing is listening on.
    async fn unreachable_url() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        drop(listener);
        format!("http://{}/metrics", addr)
    }

    #[tokio::test]
    async fn test_scrapes_all_endpoints() {
        let scraper = HttpScraper::new().expect("scraper");
        let token = CancellationToken::new();

        let urls = vec![
            serve_static("200 OK", GPU_TEMP_METRICS).await,
            serve_static("200 OK", GPU_TEMP_METRICS).await,
            serve_static("200 OK", GPU_TEMP_METRICS).await,
        ];

        let results = scraper.scrape(&token, &urls).await.expect("scrape");

        assert_eq!(results.len(), 3);
        for result in &results {
            let family = result
                .families
                .get("DCGM_FI_DEV_GPU_TEMP")
                .expect("family present");
            assert_eq!(family.samples.len(), 1);
            assert_eq!(family.samples[0].value, SampleValue::Gauge(40.0));
        }
    }

    #[tokio::test]
    async fn test_partial_failure_drops_only_the_bad_endpoint() {
        let scraper = HttpScraper::new().expect("scraper");
        let token = CancellationToken::new();

        let good = serve_static("200 OK", GPU_TEMP_METRICS).await;
        let refused = unreachable_url().await;
        let server_error = serve_static("500 Internal Server Error", "").await;

        let results = scraper
            .scrape(&token, &[good.clone(), refused, server_error])
            .await
            .expect("scrape");

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].endpoint, good);
    }

    #[tokio::test]
    async fn test_zero_urls_is_a_noop() {
        let scraper = HttpScraper::new().expect("scraper");
        let token = CancellationToken::new();

        let results = scraper.scrape(&token, &[]).await.expect("scrape");
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_token_skips_fetches() {
        let scraper = HttpScraper::new().expect("scraper");
        let token = CancellationToken::new();
        token.cancel();

        let url = serve_static("200 OK", GPU_TEMP_METRICS).await;
        let results = scraper.scrape(&token, &[url]).await.expect("scrape");

        assert!(results.is_empty());
    }

    #[test]
    fn test_parse_families_by_type() {
        let body = "# TYPE requests_total counter\nrequests_total{path=\"/\"} 7\n# TYPE temp gauge\ntemp 21.5\n";

        let families = parse_families(body).expect("parse");

        let counter = &families.get("requests_total").expect("counter").samples[0];
        assert_eq!(counter.value, SampleValue::Counter(7.0));
        assert_eq!(counter.labels.get("path").map(String::as_str), Some("/"));

        let gauge = &families.get("temp").expect("gauge").samples[0];
        assert_eq!(gauge.value, SampleValue::Gauge(21.5));
    }

    #[test]
    fn test_other_sample_types_read_as_zero() {
        assert_eq!(SampleValue::Other.numeric(), 0.0);
        assert_eq!(SampleValue::Counter(3.0).numeric(), 3.0);
        assert_eq!(SampleValue::Gauge(2.5).numeric(), 2.5);
    }
}
