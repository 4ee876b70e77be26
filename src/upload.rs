//! Ships wire batches to the remote collector: protobuf, gzip, and a
//! classified retry loop.

use std::io::Write;
use std::time::Duration;

use async_trait::async_trait;
use flate2::write::GzEncoder;
use flate2::Compression;
use prost::Message;
use rand::Rng;
use reqwest::header::{CONTENT_ENCODING, CONTENT_TYPE, USER_AGENT};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::{pb, GpufeedError, Result};

const API_KEY_HEADER: &str = "X-API-Key";
const RETRY_ATTEMPTS: u32 = 5;
const RETRY_BASE_DELAY: Duration = Duration::from_millis(50);
const RETRY_FACTOR: f64 = 8.0;
const RETRY_JITTER: f64 = 0.15;
const UPLOAD_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Clone)]
pub struct UploadConfig {
    pub api_url: String,
    pub api_key: String,
    pub cluster_id: String,
}

/// Where finished wire batches go. [`UploadClient`] is the production
/// implementation; tests substitute their own.
#[async_trait]
pub trait BatchSink: Send + Sync {
    async fn upload_batch(
        &self,
        token: &CancellationToken,
        batch: &pb::MetricsBatch,
    ) -> Result<()>;
}

pub struct UploadClient {
    http: reqwest::Client,
    cfg: UploadConfig,
    retry_base_delay: Duration,
}

impl UploadClient {
    pub fn new(cfg: UploadConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(UPLOAD_TIMEOUT)
            .build()
            .map_err(|e| GpufeedError::Config(format!("failed to build upload client: {}", e)))?;

        Ok(Self {
            http,
            cfg,
            retry_base_delay: RETRY_BASE_DELAY,
        })
    }

    #[cfg(test)]
    fn with_retry_base_delay(mut self, delay: Duration) -> Self {
        self.retry_base_delay = delay;
        self
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1/kubernetes/clusters/{}/gpu-metrics",
            self.cfg.api_url.trim_end_matches('/'),
            self.cfg.cluster_id
        )
    }
}

/// Protobuf-encodes and gzips a batch into the upload body.
pub fn encode_batch(batch: &pb::MetricsBatch) -> Result<Vec<u8>> {
    let proto = batch.encode_to_vec();

    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&proto)?;
    Ok(encoder.finish()?)
}

#[async_trait]
impl BatchSink for UploadClient {
    /// Pushes one batch. 2xx succeeds; 4xx is terminal (retrying cannot fix
    /// a rejected payload); anything else retries on an exponential backoff
    /// until the attempt budget runs out. Cancellation aborts the sequence,
    /// including mid-backoff.
    async fn upload_batch(
        &self,
        token: &CancellationToken,
        batch: &pb::MetricsBatch,
    ) -> Result<()> {
        let body = encode_batch(batch)?;
        let endpoint = self.endpoint();

        let mut delay = self.retry_base_delay;
        let mut last_failure = String::from("no attempts made");

        for attempt in 1..=RETRY_ATTEMPTS {
            if attempt > 1 {
                tokio::select! {
                    _ = token.cancelled() => return Err(GpufeedError::Cancelled),
                    _ = tokio::time::sleep(jittered(delay)) => {}
                }
                delay = delay.mul_f64(RETRY_FACTOR);
            }

            if token.is_cancelled() {
                return Err(GpufeedError::Cancelled);
            }

            let response = self
                .http
                .post(&endpoint)
                .header(API_KEY_HEADER, &self.cfg.api_key)
                .header(CONTENT_TYPE, "application/protobuf")
                .header(CONTENT_ENCODING, "gzip")
                .header(USER_AGENT, format!("gpufeed/{}", crate::VERSION))
                .body(body.clone())
                .send()
                .await;

            match response {
                Ok(resp) => {
                    let status = resp.status();
                    if status.is_success() {
                        return Ok(());
                    }

                    if status.is_client_error() {
                        let body = resp.text().await.unwrap_or_default();
                        return Err(GpufeedError::UploadRejected {
                            status: status.as_u16(),
                            body,
                        });
                    }

                    warn!(status = status.as_u16(), attempt, "collector returned a retryable status");
                    last_failure = format!("status code {}", status.as_u16());
                }
                Err(err) => {
                    warn!(error = %err, attempt, "error making upload request");
                    last_failure = err.to_string();
                }
            }
        }

        Err(GpufeedError::UploadExhausted(last_failure))
    }
}

fn jittered(base: Duration) -> Duration {
    let factor = 1.0 + rand::thread_rng().gen_range(-RETRY_JITTER..=RETRY_JITTER);
    base.mul_f64(factor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn sample_batch() -> pb::MetricsBatch {
        pb::MetricsBatch {
            metrics: vec![pb::Metric {
                name: "DCGM_FI_PROF_SM_ACTIVE".to_string(),
                measurements: vec![pb::Measurement {
                    value: 0.5,
                    labels: vec![],
                }],
            }],
        }
    }

    /// Serves HTTP responses with the given status codes in order, repeating
    /// the last one, and counts requests.
    async fn serve_statuses(statuses: &'static [u16]) -> (String, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        let hits = Arc::new(AtomicUsize::new(0));
        let hits_srv = hits.clone();

        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                let n = hits_srv.fetch_add(1, Ordering::SeqCst);
                let status = statuses[n.min(statuses.len() - 1)];

                // Drain the request before answering so the client finishes
                // writing its body.
                let mut buf = vec![0u8; 65536];
                let _ = socket.read(&mut buf).await;

                let response = format!(
                    "HTTP/1.1 {} X\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
                    status
                );
                let _ = socket.write_all(response.as_bytes()).await;
            }
        });

        (format!("http://{}", addr), hits)
    }

    fn client_for(url: String) -> UploadClient {
        UploadClient::new(UploadConfig {
            api_url: url,
            api_key: "test-key".to_string(),
            cluster_id: "cluster-1".to_string(),
        })
        .expect("client")
    }

    #[test]
    fn test_encode_batch_is_gzipped_protobuf() {
        let batch = sample_batch();
        let body = encode_batch(&batch).expect("encode");

        // gzip magic bytes
        assert_eq!(&body[..2], &[0x1f, 0x8b]);

        let mut decoder = flate2::read::GzDecoder::new(body.as_slice());
        let mut proto = Vec::new();
        decoder.read_to_end(&mut proto).expect("gunzip");

        let decoded = pb::MetricsBatch::decode(proto.as_slice()).expect("decode");
        assert_eq!(decoded, batch);
    }

    #[tokio::test]
    async fn test_upload_succeeds_on_2xx() {
        let (url, hits) = serve_statuses(&[200]).await;
        let client = client_for(url);
        let token = CancellationToken::new();

        client
            .upload_batch(&token, &sample_batch())
            .await
            .expect("upload");
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_4xx_is_terminal_without_retries() {
        let (url, hits) = serve_statuses(&[400]).await;
        let client = client_for(url);
        let token = CancellationToken::new();

        let err = client
            .upload_batch(&token, &sample_batch())
            .await
            .expect_err("should fail");

        assert!(matches!(
            err,
            GpufeedError::UploadRejected { status: 400, .. }
        ));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_5xx_retries_until_success() {
        let (url, hits) = serve_statuses(&[500, 503, 200]).await;
        let client = client_for(url);
        let token = CancellationToken::new();

        client
            .upload_batch(&token, &sample_batch())
            .await
            .expect("upload after retries");
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhausted_retries_surface_the_last_status() {
        let (url, hits) = serve_statuses(&[500, 502, 503]).await;
        let client = client_for(url).with_retry_base_delay(Duration::from_millis(1));
        let token = CancellationToken::new();

        let err = client
            .upload_batch(&token, &sample_batch())
            .await
            .expect_err("should exhaust the attempt budget");

        assert_eq!(hits.load(Ordering::SeqCst), RETRY_ATTEMPTS as usize);
        match err {
            GpufeedError::UploadExhausted(detail) => {
                assert!(detail.contains("503"), "detail was: {}", detail)
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[tokio::test]
    async fn test_cancelled_token_aborts_before_any_request() {
        let (url, hits) = serve_statuses(&[200]).await;
        let client = client_for(url);
        let token = CancellationToken::new();
        token.cancel();

        let err = client
            .upload_batch(&token, &sample_batch())
            .await
            .expect_err("should abort");

        assert!(matches!(err, GpufeedError::Cancelled));
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }
}
