use thiserror::Error;

#[derive(Error, Debug)]
pub enum GpufeedError {
    #[error("Kubernetes error: {0}")]
    Kubernetes(String),

    #[error("Pod not found: {name} in namespace {namespace}")]
    PodNotFound { name: String, namespace: String },

    #[error("Scrape error: {0}")]
    Scrape(String),

    #[error("Upload rejected with status {status}: {body}")]
    UploadRejected { status: u16, body: String },

    #[error("Upload retries exhausted: {0}")]
    UploadExhausted(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Sink error: {0}")]
    Sink(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, GpufeedError>;
