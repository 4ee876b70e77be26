pub mod config;
pub mod error;
pub mod k8s;
pub mod metrics;
pub mod pb;
pub mod server;
pub mod upload;
pub mod workload;

pub use error::{GpufeedError, Result};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
