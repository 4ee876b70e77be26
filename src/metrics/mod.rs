pub mod exporter;
pub mod gpu;
pub mod mapper;
pub mod scraper;
pub mod types;

pub use exporter::{Exporter, ExporterConfig};
pub use gpu::{GpuMetricRecord, MetricSink};
pub use mapper::MetricMapper;
pub use scraper::{HttpScraper, MetricFamily, Sample, SampleValue, ScrapeResult};
