//! Wire-format messages for the collector's gpu-metrics ingest endpoint.
//!
//! The collector speaks protobuf; the messages are small enough that they are
//! written out by hand instead of being generated from a schema file.

/// A full batch of metrics collected in one export cycle.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct MetricsBatch {
    #[prost(message, repeated, tag = "1")]
    pub metrics: Vec<Metric>,
}

/// All measurements observed for one metric name across every scrape target.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Metric {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(message, repeated, tag = "2")]
    pub measurements: Vec<Measurement>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Measurement {
    #[prost(double, tag = "1")]
    pub value: f64,
    #[prost(message, repeated, tag = "2")]
    pub labels: Vec<MetricLabel>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct MetricLabel {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(string, tag = "2")]
    pub value: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use prost::Message;

    #[test]
    fn batch_round_trips_through_encoding() {
        let batch = MetricsBatch {
            metrics: vec![Metric {
                name: "DCGM_FI_PROF_SM_ACTIVE".to_string(),
                measurements: vec![Measurement {
                    value: 0.25,
                    labels: vec![MetricLabel {
                        name: "gpu".to_string(),
                        value: "0".to_string(),
                    }],
                }],
            }],
        };

        let bytes = batch.encode_to_vec();
        let decoded = MetricsBatch::decode(bytes.as_slice()).expect("decode");
        assert_eq!(batch, decoded);
    }
}
