use std::time::Duration;

use anyhow::Result;
use opentelemetry::{metrics::Counter, KeyValue};
use opentelemetry_otlp::{MetricExporter, WithExportConfig};
use opentelemetry_sdk::{
    metrics::{PeriodicReader, SdkMeterProvider},
    Resource,
};

pub fn init_provider(
    enable_metrics: bool,
    endpoint: Option<&String>,
    interval: Duration,
    instance_id: &str,
    service_version: &str,
) -> Result<Option<SdkMeterProvider>> {
    // Early exit if metrics are disabled
    if !enable_metrics {
        return Ok(None);
    }

    let resource = Resource::builder()
        .with_attribute(KeyValue::new("service.namespace", "blobgate"))
        .with_attribute(KeyValue::new("service.name", "blobgate-server"))
        .with_attribute(KeyValue::new(
            "service.version",
            service_version.to_string(),
        ))
        .with_attribute(KeyValue::new(
            "blobgate.instance.id",
            instance_id.to_string(),
        ))
        .build();

    let mut exporter = MetricExporter::builder().with_tonic();
    if let Some(endpoint) = endpoint {
        exporter = exporter.with_endpoint(endpoint.to_owned());
    }
    let exporter = exporter.build()?;

    let reader = PeriodicReader::builder(exporter)
        .with_interval(interval)
        .build();

    let provider = SdkMeterProvider::builder()
        .with_resource(resource)
        .with_reader(reader)
        .build();

    opentelemetry::global::set_meter_provider(provider.clone());
    Ok(Some(provider))
}

pub mod api_io_stats {
    use opentelemetry::metrics::Counter;

    #[derive(Debug)]
    pub struct Metrics {
        pub uploads: Counter<u64>,
        pub upload_bytes: Counter<u64>,
        pub sales_requests: Counter<u64>,
    }

    impl Default for Metrics {
        fn default() -> Self {
            Self::new()
        }
    }

    impl Metrics {
        pub fn new() -> Metrics {
            let meter = opentelemetry::global::meter("service-api");
            let uploads = meter
                .u64_counter("blobgate.uploads")
                .with_description("number of blob uploads")
                .build();
            let upload_bytes = meter
                .u64_counter("blobgate.upload_bytes")
                .with_description("number of bytes ingested by blob uploads")
                .build();
            let sales_requests = meter
                .u64_counter("blobgate.sales_requests")
                .with_description("number of sales requests relayed to the queue")
                .build();
            Metrics {
                uploads,
                upload_bytes,
                sales_requests,
            }
        }
    }
}

pub mod queue {
    use opentelemetry::metrics::Counter;

    #[derive(Debug)]
    pub struct Metrics {
        pub messages_sent: Counter<u64>,
        pub send_errors: Counter<u64>,
    }

    impl Default for Metrics {
        fn default() -> Self {
            let meter = opentelemetry::global::meter("queue");
            let messages_sent = meter
                .u64_counter("blobgate.queue.messages_sent")
                .with_description("messages accepted by the submission queue")
                .build();
            let send_errors = meter
                .u64_counter("blobgate.queue.send_errors")
                .with_description("failed submission queue sends")
                .build();
            Metrics {
                messages_sent,
                send_errors,
            }
        }
    }
}

pub trait AutoIncrement {
    fn increment(&self, labels: &[KeyValue]);
}

impl AutoIncrement for Counter<u64> {
    fn increment(&self, labels: &[KeyValue]) {
        self.add(1, labels);
    }
}

/// Increments the counter when dropped.
pub struct Increment<'a, T: AutoIncrement + Sync> {
    metric: &'a T,
    labels: &'a [KeyValue],
}

impl<'a, T: AutoIncrement + Sync> Increment<'a, T> {
    pub fn inc(metric: &'a T, labels: &'a [KeyValue]) -> Self {
        Self { metric, labels }
    }
}

impl<'a, T: AutoIncrement + Sync> Drop for Increment<'a, T> {
    fn drop(&mut self) {
        self.metric.increment(self.labels);
    }
}
