use std::sync::Arc;

use omniqueue::QueueError;
use opentelemetry::KeyValue;
use tokio::sync::Mutex;
use tracing::{error, info};

use crate::{
    config::{QueueBackend, QueueConfig},
    metrics::{self, Increment},
};

pub struct Queue {
    producer: Arc<omniqueue::DynProducer>,
    // Kept for the in-memory backend: the queue lives as long as its consumer.
    #[cfg_attr(not(test), allow(dead_code))]
    consumer: Option<Mutex<omniqueue::DynConsumer>>,
    metrics: metrics::queue::Metrics,
}

impl Queue {
    pub async fn new(config: QueueConfig) -> anyhow::Result<Self> {
        let (producer, consumer) = match &config.backend {
            QueueBackend::AmazonSqs { queue_url } => {
                info!("using sqs queue config with url: {queue_url}");

                let sqs_config = omniqueue::backends::SqsConfig {
                    queue_dsn: queue_url.clone(),
                    override_endpoint: false,
                };

                let producer = omniqueue::backends::SqsBackend::builder(sqs_config)
                    .make_dynamic()
                    .build_producer()
                    .await?;
                (producer, None)
            }
            QueueBackend::InMemory => {
                info!("using in-memory submission queue");

                let (producer, consumer) = omniqueue::backends::InMemoryBackend::builder()
                    .make_dynamic()
                    .build_pair()
                    .await?;
                (producer, Some(Mutex::new(consumer)))
            }
        };

        Ok(Self {
            producer: Arc::new(producer),
            consumer,
            metrics: metrics::queue::Metrics::default(),
        })
    }

    pub async fn send_json<P: serde::Serialize + Sync>(
        &self,
        payload: &P,
    ) -> omniqueue::Result<()> {
        let send_result = self.producer.send_serde_json(payload).await;

        match send_result {
            Ok(_) => {
                Increment::inc(&self.metrics.messages_sent, &[]);
                Ok(())
            }
            Err(queue_error) => {
                let attrs = &[KeyValue::new(
                    "queue.error_type",
                    queue_error_type(&queue_error),
                )];

                Increment::inc(&self.metrics.send_errors, attrs);

                Err(queue_error)
            }
        }
    }

    /// Receive and ack the next message of the in-memory backend.
    #[cfg(test)]
    pub async fn receive_json<T: serde::de::DeserializeOwned>(&self) -> anyhow::Result<T> {
        let consumer = self
            .consumer
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("queue backend has no local consumer"))?;
        let delivery = consumer.lock().await.receive().await?;
        let payload = delivery
            .payload_serde_json::<T>()?
            .ok_or_else(|| anyhow::anyhow!("empty delivery"))?;
        delivery.ack().await.map_err(|(e, _)| e)?;
        Ok(payload)
    }
}

fn queue_error_type(queue_error: &QueueError) -> String {
    match queue_error {
        QueueError::Generic(inner_error) => {
            error!("queue error: {}", inner_error);

            "generic".to_string()
        }
        QueueError::Serde(inner_error) => {
            error!("queue serialization error: {}", inner_error);

            "serde".to_string()
        }
        QueueError::NoData => "no_data".to_string(),
        QueueError::Unsupported(reason) => {
            error!("queue unsupported operation: {}", reason);

            "unsupported".to_string()
        }
        QueueError::PayloadTooLarge { actual, limit } => {
            error!("queue payload too large: {} > {}", actual, limit);

            "payload_too_large".to_string()
        }
        _ => "other".to_string(),
    }
}
