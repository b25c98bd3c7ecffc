//! Sales submissions: assign an identifier and hand the request to the queue.

use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::{
    metrics::{api_io_stats, Increment},
    queue::Queue,
};

/// A sales submission. Fields other than `id` and `name` are carried through
/// to the queue untouched.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SalesRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Persists a sales request for downstream consumption.
#[async_trait]
pub trait QueueIngestor: Send + Sync {
    async fn enqueue(&self, request: &SalesRequest) -> Result<()>;
}

#[async_trait]
impl QueueIngestor for Queue {
    async fn enqueue(&self, request: &SalesRequest) -> Result<()> {
        self.send_json(request)
            .await
            .map_err(|e| anyhow!("failed to enqueue sales request: {}", e))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayReceipt {
    pub id: String,
    pub message: String,
}

pub struct SubmissionRelay {
    ingestor: Arc<dyn QueueIngestor>,
    metrics: Arc<api_io_stats::Metrics>,
}

impl SubmissionRelay {
    pub fn new(ingestor: Arc<dyn QueueIngestor>, metrics: Arc<api_io_stats::Metrics>) -> Self {
        Self { ingestor, metrics }
    }

    /// Assign a fresh identifier, replacing any the caller sent, and enqueue.
    #[tracing::instrument(skip_all, fields(name = %request.name))]
    pub async fn submit(&self, mut request: SalesRequest) -> Result<RelayReceipt> {
        if request.name.trim().is_empty() {
            return Err(InvalidSalesRequest("name must not be empty").into());
        }
        let id = Uuid::new_v4().to_string();
        request.id = Some(id.clone());

        self.ingestor
            .enqueue(&request)
            .await
            .with_context(|| format!("sales request {}", id))?;
        Increment::inc(&self.metrics.sales_requests, &[]);
        info!(sales_request_id = %id, "sales request enqueued");

        Ok(RelayReceipt {
            message: format!("Sales Request has been received for - {}", request.name),
            id,
        })
    }
}

/// A submission rejected before reaching the queue.
#[derive(Debug, thiserror::Error)]
#[error("invalid sales request: {0}")]
pub struct InvalidSalesRequest(pub &'static str);

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::config::QueueConfig;

    struct FailingIngestor;

    #[async_trait]
    impl QueueIngestor for FailingIngestor {
        async fn enqueue(&self, _request: &SalesRequest) -> Result<()> {
            Err(anyhow!("queue unavailable"))
        }
    }

    fn request(value: serde_json::Value) -> SalesRequest {
        serde_json::from_value(value).unwrap()
    }

    #[tokio::test]
    async fn test_submit_assigns_id_and_enqueues() {
        let queue = Arc::new(Queue::new(QueueConfig::default()).await.unwrap());
        let relay = SubmissionRelay::new(queue.clone(), Arc::new(api_io_stats::Metrics::new()));

        let receipt = relay
            .submit(request(json!({
                "id": "client-chosen",
                "name": "Ben",
                "email": "ben@example.com",
                "phone": "555-0100"
            })))
            .await
            .unwrap();

        assert_eq!(receipt.message, "Sales Request has been received for - Ben");
        assert_ne!(receipt.id, "client-chosen");
        assert!(Uuid::parse_str(&receipt.id).is_ok());

        let queued: serde_json::Value = queue.receive_json().await.unwrap();
        assert_eq!(
            queued,
            json!({
                "id": receipt.id,
                "name": "Ben",
                "email": "ben@example.com",
                "phone": "555-0100"
            })
        );
    }

    #[tokio::test]
    async fn test_submit_rejects_empty_name() {
        let queue = Arc::new(Queue::new(QueueConfig::default()).await.unwrap());
        let relay = SubmissionRelay::new(queue, Arc::new(api_io_stats::Metrics::new()));

        let err = relay.submit(request(json!({"name": "  "}))).await.unwrap_err();
        assert!(err.downcast_ref::<InvalidSalesRequest>().is_some());
    }

    #[tokio::test]
    async fn test_enqueue_failure_propagates() {
        let relay = SubmissionRelay::new(
            Arc::new(FailingIngestor),
            Arc::new(api_io_stats::Metrics::new()),
        );
        let err = relay
            .submit(request(json!({"name": "Ben"})))
            .await
            .unwrap_err();
        assert!(err.downcast_ref::<InvalidSalesRequest>().is_none());
        assert!(format!("{:#}", err).contains("queue unavailable"));
    }
}
