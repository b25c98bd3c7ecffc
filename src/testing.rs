use anyhow::Result;
use blob_gateway::BlobStorageConfig;
use tracing::subscriber;
use tracing_subscriber::{layer::SubscriberExt, Layer};

use crate::{
    config::{QueueConfig, ServerConfig},
    service::Service,
};

pub struct TestService {
    pub service: Service,
}

impl TestService {
    /// Memory-backed blob storage and an in-memory submission queue.
    pub async fn new() -> Result<Self> {
        let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("trace"));
        let _ = subscriber::set_global_default(
            tracing_subscriber::registry()
                .with(tracing_subscriber::fmt::layer().with_filter(env_filter)),
        );

        let cfg = ServerConfig {
            blob_storage: BlobStorageConfig::memory(),
            submission_queue: QueueConfig::default(),
            ..Default::default()
        };
        let srv = Service::new(cfg).await?;

        Ok(Self { service: srv })
    }
}
