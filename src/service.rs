use std::{net::SocketAddr, sync::Arc};

use anyhow::{Context, Result};
use axum_server::Handle;
use blob_gateway::BlobGateway;
use opentelemetry_sdk::metrics::SdkMeterProvider;
use tokio::signal;
use tracing::{error, info};

use crate::{
    config::ServerConfig,
    metrics::{api_io_stats, init_provider},
    queue::Queue,
    relay::SubmissionRelay,
    routes::{create_routes, RouteState},
};

#[derive(Clone)]
pub struct Service {
    pub config: ServerConfig,
    pub gateway: Arc<BlobGateway>,
    pub queue: Arc<Queue>,
    pub relay: Arc<SubmissionRelay>,
    pub api_metrics: Arc<api_io_stats::Metrics>,
    pub meter_provider: Option<SdkMeterProvider>,
}

impl Service {
    pub async fn new(config: ServerConfig) -> Result<Self> {
        // instruments are bound to the global meter provider at creation
        let meter_provider = init_provider(
            config.telemetry.enable_metrics,
            config.telemetry.endpoint.as_ref(),
            config.telemetry.metrics_interval,
            &config.instance_id(),
            env!("CARGO_PKG_VERSION"),
        )
        .context("error initializing metrics provider")?;

        let gateway = Arc::new(
            BlobGateway::from_config(&config.blob_storage)
                .context("error initializing blob gateway")?,
        );
        let queue = Arc::new(
            Queue::new(config.submission_queue.clone())
                .await
                .context("error initializing submission queue")?,
        );
        let api_metrics = Arc::new(api_io_stats::Metrics::new());
        let relay = Arc::new(SubmissionRelay::new(queue.clone(), api_metrics.clone()));

        Ok(Self {
            config,
            gateway,
            queue,
            relay,
            api_metrics,
            meter_provider,
        })
    }

    pub fn route_state(&self) -> RouteState {
        RouteState {
            gateway: self.gateway.clone(),
            relay: self.relay.clone(),
            metrics: self.api_metrics.clone(),
        }
    }

    pub async fn start(&self) -> Result<()> {
        let handle = Handle::new();
        let handle_sh = handle.clone();
        tokio::spawn(async move {
            shutdown_signal(handle_sh).await;
            info!("graceful shutdown signal received, shutting down server gracefully");
        });

        let addr: SocketAddr = self.config.listen_addr.parse()?;
        info!("server api listening on {}", self.config.listen_addr);
        let routes = create_routes(self.route_state(), self.config.max_upload_bytes);
        axum_server::bind(addr)
            .handle(handle)
            .serve(routes.into_make_service())
            .await?;

        if let Some(meter_provider) = &self.meter_provider {
            if let Err(err) = meter_provider.shutdown() {
                error!("error shutting down meter provider: {:?}", err);
            }
        }
        Ok(())
    }
}

async fn shutdown_signal(handle: Handle) {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            error!("failed to install Ctrl+C handler: {:?}", err);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                error!("failed to install signal handler: {:?}", err);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
        },
        _ = terminate => {
        },
    }
    handle.shutdown();
    info!("signal received, shutting down server gracefully");
}
