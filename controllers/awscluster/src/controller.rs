//! Main controller implementation.
//!
//! This module contains the `Controller` struct that wires the Kubernetes
//! client, the infrastructure gateway services and the metrics server to the
//! reconciler, and supervises the resulting tasks.

use crate::config::Config;
use crate::error::ControllerError;
use crate::metrics::{self, Metrics};
use crate::reconciler::{Reconciler, ReconcilerSettings};
use crate::store::KubeStore;
use crate::watcher::watch_aws_clusters;
use cloud_services::{GatewayServiceFactory, SystemDnsResolver};
use kube::Client;
use prometheus::Registry;
use std::sync::Arc;
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Main controller for AWSCluster infrastructure.
pub struct Controller {
    shutdown: CancellationToken,
    watcher: JoinHandle<Result<(), ControllerError>>,
    metrics_server: JoinHandle<Result<(), ControllerError>>,
}

impl Controller {
    /// Creates a new controller instance and starts its tasks.
    pub async fn new(config: Config) -> Result<Self, ControllerError> {
        info!("Initializing AWSCluster controller");

        // Create Kubernetes client
        let kube_client = Client::try_default().await?;

        let services =
            GatewayServiceFactory::new(config.gateway_url.clone(), config.gateway_token.clone())
                .map_err(ControllerError::Gateway)?;

        info!("Checking infrastructure gateway at {}", services.base_url());
        match services.validate().await {
            Ok(()) => info!("Infrastructure gateway reachable"),
            Err(e) => warn!(
                "Infrastructure gateway at {} is not reachable yet: {}",
                services.base_url(),
                e
            ),
        }

        let registry = Registry::new();
        let metrics = Metrics::new()?.register(&registry)?;
        let shutdown = CancellationToken::new();

        let reconciler = Arc::new(Reconciler::new(
            Arc::new(KubeStore::new(kube_client.clone())),
            Arc::new(services),
            Arc::new(SystemDnsResolver),
            ReconcilerSettings {
                dns_requeue: config.dns_requeue,
            },
            metrics,
            shutdown.clone(),
        ));

        let metrics_server = tokio::spawn(metrics::serve(
            config.metrics_addr,
            registry,
            shutdown.clone(),
        ));
        let watcher = tokio::spawn(watch_aws_clusters(
            kube_client,
            config.namespace.clone(),
            reconciler,
            config.max_concurrent_reconciles,
        ));

        Ok(Self {
            shutdown,
            watcher,
            metrics_server,
        })
    }

    /// Runs until the watcher stops, a task fails, or a shutdown signal arrives.
    pub async fn run(self) -> Result<(), ControllerError> {
        let Self {
            shutdown,
            mut watcher,
            mut metrics_server,
        } = self;

        info!("AWSCluster controller running");

        let result = tokio::select! {
            joined = &mut watcher => task_result("watcher", joined),
            joined = &mut metrics_server => task_result("metrics server", joined),
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received, cancelling in-flight reconciliations");
                shutdown.cancel();
                task_result("watcher", watcher.await)
            }
        };

        shutdown.cancel();
        if let Err(e) = &result {
            error!("AWSCluster controller stopped with error: {}", e);
        }
        result
    }
}

fn task_result(
    task: &str,
    joined: Result<Result<(), ControllerError>, JoinError>,
) -> Result<(), ControllerError> {
    match joined {
        Ok(result) => {
            info!("{} stopped", task);
            result
        }
        Err(e) => Err(ControllerError::Watch(format!("{task} task failed: {e}"))),
    }
}
