//! AWSCluster Controller
//!
//! Reconciles `AWSCluster` resources: drives the network, security groups,
//! bastion host and API server load balancer of a Cluster API cluster
//! toward the declared state, and tears them down behind a finalizer when
//! the resource is deleted.

mod backoff;
mod config;
mod controller;
mod error;
mod metrics;
mod reconciler;
mod scope;
mod store;
#[cfg(test)]
mod test_utils;
mod watcher;

use crate::config::Config;
use crate::error::ControllerError;
use controller::Controller;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), ControllerError> {
    // Install the ring provider before any TLS client is built
    let _ = rustls::crypto::ring::default_provider().install_default();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Starting AWSCluster Controller");

    // Load configuration from environment variables
    let config = Config::from_env()?;

    info!("Configuration:");
    info!("  Gateway URL: {}", config.gateway_url);
    info!(
        "  Namespace: {}",
        config.namespace.as_deref().unwrap_or("all namespaces")
    );
    info!("  Metrics address: {}", config.metrics_addr);
    info!("  DNS requeue: {:?}", config.dns_requeue);
    info!("  Max concurrent reconciles: {}", config.max_concurrent_reconciles);

    // Initialize and run controller
    let controller = Controller::new(config).await?;
    controller.run().await?;

    Ok(())
}
