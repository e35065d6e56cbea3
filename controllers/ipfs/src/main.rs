//! IPFS Controller
//!
//! Runs an IPFS cluster per custom resource.
//!
//! This controller reconciles `Ipfs` (`storage.ipfs.io/v1alpha1`) and legacy
//! `Deployment` (`app.ipfs.io/v1beta1`) resources into a bootstrap and a peer
//! `apps/v1` Deployment each, scales the peers to `spec.size`, and publishes
//! the names of the running peer pods in `status.nodes`.

mod backoff;
mod builder;
mod config;
mod controller;
mod dispatcher;
mod error;
mod event;
mod metrics;
mod reconciler;
mod status;
mod watcher;

mod test_utils;

use crate::config::ControllerConfig;
use crate::error::ControllerError;
use controller::Controller;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), ControllerError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    if rustls::crypto::ring::default_provider().install_default().is_err() {
        debug!("rustls crypto provider already installed");
    }

    info!("Starting IPFS Controller");

    // Load configuration from environment variables
    let config = ControllerConfig::from_env()?;

    info!("Configuration:");
    info!("  Namespace: {}", config.namespace.as_deref().unwrap_or("all namespaces"));
    match config.resync_interval {
        Some(period) => info!("  Resync interval: {:?}", period),
        None => info!("  Resync interval: disabled"),
    }
    info!("  Retry backoff: {:?} to {:?}", config.retry_min, config.retry_max);
    info!("  Probe address: {}", config.probe_addr);

    // Initialize and run controller
    let controller = Controller::new(config).await?;
    controller.run().await?;

    Ok(())
}
