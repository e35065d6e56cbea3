//! Main controller implementation.
//!
//! This module contains the `Controller` struct that wires the watchers,
//! the dispatcher, the probe server and shutdown handling together.

use crate::config::ControllerConfig;
use crate::dispatcher::{Dispatcher, Shutdown};
use crate::error::ControllerError;
use crate::metrics::{self, Metrics, ProbeState};
use crate::reconciler::Reconciler;
use crate::watcher::Watcher;
use cluster_store::KubeStore;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinError;
use tracing::{error, info, warn};

/// Capacity of the event channel between watchers and the dispatcher.
const EVENT_BUFFER: usize = 256;

/// Main controller for IPFS resources.
pub struct Controller {
    config: ControllerConfig,
    store: KubeStore,
    metrics: Arc<Metrics>,
    probes: Arc<ProbeState>,
}

impl Controller {
    /// Creates a new controller instance.
    pub async fn new(config: ControllerConfig) -> Result<Self, ControllerError> {
        info!("Initializing IPFS Controller");

        // Create Kubernetes client
        let store = KubeStore::try_default()
            .await
            .map_err(ControllerError::store("connect to cluster"))?;

        Ok(Self {
            config,
            store,
            metrics: Arc::new(Metrics::new()?),
            probes: Arc::new(ProbeState::default()),
        })
    }

    /// Runs the controller until shutdown or a watcher failure.
    pub async fn run(self) -> Result<(), ControllerError> {
        info!("IPFS Controller running");

        let (events_tx, events_rx) = mpsc::channel(EVENT_BUFFER);
        let (stop, shutdown) = Shutdown::channel();
        let stop = Arc::new(stop);

        let watcher = Arc::new(Watcher::new(
            self.store.client(),
            self.config.namespace.as_deref(),
            events_tx.clone(),
            self.probes.clone(),
        ));

        // Start watchers in background tasks
        let mut ipfs_watcher = tokio::spawn(watcher.clone().watch_ipfs());
        let mut legacy_watcher = tokio::spawn(watcher.clone().watch_legacy());
        let resync = self
            .config
            .resync_interval
            .map(|period| tokio::spawn(watcher.clone().resync(period)));
        drop(watcher);

        let mut probe_shutdown = shutdown.clone();
        let mut probe_server = tokio::spawn(metrics::serve(
            self.config.probe_addr,
            metrics::router(self.metrics.clone(), self.probes.clone()),
            async move { probe_shutdown.cancelled().await },
        ));

        let signal_stop = stop.clone();
        let signals = tokio::spawn(async move {
            wait_for_signal().await;
            info!("Shutdown requested");
            signal_stop.send_replace(true);
        });

        let dispatcher = Dispatcher::new(
            Reconciler::new(Arc::new(self.store)),
            events_tx,
            self.metrics,
            self.config.retry_min,
            self.config.retry_max,
        );

        let mut probe_done = false;
        let result = tokio::select! {
            result = dispatcher.run(events_rx, shutdown) => result,
            result = &mut ipfs_watcher => join_watcher("Ipfs", result),
            result = &mut legacy_watcher => join_watcher("legacy Deployment", result),
            result = &mut probe_server => {
                probe_done = true;
                result
                    .map_err(|e| ControllerError::Watch(format!("probe server panicked: {}", e)))
                    .and_then(|served| served)
            }
        };

        stop.send_replace(true);
        ipfs_watcher.abort();
        legacy_watcher.abort();
        signals.abort();
        if let Some(resync) = resync {
            resync.abort();
        }
        if !probe_done {
            match probe_server.await {
                Ok(Err(e)) => warn!("Probe server stopped with error: {}", e),
                Err(e) if !e.is_cancelled() => warn!("Probe server task failed: {}", e),
                _ => {}
            }
        }

        if let Err(e) = &result {
            error!("IPFS Controller stopped: {}", e);
        } else {
            info!("IPFS Controller stopped");
        }
        result
    }
}

/// Flattens a finished watcher task into the controller result.
fn join_watcher(
    kind: &str,
    result: Result<Result<(), ControllerError>, JoinError>,
) -> Result<(), ControllerError> {
    result
        .map_err(|e| ControllerError::Watch(format!("{} watcher panicked: {}", kind, e)))?
        .map_err(|e| ControllerError::Watch(format!("{} watcher error: {}", kind, e)))
}

/// Resolves on SIGINT, or SIGTERM on Unix.
async fn wait_for_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = ctrl_c() => {}
                    _ = term.recv() => {}
                }
                return;
            }
            Err(e) => warn!("Cannot listen for SIGTERM: {}", e),
        }
    }
    ctrl_c().await;
}

async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Cannot listen for SIGINT: {}", e);
        std::future::pending::<()>().await;
    }
}
