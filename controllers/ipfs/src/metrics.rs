//! Prometheus metrics and health probes.
//!
//! Serves `/metrics`, `/healthz` and `/readyz`. Readiness flips once both
//! watchers have finished their initial list.

use crate::error::ControllerError;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;
use prometheus::{Histogram, HistogramOpts, IntCounterVec, Opts, Registry, TextEncoder};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Reconciliation metrics.
pub struct Metrics {
    registry: Registry,
    reconciliations: IntCounterVec,
    duration: Histogram,
}

impl Metrics {
    /// Creates and registers the controller metrics.
    pub fn new() -> Result<Self, ControllerError> {
        let registry = Registry::new();
        let reconciliations = IntCounterVec::new(
            Opts::new("ipfs_reconcile_total", "Reconciliation passes by result"),
            &["result"],
        )?;
        let duration = Histogram::with_opts(HistogramOpts::new(
            "ipfs_reconcile_duration_seconds",
            "Duration of reconciliation passes",
        ))?;
        registry.register(Box::new(reconciliations.clone()))?;
        registry.register(Box::new(duration.clone()))?;
        Ok(Self {
            registry,
            reconciliations,
            duration,
        })
    }

    /// Records one pass. `result` is one of `success`, `deleted`, `error`, `cancelled`, `superseded`.
    pub fn observe(&self, result: &str, elapsed: Duration) {
        self.reconciliations.with_label_values(&[result]).inc();
        self.duration.observe(elapsed.as_secs_f64());
    }

    /// Text exposition of all registered metrics.
    pub fn encode(&self) -> Result<String, ControllerError> {
        Ok(TextEncoder::new().encode_to_string(&self.registry.gather())?)
    }
}

/// Watcher sync state backing `/readyz`.
#[derive(Debug, Default)]
pub struct ProbeState {
    ipfs_synced: AtomicBool,
    legacy_synced: AtomicBool,
}

impl ProbeState {
    /// Marks the `Ipfs` watcher as having completed its initial list.
    pub fn mark_ipfs_synced(&self) {
        self.ipfs_synced.store(true, Ordering::Release);
    }

    /// Marks the legacy `Deployment` watcher as having completed its initial list.
    pub fn mark_legacy_synced(&self) {
        self.legacy_synced.store(true, Ordering::Release);
    }

    /// Both watchers have synced.
    pub fn is_ready(&self) -> bool {
        self.ipfs_synced.load(Ordering::Acquire) && self.legacy_synced.load(Ordering::Acquire)
    }
}

#[derive(Clone)]
struct ProbeContext {
    metrics: Arc<Metrics>,
    probes: Arc<ProbeState>,
}

/// Router serving metrics and probes.
pub fn router(metrics: Arc<Metrics>, probes: Arc<ProbeState>) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/healthz", get(|| async { "ok" }))
        .route("/readyz", get(ready_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(ProbeContext { metrics, probes })
}

async fn metrics_handler(State(ctx): State<ProbeContext>) -> (StatusCode, String) {
    match ctx.metrics.encode() {
        Ok(body) => (StatusCode::OK, body),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

async fn ready_handler(State(ctx): State<ProbeContext>) -> (StatusCode, &'static str) {
    if ctx.probes.is_ready() {
        (StatusCode::OK, "ready")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "watchers not synced")
    }
}

/// Serves `router` on `addr` until `shutdown` completes.
pub async fn serve(
    addr: SocketAddr,
    router: Router,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<(), ControllerError> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Serving metrics and probes on {}", addr);
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}
