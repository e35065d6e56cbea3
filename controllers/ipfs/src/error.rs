//! Controller-specific error types.
//!
//! This module defines error types specific to the IPFS Controller
//! that are not covered by upstream library errors.

use cluster_store::StoreError;
use thiserror::Error;

/// Errors that can occur in the IPFS Controller.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// A cluster store call failed; `operation` names the step.
    #[error("failed to {operation}: {source}")]
    Store {
        /// Step of the pass that failed, e.g. "create deployment"
        operation: &'static str,
        /// Underlying store error
        #[source]
        source: StoreError,
    },

    /// The triggering object cannot be reconciled as received
    #[error("Invalid resource: {0}")]
    InvalidResource(String),

    /// Negative `spec.size`
    #[error("Invalid size {size} for {key}: replica count must not be negative")]
    InvalidSize {
        /// Key of the offending resource
        key: String,
        /// Requested size
        size: i32,
    },

    /// Shutdown fired while a pass was in flight
    #[error("Reconciliation cancelled: {0}")]
    Cancelled(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Resource watch failed
    #[error("Resource watch failed: {0}")]
    Watch(String),

    /// Metrics registry error
    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    /// Probe server I/O error
    #[error("Probe server error: {0}")]
    Io(#[from] std::io::Error),
}

impl ControllerError {
    /// Wraps a store error with the name of the step that produced it.
    pub fn store(operation: &'static str) -> impl FnOnce(StoreError) -> Self {
        move |source| Self::Store { operation, source }
    }
}
