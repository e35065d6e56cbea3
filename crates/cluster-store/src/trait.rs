//! ResourceStore trait for mocking
//!
//! This trait abstracts the Kubernetes API calls the reconciler makes so that
//! reconciliation can be unit tested against an in-memory store.

use crate::error::StoreError;
use crds::{IpfsCluster, IpfsStatus};
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Pod;

/// Typed CRUD + list operations against the cluster.
///
/// All async methods must be `Send` to work with Tokio's work-stealing runtime.
#[async_trait::async_trait]
pub trait ResourceStore: Send + Sync {
    /// Create a Deployment in its own namespace.
    ///
    /// Fails with [`StoreError::AlreadyExists`] when the name is taken.
    async fn create_deployment(&self, deployment: &Deployment) -> Result<Deployment, StoreError>;

    /// Fetch the current stored state of a Deployment.
    async fn get_deployment(&self, namespace: &str, name: &str) -> Result<Deployment, StoreError>;

    /// Replace a Deployment.
    ///
    /// The object's `metadata.resourceVersion` is checked by the store; a stale
    /// version fails with [`StoreError::Conflict`].
    async fn update_deployment(&self, deployment: &Deployment) -> Result<Deployment, StoreError>;

    /// List pods in `namespace` matching `label_selector` (`k=v,k2=v2`).
    async fn list_pods(&self, namespace: &str, label_selector: &str) -> Result<Vec<Pod>, StoreError>;

    /// Write `status` onto the IPFS resource, in the API shape it was read from.
    ///
    /// Guarded by the resource version `cluster` was read at.
    async fn update_ipfs_status(&self, cluster: &IpfsCluster, status: &IpfsStatus) -> Result<(), StoreError>;
}
