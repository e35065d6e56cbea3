//! Status projection.
//!
//! Lists the live peer pods of an IPFS resource and republishes their names
//! into `status.nodes` when they differ from what is stored.

use crate::builder::Role;
use crate::error::ControllerError;
use cluster_store::ResourceStore;
use crds::{IpfsCluster, IpfsStatus};
use k8s_openapi::api::core::v1::Pod;
use tracing::{debug, info};

/// Names of `pods`, in list order.
pub fn pod_names(pods: &[Pod]) -> Vec<String> {
    pods.iter()
        .filter_map(|pod| pod.metadata.name.clone())
        .collect()
}

/// New status for `cluster` if the observed `nodes` differ from the stored list.
pub fn project(cluster: &IpfsCluster, nodes: Vec<String>) -> Option<IpfsStatus> {
    (cluster.status.nodes != nodes).then(|| IpfsStatus { nodes })
}

/// Lists peer pods and writes `status.nodes` if it changed.
///
/// Returns whether a status write was issued.
pub async fn refresh(store: &dyn ResourceStore, cluster: &IpfsCluster) -> Result<bool, ControllerError> {
    let namespace = cluster.namespace();
    let pods = store
        .list_pods(namespace, &Role::Peer.selector())
        .await
        .map_err(ControllerError::store("list pods"))?;

    let Some(status) = project(cluster, pod_names(&pods)) else {
        debug!("Status of {} already lists {} nodes", cluster.key(), cluster.status.nodes.len());
        return Ok(false);
    };

    store
        .update_ipfs_status(cluster, &status)
        .await
        .map_err(ControllerError::store("update ipfs status"))?;
    info!("Updated {} status: nodes={:?}", cluster.key(), status.nodes);
    Ok(true)
}
