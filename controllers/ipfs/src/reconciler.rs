//! Reconciliation logic for IPFS resources.
//!
//! One pass per event. An upsert ensures the bootstrap and peer Deployments
//! exist, brings the peer replica count to `spec.size`, then republishes the
//! live peer pod names into the resource's status. A delete is a no-op: the
//! Deployments carry a controller owner reference, so the garbage collector
//! removes them.

use crate::builder::{self, Role};
use crate::error::ControllerError;
use crate::event::ResourceEvent;
use crate::status;
use cluster_store::ResourceStore;
use crds::IpfsCluster;
use k8s_openapi::api::apps::v1::Deployment;
use std::sync::Arc;
use tracing::{debug, info};

/// What a pass did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PassOutcome {
    /// Bootstrap Deployment was created in this pass
    pub bootstrap_created: bool,
    /// Peer Deployment was created in this pass
    pub peer_created: bool,
    /// Peer replica count was corrected
    pub replicas_updated: bool,
    /// `status.nodes` was rewritten
    pub status_updated: bool,
}

/// Reconciles IPFS resources against the cluster store.
///
/// Holds no state between passes; every pass re-reads what it needs.
pub struct Reconciler {
    store: Arc<dyn ResourceStore>,
}

impl Reconciler {
    /// Creates a new reconciler instance.
    pub fn new(store: Arc<dyn ResourceStore>) -> Self {
        Self { store }
    }

    /// Handles one event.
    ///
    /// Returns `Ok(None)` for deletions, which make no store calls.
    pub async fn handle(&self, event: &ResourceEvent) -> Result<Option<PassOutcome>, ControllerError> {
        let cluster = event.object.to_cluster();
        if event.deleted {
            debug!("{} deleted; owned Deployments are left to garbage collection", cluster.key());
            return Ok(None);
        }
        self.reconcile(&cluster).await.map(Some)
    }

    /// Runs the upsert pass for `cluster`.
    ///
    /// Steps run strictly in order and the first failure ends the pass:
    /// 1. Create the bootstrap Deployment (already existing is fine)
    /// 2. Create the peer Deployment (already existing is fine)
    /// 3. Re-read the peer Deployment and correct its replica count
    /// 4. Republish peer pod names into the status
    pub async fn reconcile(&self, cluster: &IpfsCluster) -> Result<PassOutcome, ControllerError> {
        let name = validate(cluster)?;
        info!("Reconciling {} (size={})", cluster.key(), cluster.size);

        let bootstrap_created = self.ensure_created(builder::bootstrap_deployment(cluster)).await?;
        let peer_created = self.ensure_created(builder::peer_deployment(cluster)).await?;
        let replicas_updated = self
            .ensure_replicas(cluster.namespace(), &Role::Peer.workload_name(name), cluster.size)
            .await?;
        let status_updated = status::refresh(self.store.as_ref(), cluster).await?;

        Ok(PassOutcome {
            bootstrap_created,
            peer_created,
            replicas_updated,
            status_updated,
        })
    }

    /// Creates `deployment`, treating an existing one as success.
    async fn ensure_created(&self, deployment: Deployment) -> Result<bool, ControllerError> {
        match self.store.create_deployment(&deployment).await {
            Ok(_) => {
                info!(
                    "Created Deployment {}/{}",
                    deployment.metadata.namespace.as_deref().unwrap_or_default(),
                    deployment.metadata.name.as_deref().unwrap_or_default()
                );
                Ok(true)
            }
            Err(e) if e.is_already_exists() => Ok(false),
            Err(e) => Err(ControllerError::store("create deployment")(e)),
        }
    }

    /// Sets the stored replica count of `namespace/name` to `size` if it differs.
    ///
    /// The update carries the resource version just read, so a concurrent
    /// writer makes it fail with a conflict instead of being overwritten.
    async fn ensure_replicas(&self, namespace: &str, name: &str, size: i32) -> Result<bool, ControllerError> {
        let mut current = self
            .store
            .get_deployment(namespace, name)
            .await
            .map_err(ControllerError::store("get deployment"))?;

        let observed = builder::replicas_of(&current);
        if observed == Some(size) {
            return Ok(false);
        }

        current.spec.get_or_insert_with(Default::default).replicas = Some(size);
        self.store
            .update_deployment(&current)
            .await
            .map_err(ControllerError::store("update deployment"))?;
        info!(
            "Scaled Deployment {}/{} from {:?} to {} replicas",
            namespace, name, observed, size
        );
        Ok(true)
    }
}

/// Checks the fields a pass depends on, returning the object name.
fn validate(cluster: &IpfsCluster) -> Result<&str, ControllerError> {
    let name = cluster
        .name()
        .ok_or_else(|| ControllerError::InvalidResource(format!("{} missing name", cluster.flavor)))?;
    if cluster.uid().is_none() {
        return Err(ControllerError::InvalidResource(format!(
            "{} missing uid",
            cluster.key()
        )));
    }
    if cluster.size < 0 {
        return Err(ControllerError::InvalidSize {
            key: cluster.key(),
            size: cluster.size,
        });
    }
    Ok(name)
}
