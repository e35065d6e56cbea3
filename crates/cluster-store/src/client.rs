//! Kubernetes-backed store
//!
//! Implements [`ResourceStore`] with `kube::Api` calls against the API server.

use crate::error::StoreError;
use crate::store_trait::ResourceStore;
use crds::{ApiFlavor, Ipfs, IpfsCluster, IpfsDeployment, IpfsStatus};
use k8s_openapi::NamespaceResourceScope;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Pod;
use kube::api::{ListParams, Patch, PatchParams, PostParams};
use kube::{Api, Client, Resource};
use serde::de::DeserializeOwned;
use serde_json::json;
use std::fmt::Debug;
use tracing::debug;

/// [`ResourceStore`] backed by a live Kubernetes client.
#[derive(Clone)]
pub struct KubeStore {
    client: Client,
}

impl KubeStore {
    /// Wrap an existing client.
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Build a client from the in-cluster or kubeconfig environment.
    pub async fn try_default() -> Result<Self, StoreError> {
        let client = Client::try_default().await.map_err(StoreError::Kube)?;
        Ok(Self::new(client))
    }

    /// The underlying client, for building watch streams.
    pub fn client(&self) -> Client {
        self.client.clone()
    }

    fn deployments(&self, namespace: &str) -> Api<Deployment> {
        Api::namespaced(self.client.clone(), namespace)
    }

    async fn patch_status<K>(
        &self,
        namespace: &str,
        name: &str,
        patch: &serde_json::Value,
    ) -> Result<(), StoreError>
    where
        K: Resource<Scope = NamespaceResourceScope> + Clone + DeserializeOwned + Debug,
        K::DynamicType: Default,
    {
        let api: Api<K> = Api::namespaced(self.client.clone(), namespace);
        api.patch_status(name, &PatchParams::default(), &Patch::Merge(patch))
            .await?;
        Ok(())
    }
}

fn addressed(deployment: &Deployment) -> Result<(&str, &str), StoreError> {
    let name = deployment
        .metadata
        .name
        .as_deref()
        .ok_or_else(|| StoreError::InvalidObject("Deployment missing name".to_string()))?;
    let namespace = deployment
        .metadata
        .namespace
        .as_deref()
        .ok_or_else(|| StoreError::InvalidObject(format!("Deployment {} missing namespace", name)))?;
    Ok((namespace, name))
}

#[async_trait::async_trait]
impl ResourceStore for KubeStore {
    async fn create_deployment(&self, deployment: &Deployment) -> Result<Deployment, StoreError> {
        let (namespace, name) = addressed(deployment)?;
        debug!("Creating Deployment {}/{}", namespace, name);
        Ok(self
            .deployments(namespace)
            .create(&PostParams::default(), deployment)
            .await?)
    }

    async fn get_deployment(&self, namespace: &str, name: &str) -> Result<Deployment, StoreError> {
        Ok(self.deployments(namespace).get(name).await?)
    }

    async fn update_deployment(&self, deployment: &Deployment) -> Result<Deployment, StoreError> {
        let (namespace, name) = addressed(deployment)?;
        debug!(
            "Replacing Deployment {}/{} at resourceVersion {:?}",
            namespace, name, deployment.metadata.resource_version
        );
        Ok(self
            .deployments(namespace)
            .replace(name, &PostParams::default(), deployment)
            .await?)
    }

    async fn list_pods(&self, namespace: &str, label_selector: &str) -> Result<Vec<Pod>, StoreError> {
        let api: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let pods = api.list(&ListParams::default().labels(label_selector)).await?;
        Ok(pods.items)
    }

    async fn update_ipfs_status(&self, cluster: &IpfsCluster, status: &IpfsStatus) -> Result<(), StoreError> {
        let name = cluster
            .name()
            .ok_or_else(|| StoreError::InvalidObject(format!("{} missing name", cluster.flavor)))?;
        let namespace = cluster.namespace();

        // resourceVersion in a merge patch makes the API server reject stale writes
        let patch = match cluster.resource_version() {
            Some(rv) => json!({ "metadata": { "resourceVersion": rv }, "status": status }),
            None => json!({ "status": status }),
        };

        match cluster.flavor {
            ApiFlavor::StorageV1Alpha1 => self.patch_status::<Ipfs>(namespace, name, &patch).await,
            ApiFlavor::AppV1Beta1 => {
                self.patch_status::<IpfsDeployment>(namespace, name, &patch)
                    .await
            }
        }
    }
}
