//! Mock ResourceStore for unit testing
//!
//! This module provides an in-memory implementation of [`ResourceStore`] that
//! can be used in unit tests without a running API server.
//!
//! The mock keeps resource versions so compare-and-swap updates behave like the
//! API server, records every call in order, and can be told to fail or hang on
//! a given operation.

use crate::error::StoreError;
use crate::store_trait::ResourceStore;
use crds::{IpfsCluster, IpfsStatus};
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Pod;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Operations of the store, for failure injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOperation {
    /// `create_deployment`
    CreateDeployment,
    /// `get_deployment`
    GetDeployment,
    /// `update_deployment`
    UpdateDeployment,
    /// `list_pods`
    ListPods,
    /// `update_ipfs_status`
    UpdateIpfsStatus,
}

/// A recorded call against the mock.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreCall {
    /// Create of the given Deployment, as submitted
    CreateDeployment(Deployment),
    /// Get of `namespace/name`
    GetDeployment {
        /// Namespace
        namespace: String,
        /// Name
        name: String,
    },
    /// Update of the given Deployment, as submitted
    UpdateDeployment(Deployment),
    /// Pod list
    ListPods {
        /// Namespace
        namespace: String,
        /// Label selector
        selector: String,
    },
    /// Status write
    UpdateIpfsStatus {
        /// Key of the IPFS resource
        key: String,
        /// Written node list
        nodes: Vec<String>,
    },
}

impl StoreCall {
    /// The operation this call was made through.
    pub fn operation(&self) -> StoreOperation {
        match self {
            Self::CreateDeployment(_) => StoreOperation::CreateDeployment,
            Self::GetDeployment { .. } => StoreOperation::GetDeployment,
            Self::UpdateDeployment(_) => StoreOperation::UpdateDeployment,
            Self::ListPods { .. } => StoreOperation::ListPods,
            Self::UpdateIpfsStatus { .. } => StoreOperation::UpdateIpfsStatus,
        }
    }
}

#[derive(Default)]
struct MockState {
    deployments: BTreeMap<(String, String), Deployment>,
    pods: BTreeMap<(String, String), Pod>,
    // key -> (resource version, status)
    ipfs: HashMap<String, (String, IpfsStatus)>,
    calls: Vec<StoreCall>,
    failures: HashMap<StoreOperation, VecDeque<StoreError>>,
    hangs: HashSet<StoreOperation>,
    next_version: u64,
}

impl MockState {
    fn bump_version(&mut self) -> String {
        self.next_version += 1;
        self.next_version.to_string()
    }

    fn take_failure(&mut self, op: StoreOperation) -> Option<StoreError> {
        self.failures.get_mut(&op).and_then(VecDeque::pop_front)
    }
}

/// In-memory [`ResourceStore`].
#[derive(Clone, Default)]
pub struct MockResourceStore {
    state: Arc<Mutex<MockState>>,
}

fn key_of(meta: &ObjectMeta) -> (String, String) {
    (
        meta.namespace.clone().unwrap_or_default(),
        meta.name.clone().unwrap_or_default(),
    )
}

fn selector_matches(selector: &str, labels: Option<&BTreeMap<String, String>>) -> bool {
    selector
        .split(',')
        .filter(|term| !term.is_empty())
        .all(|term| match term.split_once('=') {
            Some((k, v)) => labels.and_then(|l| l.get(k)).is_some_and(|actual| actual == v),
            None => false,
        })
}

impl MockResourceStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Store a Deployment directly (for test setup). Returns its resource version.
    pub fn add_deployment(&self, mut deployment: Deployment) -> String {
        let mut state = self.lock();
        let rv = state.bump_version();
        deployment.metadata.resource_version = Some(rv.clone());
        state.deployments.insert(key_of(&deployment.metadata), deployment);
        rv
    }

    /// Current stored Deployment, if any.
    pub fn deployment(&self, namespace: &str, name: &str) -> Option<Deployment> {
        self.lock()
            .deployments
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }

    /// Overwrite a stored Deployment's replica count, as another writer would.
    pub fn set_replicas(&self, namespace: &str, name: &str, replicas: i32) {
        let mut state = self.lock();
        let rv = state.bump_version();
        if let Some(dep) = state
            .deployments
            .get_mut(&(namespace.to_string(), name.to_string()))
        {
            if let Some(spec) = dep.spec.as_mut() {
                spec.replicas = Some(replicas);
            }
            dep.metadata.resource_version = Some(rv);
        }
    }

    /// Add a pod with the given labels (for test setup).
    pub fn add_pod(&self, namespace: &str, name: &str, labels: &[(&str, &str)]) {
        let pod = Pod {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some(namespace.to_string()),
                labels: Some(
                    labels
                        .iter()
                        .map(|(k, v)| (k.to_string(), v.to_string()))
                        .collect(),
                ),
                ..Default::default()
            },
            ..Default::default()
        };
        self.lock().pods.insert(key_of(&pod.metadata), pod);
    }

    /// Remove a pod (for test setup).
    pub fn remove_pod(&self, namespace: &str, name: &str) {
        self.lock()
            .pods
            .remove(&(namespace.to_string(), name.to_string()));
    }

    /// Register an IPFS resource so status writes are version-checked against it.
    pub fn add_ipfs(&self, cluster: &IpfsCluster) {
        let rv = cluster.resource_version().unwrap_or_default().to_string();
        self.lock()
            .ipfs
            .insert(cluster.key(), (rv, cluster.status.clone()));
    }

    /// Last status written for the IPFS resource with `key`.
    pub fn ipfs_status(&self, key: &str) -> Option<IpfsStatus> {
        self.lock().ipfs.get(key).map(|(_, status)| status.clone())
    }

    /// Current resource version of the IPFS resource with `key`.
    pub fn ipfs_resource_version(&self, key: &str) -> Option<String> {
        self.lock().ipfs.get(key).map(|(rv, _)| rv.clone())
    }

    /// Make the next call of `op` fail with `err`. Queued failures are used in order.
    pub fn fail_next(&self, op: StoreOperation, err: StoreError) {
        self.lock().failures.entry(op).or_default().push_back(err);
    }

    /// Make every call of `op` block forever, like a request that never returns.
    pub fn hang_on(&self, op: StoreOperation) {
        self.lock().hangs.insert(op);
    }

    /// All calls made so far, in order.
    pub fn calls(&self) -> Vec<StoreCall> {
        self.lock().calls.clone()
    }

    /// Calls made through `op`.
    pub fn calls_of(&self, op: StoreOperation) -> Vec<StoreCall> {
        self.lock()
            .calls
            .iter()
            .filter(|c| c.operation() == op)
            .cloned()
            .collect()
    }

    /// Forget recorded calls.
    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    /// Record `call`, then either return an injected failure, hang, or proceed.
    async fn enter(&self, call: StoreCall) -> Result<(), StoreError> {
        let op = call.operation();
        let hang = {
            let mut state = self.lock();
            state.calls.push(call);
            if let Some(err) = state.take_failure(op) {
                return Err(err);
            }
            state.hangs.contains(&op)
        };
        if hang {
            futures::future::pending::<()>().await;
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl ResourceStore for MockResourceStore {
    async fn create_deployment(&self, deployment: &Deployment) -> Result<Deployment, StoreError> {
        self.enter(StoreCall::CreateDeployment(deployment.clone())).await?;
        let key = key_of(&deployment.metadata);
        let mut state = self.lock();
        if state.deployments.contains_key(&key) {
            return Err(StoreError::AlreadyExists(format!(
                "deployments.apps \"{}\" already exists",
                key.1
            )));
        }
        let mut stored = deployment.clone();
        stored.metadata.resource_version = Some(state.bump_version());
        state.deployments.insert(key, stored.clone());
        Ok(stored)
    }

    async fn get_deployment(&self, namespace: &str, name: &str) -> Result<Deployment, StoreError> {
        self.enter(StoreCall::GetDeployment {
            namespace: namespace.to_string(),
            name: name.to_string(),
        })
        .await?;
        self.deployment(namespace, name)
            .ok_or_else(|| StoreError::NotFound(format!("deployments.apps \"{}\" not found", name)))
    }

    async fn update_deployment(&self, deployment: &Deployment) -> Result<Deployment, StoreError> {
        self.enter(StoreCall::UpdateDeployment(deployment.clone())).await?;
        let key = key_of(&deployment.metadata);
        let mut state = self.lock();
        let current_rv = match state.deployments.get(&key) {
            Some(current) => current.metadata.resource_version.clone(),
            None => {
                return Err(StoreError::NotFound(format!(
                    "deployments.apps \"{}\" not found",
                    key.1
                )));
            }
        };
        if deployment.metadata.resource_version != current_rv {
            return Err(StoreError::Conflict(format!(
                "Operation cannot be fulfilled on deployments.apps \"{}\": the object has been modified",
                key.1
            )));
        }
        let mut stored = deployment.clone();
        stored.metadata.resource_version = Some(state.bump_version());
        state.deployments.insert(key, stored.clone());
        Ok(stored)
    }

    async fn list_pods(&self, namespace: &str, label_selector: &str) -> Result<Vec<Pod>, StoreError> {
        self.enter(StoreCall::ListPods {
            namespace: namespace.to_string(),
            selector: label_selector.to_string(),
        })
        .await?;
        Ok(self
            .lock()
            .pods
            .values()
            .filter(|pod| pod.metadata.namespace.as_deref() == Some(namespace))
            .filter(|pod| selector_matches(label_selector, pod.metadata.labels.as_ref()))
            .cloned()
            .collect())
    }

    async fn update_ipfs_status(&self, cluster: &IpfsCluster, status: &IpfsStatus) -> Result<(), StoreError> {
        let key = cluster.key();
        self.enter(StoreCall::UpdateIpfsStatus {
            key: key.clone(),
            nodes: status.nodes.clone(),
        })
        .await?;
        let mut state = self.lock();
        let expected = cluster.resource_version().unwrap_or_default().to_string();
        if let Some((rv, _)) = state.ipfs.get(&key) {
            if *rv != expected {
                return Err(StoreError::Conflict(format!(
                    "Operation cannot be fulfilled on {}: the object has been modified",
                    key
                )));
            }
        }
        let rv = state.bump_version();
        state.ipfs.insert(key, (rv, status.clone()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::apps::v1::DeploymentSpec;

    fn deployment(name: &str, replicas: i32) -> Deployment {
        Deployment {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some("default".to_string()),
                ..Default::default()
            },
            spec: Some(DeploymentSpec {
                replicas: Some(replicas),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_create_twice_reports_already_exists() {
        let store = MockResourceStore::new();
        store.create_deployment(&deployment("a", 1)).await.unwrap();

        let err = store.create_deployment(&deployment("a", 1)).await.unwrap_err();
        assert!(err.is_already_exists());
        assert_eq!(store.calls_of(StoreOperation::CreateDeployment).len(), 2);
    }

    #[tokio::test]
    async fn test_update_with_stale_version_conflicts() {
        let store = MockResourceStore::new();
        store.add_deployment(deployment("a", 1));
        let read = store.get_deployment("default", "a").await.unwrap();

        store.set_replicas("default", "a", 5);

        let err = store.update_deployment(&read).await.unwrap_err();
        assert!(err.is_conflict());
        let stored = store.deployment("default", "a").unwrap();
        assert_eq!(stored.spec.and_then(|s| s.replicas), Some(5));
    }

    #[tokio::test]
    async fn test_get_missing_is_not_found() {
        let store = MockResourceStore::new();
        let err = store.get_deployment("default", "missing").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_list_pods_filters_by_namespace_and_labels() {
        let store = MockResourceStore::new();
        store.add_pod("default", "peer-b", &[("app", "ipfs"), ("role", "peer")]);
        store.add_pod("default", "peer-a", &[("app", "ipfs"), ("role", "peer")]);
        store.add_pod("default", "boot", &[("app", "ipfs"), ("role", "bootstrap")]);
        store.add_pod("other", "peer-c", &[("app", "ipfs"), ("role", "peer")]);

        let pods = store.list_pods("default", "app=ipfs,role=peer").await.unwrap();
        let names: Vec<_> = pods.iter().filter_map(|p| p.metadata.name.clone()).collect();
        assert_eq!(names, vec!["peer-a", "peer-b"]);
    }

    #[tokio::test]
    async fn test_injected_failure_is_used_once() {
        let store = MockResourceStore::new();
        store.fail_next(StoreOperation::ListPods, StoreError::Api {
            code: 500,
            message: "boom".to_string(),
        });

        assert!(store.list_pods("default", "app=ipfs").await.is_err());
        assert!(store.list_pods("default", "app=ipfs").await.is_ok());
    }
}
