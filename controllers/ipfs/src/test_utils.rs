//! Test utilities for unit testing the reconciler
//!
//! This module provides helpers for creating test data and setting up test scenarios.

#[cfg(test)]
use crate::reconciler::Reconciler;
#[cfg(test)]
use cluster_store::MockResourceStore;
#[cfg(test)]
use crds::*;
#[cfg(test)]
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
#[cfg(test)]
use std::sync::Arc;

#[cfg(test)]
fn test_metadata(name: &str, namespace: &str, uid: &str) -> ObjectMeta {
    ObjectMeta {
        name: Some(name.to_string()),
        namespace: Some(namespace.to_string()),
        uid: Some(uid.to_string()),
        resource_version: Some("1".to_string()),
        ..Default::default()
    }
}

/// Helper to create a test Ipfs CR
#[cfg(test)]
pub fn create_test_ipfs(name: &str, namespace: &str, size: i32, uid: &str) -> Ipfs {
    Ipfs {
        metadata: test_metadata(name, namespace, uid),
        spec: IpfsSpec { size },
        status: None,
    }
}

/// Helper to create a test legacy Deployment CR
#[cfg(test)]
pub fn create_test_ipfs_deployment(name: &str, namespace: &str, size: i32, uid: &str) -> IpfsDeployment {
    IpfsDeployment {
        metadata: test_metadata(name, namespace, uid),
        spec: IpfsDeploymentSpec { size },
        status: None,
    }
}

/// Helper to create the unified view of a test Ipfs CR
#[cfg(test)]
pub fn create_test_cluster(name: &str, namespace: &str, size: i32, uid: &str) -> IpfsCluster {
    IpfsCluster::from(create_test_ipfs(name, namespace, size, uid))
}

/// Reconciler backed by `store`; the store handle stays usable for assertions
#[cfg(test)]
pub fn test_reconciler(store: &MockResourceStore) -> Reconciler {
    Reconciler::new(Arc::new(store.clone()))
}
