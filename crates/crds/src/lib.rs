//! IPFS Operator CRD Definitions
//!
//! Kubernetes Custom Resource Definitions for the IPFS operator.
//!
//! Two API shapes describe the same resource:
//! - `storage.ipfs.io/v1alpha1` `Ipfs`
//! - `app.ipfs.io/v1beta1` `Deployment` (exposed here as [`IpfsDeployment`])
//!
//! Both carry `spec.size` and `status.nodes` and are unified behind
//! [`IpfsCluster`] for reconciliation.

pub mod cluster;
pub mod ipfs;
pub mod ipfs_deployment;

pub use cluster::*;
pub use ipfs::*;
pub use ipfs_deployment::*;
