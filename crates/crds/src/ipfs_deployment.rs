//! Legacy IPFS Deployment CRD
//!
//! The `app.ipfs.io/v1beta1` shape of the resource. Its kind on the wire is
//! `Deployment`; the Rust type is named `IpfsDeployment` to keep it apart from
//! `apps/v1` Deployments.

use crate::ipfs::IpfsStatus;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[kube(
    group = "app.ipfs.io",
    version = "v1beta1",
    kind = "Deployment",
    root = "IpfsDeployment",
    namespaced,
    status = "IpfsStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct IpfsDeploymentSpec {
    /// Desired number of peer replicas
    #[schemars(range(min = 0))]
    pub size: i32,
}
