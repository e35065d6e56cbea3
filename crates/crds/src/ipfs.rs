//! Ipfs CRD
//!
//! Declares a managed IPFS storage network (`storage.ipfs.io/v1alpha1`).

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Deserializer, Serialize};

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[kube(
    group = "storage.ipfs.io",
    version = "v1alpha1",
    kind = "Ipfs",
    namespaced,
    status = "IpfsStatus",
    printcolumn = r#"{"name":"Size","type":"integer","jsonPath":".spec.size"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct IpfsSpec {
    /// Desired number of peer replicas
    #[schemars(range(min = 0))]
    pub size: i32,
}

/// Observed state shared by both API shapes.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct IpfsStatus {
    /// Names of the live peer pods, in list order
    ///
    /// Older writers serialize an empty list as `null`, so both forms are accepted.
    #[serde(default, deserialize_with = "nodes_or_null")]
    #[schemars(extend("nullable" = true))]
    pub nodes: Vec<String>,
}

fn nodes_or_null<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<Vec<String>>::deserialize(deserializer).map(Option::unwrap_or_default)
}
