//! Unified IPFS resource representation
//!
//! Both API shapes carry the same spec and status. The reconciler works on
//! [`IpfsCluster`], which keeps the object metadata plus an [`ApiFlavor`] tag
//! recording which shape it was read from, so writes go back to the same API.

use crate::ipfs::{Ipfs, IpfsStatus};
use crate::ipfs_deployment::IpfsDeployment;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use kube::Resource;
use std::fmt;

/// Namespace used when an object carries none.
pub const DEFAULT_NAMESPACE: &str = "default";

/// Which of the two API shapes an [`IpfsCluster`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ApiFlavor {
    /// `storage.ipfs.io/v1alpha1`, kind `Ipfs`
    StorageV1Alpha1,
    /// `app.ipfs.io/v1beta1`, kind `Deployment`
    AppV1Beta1,
}

impl ApiFlavor {
    /// `apiVersion` of objects of this flavor.
    pub fn api_version(self) -> String {
        match self {
            Self::StorageV1Alpha1 => Ipfs::api_version(&()).into_owned(),
            Self::AppV1Beta1 => IpfsDeployment::api_version(&()).into_owned(),
        }
    }

    /// `kind` of objects of this flavor.
    pub fn kind(self) -> String {
        match self {
            Self::StorageV1Alpha1 => Ipfs::kind(&()).into_owned(),
            Self::AppV1Beta1 => IpfsDeployment::kind(&()).into_owned(),
        }
    }
}

impl fmt::Display for ApiFlavor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.api_version(), self.kind())
    }
}

/// An IPFS resource of either API shape.
#[derive(Debug, Clone, PartialEq)]
pub struct IpfsCluster {
    /// Source API shape
    pub flavor: ApiFlavor,
    /// Object metadata as read from the API server
    pub metadata: ObjectMeta,
    /// Desired peer replica count (`spec.size`)
    pub size: i32,
    /// Last published status
    pub status: IpfsStatus,
}

impl IpfsCluster {
    /// Object name, if set.
    pub fn name(&self) -> Option<&str> {
        self.metadata.name.as_deref()
    }

    /// Object namespace, falling back to `default`.
    pub fn namespace(&self) -> &str {
        self.metadata.namespace.as_deref().unwrap_or(DEFAULT_NAMESPACE)
    }

    /// Object UID, if set.
    pub fn uid(&self) -> Option<&str> {
        self.metadata.uid.as_deref()
    }

    /// Resource version the object was read at.
    pub fn resource_version(&self) -> Option<&str> {
        self.metadata.resource_version.as_deref()
    }

    /// Stable key identifying this object across events: `apiVersion/kind/namespace/name`.
    pub fn key(&self) -> String {
        format!(
            "{}/{}/{}",
            self.flavor,
            self.namespace(),
            self.name().unwrap_or("<unnamed>")
        )
    }

    /// Controller owner reference pointing at this object.
    ///
    /// Returns `None` when the object has no name or UID yet.
    pub fn controller_owner_ref(&self) -> Option<OwnerReference> {
        Some(OwnerReference {
            api_version: self.flavor.api_version(),
            kind: self.flavor.kind(),
            name: self.metadata.name.clone()?,
            uid: self.metadata.uid.clone()?,
            controller: Some(true),
            ..Default::default()
        })
    }
}

impl From<Ipfs> for IpfsCluster {
    fn from(ipfs: Ipfs) -> Self {
        Self {
            flavor: ApiFlavor::StorageV1Alpha1,
            metadata: ipfs.metadata,
            size: ipfs.spec.size,
            status: ipfs.status.unwrap_or_default(),
        }
    }
}

impl From<IpfsDeployment> for IpfsCluster {
    fn from(dep: IpfsDeployment) -> Self {
        Self {
            flavor: ApiFlavor::AppV1Beta1,
            metadata: dep.metadata,
            size: dep.spec.size,
            status: dep.status.unwrap_or_default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{IpfsDeploymentSpec, IpfsSpec};

    fn meta(name: &str, uid: Option<&str>) -> ObjectMeta {
        ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some("storage".to_string()),
            uid: uid.map(str::to_string),
            ..Default::default()
        }
    }

    #[test]
    fn test_both_shapes_unify_to_same_fields() {
        let mut ipfs = Ipfs::new("ipfs1", IpfsSpec { size: 3 });
        ipfs.metadata = meta("ipfs1", Some("uid-1"));
        let mut legacy = IpfsDeployment::new("ipfs1", IpfsDeploymentSpec { size: 3 });
        legacy.metadata = meta("ipfs1", Some("uid-1"));

        let a = IpfsCluster::from(ipfs);
        let b = IpfsCluster::from(legacy);

        assert_eq!(a.flavor, ApiFlavor::StorageV1Alpha1);
        assert_eq!(b.flavor, ApiFlavor::AppV1Beta1);
        assert_eq!(a.size, b.size);
        assert_eq!(a.metadata, b.metadata);
        assert_eq!(a.status, b.status);
        assert_ne!(a.key(), b.key());
    }

    #[test]
    fn test_owner_ref_matches_flavor() {
        let mut legacy = IpfsDeployment::new("ipfs1", IpfsDeploymentSpec { size: 1 });
        legacy.metadata = meta("ipfs1", Some("uid-9"));
        let owner = IpfsCluster::from(legacy).controller_owner_ref().unwrap();

        assert_eq!(owner.api_version, "app.ipfs.io/v1beta1");
        assert_eq!(owner.kind, "Deployment");
        assert_eq!(owner.name, "ipfs1");
        assert_eq!(owner.uid, "uid-9");
        assert_eq!(owner.controller, Some(true));
    }

    #[test]
    fn test_owner_ref_requires_uid() {
        let mut ipfs = Ipfs::new("ipfs1", IpfsSpec { size: 1 });
        ipfs.metadata = meta("ipfs1", None);
        assert!(IpfsCluster::from(ipfs).controller_owner_ref().is_none());
    }

    #[test]
    fn test_namespace_defaults() {
        let ipfs = Ipfs::new("ipfs1", IpfsSpec { size: 1 });
        assert_eq!(IpfsCluster::from(ipfs).namespace(), DEFAULT_NAMESPACE);
    }
}
