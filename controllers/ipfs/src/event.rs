//! Resource events delivered to the reconciler.

use crds::{Ipfs, IpfsCluster, IpfsDeployment};

/// Object carried by an event, one variant per watched kind.
#[derive(Debug, Clone)]
pub enum WatchedObject {
    /// `storage.ipfs.io/v1alpha1` Ipfs
    Ipfs(Box<Ipfs>),
    /// `app.ipfs.io/v1beta1` Deployment
    IpfsDeployment(Box<IpfsDeployment>),
}

impl WatchedObject {
    /// Unified view of the object.
    pub fn to_cluster(&self) -> IpfsCluster {
        match self {
            Self::Ipfs(ipfs) => IpfsCluster::from(ipfs.as_ref().clone()),
            Self::IpfsDeployment(dep) => IpfsCluster::from(dep.as_ref().clone()),
        }
    }
}

impl From<Ipfs> for WatchedObject {
    fn from(ipfs: Ipfs) -> Self {
        Self::Ipfs(Box::new(ipfs))
    }
}

impl From<IpfsDeployment> for WatchedObject {
    fn from(dep: IpfsDeployment) -> Self {
        Self::IpfsDeployment(Box::new(dep))
    }
}

/// A change notification: the object plus whether it was deleted.
#[derive(Debug, Clone)]
pub struct ResourceEvent {
    /// Object as last seen
    pub object: WatchedObject,
    /// Set when the object was removed
    pub deleted: bool,
}

impl ResourceEvent {
    /// Create-or-update notification.
    pub fn upsert(object: impl Into<WatchedObject>) -> Self {
        Self {
            object: object.into(),
            deleted: false,
        }
    }

    /// Delete notification.
    pub fn deleted(object: impl Into<WatchedObject>) -> Self {
        Self {
            object: object.into(),
            deleted: true,
        }
    }

    /// Key of the object this event is about.
    pub fn key(&self) -> String {
        self.object.to_cluster().key()
    }
}
