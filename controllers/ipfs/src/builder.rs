//! Desired-state builder.
//!
//! Pure functions computing the `apps/v1` Deployments an IPFS resource owns.
//! The same input always yields the same output; nothing here talks to the
//! cluster.

use crds::IpfsCluster;
use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{Container, ContainerPort, PodSpec, PodTemplateSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use std::collections::BTreeMap;

/// Container image run by every IPFS node.
pub const IPFS_IMAGE: &str = "ipfs:1.4.36-alpine";

/// Entrypoint starting the IPFS and cluster daemons.
pub const START_COMMAND: &str = "/usr/local/bin/start-daemons.sh";

/// Name of the node container.
pub const CONTAINER_NAME: &str = "ipfs";

/// Named TCP ports exposed by every node.
pub const NODE_PORTS: [(&str, i32); 5] = [
    ("swarm", 4001),
    ("api", 5001),
    ("clusterapi", 9094),
    ("clusterproxy", 9095),
    ("cluster", 9096),
];

const APP_LABEL: (&str, &str) = ("app", "ipfs");

/// Role of a managed workload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// The node peers join through
    Bootstrap,
    /// Regular storage peers
    Peer,
}

impl Role {
    /// Value of the `role` label.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Bootstrap => "bootstrap",
            Self::Peer => "peer",
        }
    }

    /// Labels carried by pods of this role.
    pub fn labels(self) -> BTreeMap<String, String> {
        BTreeMap::from([
            (APP_LABEL.0.to_string(), APP_LABEL.1.to_string()),
            ("role".to_string(), self.as_str().to_string()),
        ])
    }

    /// Label selector string matching pods of this role.
    pub fn selector(self) -> String {
        self.labels()
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Name of this role's Deployment for the resource named `owner`.
    pub fn workload_name(self, owner: &str) -> String {
        format!("{}-{}", owner, self.as_str())
    }
}

/// Bootstrap Deployment for `cluster`.
pub fn bootstrap_deployment(cluster: &IpfsCluster) -> Deployment {
    deployment_for(cluster, Role::Bootstrap)
}

/// Peer Deployment for `cluster`.
pub fn peer_deployment(cluster: &IpfsCluster) -> Deployment {
    deployment_for(cluster, Role::Peer)
}

/// Deployment for `cluster` in `role`.
///
/// `spec.size` is copied as-is; the reconciler rejects negative sizes before
/// calling in here.
pub fn deployment_for(cluster: &IpfsCluster, role: Role) -> Deployment {
    let labels = role.labels();
    let owner = cluster.name().unwrap_or_default();

    Deployment {
        metadata: ObjectMeta {
            name: Some(role.workload_name(owner)),
            namespace: Some(cluster.namespace().to_string()),
            labels: Some(labels.clone()),
            owner_references: cluster.controller_owner_ref().map(|o| vec![o]),
            ..Default::default()
        },
        spec: Some(DeploymentSpec {
            replicas: Some(cluster.size),
            selector: LabelSelector {
                match_labels: Some(labels.clone()),
                ..Default::default()
            },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(labels),
                    ..Default::default()
                }),
                spec: Some(node_pod_spec()),
            },
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn node_pod_spec() -> PodSpec {
    PodSpec {
        containers: vec![Container {
            name: CONTAINER_NAME.to_string(),
            image: Some(IPFS_IMAGE.to_string()),
            command: Some(vec![START_COMMAND.to_string()]),
            ports: Some(
                NODE_PORTS
                    .iter()
                    .map(|(name, port)| ContainerPort {
                        name: Some((*name).to_string()),
                        container_port: *port,
                        protocol: Some("TCP".to_string()),
                        ..Default::default()
                    })
                    .collect(),
            ),
            ..Default::default()
        }],
        ..Default::default()
    }
}

/// Replica count declared by a Deployment, if any.
pub fn replicas_of(deployment: &Deployment) -> Option<i32> {
    deployment.spec.as_ref().and_then(|s| s.replicas)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::create_test_cluster;

    fn ports(dep: &Deployment) -> Vec<(String, i32, String)> {
        dep.spec
            .as_ref()
            .and_then(|s| s.template.spec.as_ref())
            .map(|p| p.containers.clone())
            .unwrap_or_default()
            .into_iter()
            .flat_map(|c| c.ports.unwrap_or_default())
            .map(|p| {
                (
                    p.name.unwrap_or_default(),
                    p.container_port,
                    p.protocol.unwrap_or_default(),
                )
            })
            .collect()
    }

    #[test]
    fn test_peer_deployment_shape() {
        let cluster = create_test_cluster("ipfs1", "storage", 3, "uid-1");
        let dep = peer_deployment(&cluster);

        assert_eq!(dep.metadata.name.as_deref(), Some("ipfs1-peer"));
        assert_eq!(dep.metadata.namespace.as_deref(), Some("storage"));
        assert_eq!(replicas_of(&dep), Some(3));

        let spec = dep.spec.as_ref().unwrap();
        assert_eq!(spec.selector.match_labels, Some(Role::Peer.labels()));
        let template_labels = spec.template.metadata.as_ref().and_then(|m| m.labels.clone());
        assert_eq!(template_labels, Some(Role::Peer.labels()));

        let container = &spec.template.spec.as_ref().unwrap().containers[0];
        assert_eq!(container.name, "ipfs");
        assert_eq!(container.image.as_deref(), Some(IPFS_IMAGE));
        assert_eq!(container.command, Some(vec![START_COMMAND.to_string()]));
    }

    #[test]
    fn test_both_roles_expose_five_tcp_ports() {
        let cluster = create_test_cluster("ipfs1", "default", 1, "uid-1");
        let expected: Vec<(String, i32, String)> = vec![
            ("swarm".into(), 4001, "TCP".into()),
            ("api".into(), 5001, "TCP".into()),
            ("clusterapi".into(), 9094, "TCP".into()),
            ("clusterproxy".into(), 9095, "TCP".into()),
            ("cluster".into(), 9096, "TCP".into()),
        ];

        assert_eq!(ports(&bootstrap_deployment(&cluster)), expected);
        assert_eq!(ports(&peer_deployment(&cluster)), expected);
    }

    #[test]
    fn test_roles_differ_only_in_name_and_labels() {
        let cluster = create_test_cluster("ipfs1", "default", 2, "uid-1");
        let mut bootstrap = bootstrap_deployment(&cluster);
        let peer = peer_deployment(&cluster);

        assert_eq!(bootstrap.metadata.name.as_deref(), Some("ipfs1-bootstrap"));
        assert_eq!(
            bootstrap.metadata.labels.as_ref().and_then(|l| l.get("role")).map(String::as_str),
            Some("bootstrap")
        );

        bootstrap.metadata.name = peer.metadata.name.clone();
        bootstrap.metadata.labels = peer.metadata.labels.clone();
        if let Some(spec) = bootstrap.spec.as_mut() {
            spec.selector.match_labels = Some(Role::Peer.labels());
            spec.template.metadata = Some(ObjectMeta {
                labels: Some(Role::Peer.labels()),
                ..Default::default()
            });
        }
        assert_eq!(bootstrap, peer);
    }

    #[test]
    fn test_owner_reference_points_at_resource() {
        let cluster = create_test_cluster("ipfs1", "default", 1, "uid-42");
        let dep = bootstrap_deployment(&cluster);
        let owners = dep.metadata.owner_references.unwrap();

        assert_eq!(owners.len(), 1);
        assert_eq!(owners[0].api_version, "storage.ipfs.io/v1alpha1");
        assert_eq!(owners[0].kind, "Ipfs");
        assert_eq!(owners[0].name, "ipfs1");
        assert_eq!(owners[0].uid, "uid-42");
        assert_eq!(owners[0].controller, Some(true));
    }

    #[test]
    fn test_builder_is_deterministic() {
        let cluster = create_test_cluster("ipfs1", "default", 4, "uid-1");
        assert_eq!(peer_deployment(&cluster), peer_deployment(&cluster));
        assert_eq!(bootstrap_deployment(&cluster), bootstrap_deployment(&cluster));
    }

    #[test]
    fn test_zero_size_passes_through() {
        let cluster = create_test_cluster("ipfs1", "default", 0, "uid-1");
        assert_eq!(replicas_of(&peer_deployment(&cluster)), Some(0));
    }

    #[test]
    fn test_selector_string() {
        assert_eq!(Role::Peer.selector(), "app=ipfs,role=peer");
        assert_eq!(Role::Bootstrap.selector(), "app=ipfs,role=bootstrap");
    }
}
