//! Prints the CRD manifests for both IPFS API shapes as a multi-document YAML stream.

use crds::{Ipfs, IpfsDeployment};
use kube::CustomResourceExt;

fn main() -> anyhow::Result<()> {
    let manifests = [
        serde_yaml::to_string(&Ipfs::crd())?,
        serde_yaml::to_string(&IpfsDeployment::crd())?,
    ];
    print!("{}", manifests.join("---\n"));
    Ok(())
}
