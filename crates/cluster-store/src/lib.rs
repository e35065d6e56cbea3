//! Cluster Store
//!
//! The typed object store the IPFS operator reconciles against.
//!
//! [`ResourceStore`] is the seam: the operator only needs create/get/update of
//! `apps/v1` Deployments, a labelled pod list, and a status write on the IPFS
//! resource. [`KubeStore`] implements it over `kube::Api`; with the
//! `test-util` feature, [`MockResourceStore`] provides an in-memory version
//! with resource versions, a call log and failure injection.
//!
//! # Example
//!
//! ```no_run
//! use cluster_store::{KubeStore, ResourceStore};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = KubeStore::try_default().await?;
//! let pods = store.list_pods("default", "app=ipfs,role=peer").await?;
//! println!("{} peer pods", pods.len());
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod error;
#[path = "trait.rs"]
pub mod store_trait;
#[cfg(any(test, feature = "test-util"))]
pub mod mock;

pub use client::KubeStore;
pub use error::StoreError;
pub use store_trait::ResourceStore;
#[cfg(any(test, feature = "test-util"))]
pub use mock::{MockResourceStore, StoreCall, StoreOperation};
