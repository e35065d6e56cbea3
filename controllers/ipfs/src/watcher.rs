//! Kubernetes resource watchers.
//!
//! This module watches both IPFS resource kinds and turns their changes into
//! deliveries on the dispatcher's event channel. It also runs the periodic
//! resync, which re-lists both kinds and re-enqueues every object.

use crate::dispatcher::Delivery;
use crate::error::ControllerError;
use crate::event::{ResourceEvent, WatchedObject};
use crate::metrics::ProbeState;
use crds::{Ipfs, IpfsDeployment};
use futures::StreamExt;
use kube::api::ListParams;
use kube::{Api, Client, Resource};
use kube_runtime::watcher;
use kube_runtime::WatchStreamExt;
use serde::de::DeserializeOwned;
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Maps a watch event to a delivery. Bookkeeping events map to `None`.
pub fn to_delivery<K>(event: watcher::Event<K>) -> Option<Delivery>
where
    K: Into<WatchedObject>,
{
    match event {
        watcher::Event::Apply(obj) | watcher::Event::InitApply(obj) => {
            Some(Delivery::Fresh(ResourceEvent::upsert(obj)))
        }
        watcher::Event::Delete(obj) => Some(Delivery::Fresh(ResourceEvent::deleted(obj))),
        watcher::Event::Init | watcher::Event::InitDone => None,
    }
}

/// Watches IPFS resources and feeds the event channel.
pub struct Watcher {
    ipfs_api: Api<Ipfs>,
    legacy_api: Api<IpfsDeployment>,
    events: mpsc::Sender<Delivery>,
    probes: Arc<ProbeState>,
}

impl Watcher {
    /// Creates a watcher over `namespace`, or all namespaces when `None`.
    pub fn new(
        client: Client,
        namespace: Option<&str>,
        events: mpsc::Sender<Delivery>,
        probes: Arc<ProbeState>,
    ) -> Self {
        let (ipfs_api, legacy_api) = match namespace {
            Some(ns) => (Api::namespaced(client.clone(), ns), Api::namespaced(client, ns)),
            None => (Api::all(client.clone()), Api::all(client)),
        };
        Self {
            ipfs_api,
            legacy_api,
            events,
            probes,
        }
    }

    /// Watches `storage.ipfs.io/v1alpha1` Ipfs resources.
    pub async fn watch_ipfs(self: Arc<Self>) -> Result<(), ControllerError> {
        self.watch(self.ipfs_api.clone(), "Ipfs", ProbeState::mark_ipfs_synced)
            .await
    }

    /// Watches `app.ipfs.io/v1beta1` Deployment resources.
    pub async fn watch_legacy(self: Arc<Self>) -> Result<(), ControllerError> {
        self.watch(
            self.legacy_api.clone(),
            "legacy Deployment",
            ProbeState::mark_legacy_synced,
        )
        .await
    }

    /// Forwards the watch stream of `api` until the event channel closes.
    ///
    /// Stream errors are logged; the stream itself backs off and re-lists.
    async fn watch<K>(
        &self,
        api: Api<K>,
        kind: &'static str,
        mark_synced: fn(&ProbeState),
    ) -> Result<(), ControllerError>
    where
        K: Resource + Clone + DeserializeOwned + Debug + Send + Sync + 'static,
        K::DynamicType: Default,
        K: Into<WatchedObject>,
    {
        info!("Starting {} watcher", kind);

        let mut stream = Box::pin(watcher(api, watcher::Config::default()).default_backoff());

        while let Some(result) = stream.next().await {
            let event = match result {
                Ok(event) => event,
                Err(e) => {
                    warn!("{} watch error: {}", kind, e);
                    continue;
                }
            };
            match &event {
                watcher::Event::Init => debug!("{} watcher initialized", kind),
                watcher::Event::InitDone => {
                    info!("{} watcher initialization complete", kind);
                    mark_synced(&self.probes);
                }
                _ => {}
            }
            if let Some(delivery) = to_delivery(event) {
                if self.events.send(delivery).await.is_err() {
                    debug!("Event channel closed; stopping {} watcher", kind);
                    return Ok(());
                }
            }
        }

        Err(ControllerError::Watch(format!("{} watch stream ended", kind)))
    }

    /// Re-enqueues every IPFS resource each `period`.
    pub async fn resync(self: Arc<Self>, period: Duration) -> Result<(), ControllerError> {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // first tick is immediate; the watchers' initial list covers it
        ticker.tick().await;

        loop {
            ticker.tick().await;
            match self.resync_once().await {
                Ok(Some(count)) => info!("Resync enqueued {} resources", count),
                Ok(None) => {
                    debug!("Event channel closed; stopping resync");
                    return Ok(());
                }
                Err(e) => warn!("Resync failed: {}", e),
            }
        }
    }

    /// Lists both kinds and enqueues an upsert for each object.
    ///
    /// Returns `None` once the event channel is closed.
    async fn resync_once(&self) -> Result<Option<usize>, ControllerError> {
        let params = ListParams::default();
        let ipfs = self
            .ipfs_api
            .list(&params)
            .await
            .map_err(|e| ControllerError::Watch(format!("failed to list Ipfs resources: {}", e)))?;
        let legacy = self
            .legacy_api
            .list(&params)
            .await
            .map_err(|e| ControllerError::Watch(format!("failed to list legacy Deployment resources: {}", e)))?;

        let objects = ipfs
            .items
            .into_iter()
            .map(WatchedObject::from)
            .chain(legacy.items.into_iter().map(WatchedObject::from));

        let mut count = 0;
        for object in objects {
            if self
                .events
                .send(Delivery::Fresh(ResourceEvent::upsert(object)))
                .await
                .is_err()
            {
                return Ok(None);
            }
            count += 1;
        }
        Ok(Some(count))
    }
}
