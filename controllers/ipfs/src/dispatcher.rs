//! Event dispatch.
//!
//! A single consumer drains the event channel and runs one reconciliation
//! pass at a time. Failed passes are redelivered after a per-resource
//! Fibonacci backoff; a redelivery is dropped if a newer event for the same
//! resource arrived in the meantime. Shutdown aborts the pass in flight.

use crate::backoff::FibonacciBackoff;
use crate::error::ControllerError;
use crate::event::ResourceEvent;
use crate::metrics::Metrics;
use crate::reconciler::{PassOutcome, Reconciler};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

/// An event entering the dispatcher.
#[derive(Debug, Clone)]
pub enum Delivery {
    /// New notification from a watcher or resync
    Fresh(ResourceEvent),
    /// Redelivery of an event whose pass failed
    Retry {
        /// The failed event
        event: ResourceEvent,
        /// Sequence number of the event when the retry was scheduled
        seq: u64,
    },
}

/// Shutdown signal shared by the controller's tasks.
#[derive(Debug, Clone)]
pub struct Shutdown(watch::Receiver<bool>);

impl Shutdown {
    /// Signal plus the sender that fires it.
    pub fn channel() -> (watch::Sender<bool>, Self) {
        let (tx, rx) = watch::channel(false);
        (tx, Self(rx))
    }

    /// Resolves once shutdown has been requested. Never resolves if the sender is gone.
    pub async fn cancelled(&mut self) {
        let sender_gone = self.0.wait_for(|stop| *stop).await.is_err();
        if sender_gone {
            std::future::pending::<()>().await;
        }
    }

    /// Whether shutdown has been requested.
    #[cfg(test)]
    pub fn is_cancelled(&self) -> bool {
        *self.0.borrow()
    }
}

/// Retry bookkeeping for one resource.
#[derive(Debug, Clone)]
struct BackoffState {
    backoff: FibonacciBackoff,
    error_count: u32,
}

/// Result of dispatching one delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatched {
    /// Upsert pass completed
    Reconciled(PassOutcome),
    /// Delete notification, nothing to do
    Deleted,
    /// Pass failed; redelivery scheduled after the given delay
    Failed(Duration),
    /// Stale redelivery dropped
    Superseded,
}

/// Serializes reconciliation passes.
pub struct Dispatcher {
    reconciler: Reconciler,
    /// Weak so the dispatcher alone does not keep its own input channel open
    requeue: mpsc::WeakSender<Delivery>,
    metrics: Arc<Metrics>,
    retry_min: Duration,
    retry_max: Duration,
    /// Dispatcher-wide event counter, never reused
    next_seq: u64,
    /// Latest sequence number per resource; a retry carrying another value is stale
    seqs: HashMap<String, u64>,
    backoffs: HashMap<String, BackoffState>,
}

impl Dispatcher {
    /// Creates a dispatcher that schedules redeliveries on `requeue`.
    pub fn new(
        reconciler: Reconciler,
        requeue: mpsc::Sender<Delivery>,
        metrics: Arc<Metrics>,
        retry_min: Duration,
        retry_max: Duration,
    ) -> Self {
        Self {
            reconciler,
            requeue: requeue.downgrade(),
            metrics,
            retry_min,
            retry_max,
            next_seq: 0,
            seqs: HashMap::new(),
            backoffs: HashMap::new(),
        }
    }

    /// Drains `events` until the channel closes or shutdown fires.
    pub async fn run(
        mut self,
        mut events: mpsc::Receiver<Delivery>,
        mut shutdown: Shutdown,
    ) -> Result<(), ControllerError> {
        info!("Dispatcher running");
        loop {
            let delivery = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                next = events.recv() => match next {
                    Some(delivery) => delivery,
                    None => break,
                },
            };
            match self.dispatch(delivery, &mut shutdown).await {
                Err(ControllerError::Cancelled(reason)) => {
                    warn!("Pass aborted by shutdown: {}", reason);
                    break;
                }
                Err(e) => return Err(e),
                Ok(_) => {}
            }
        }
        info!("Dispatcher stopped");
        Ok(())
    }

    /// Runs the pass for one delivery.
    ///
    /// Reconciliation failures are handled here (logged and rescheduled);
    /// the only error returned is [`ControllerError::Cancelled`].
    pub async fn dispatch(
        &mut self,
        delivery: Delivery,
        shutdown: &mut Shutdown,
    ) -> Result<Dispatched, ControllerError> {
        let started = Instant::now();
        let (event, seq) = match delivery {
            Delivery::Fresh(event) => {
                let seq = self.bump_seq(&event.key());
                (event, seq)
            }
            Delivery::Retry { event, seq } => {
                if self.seqs.get(&event.key()) != Some(&seq) {
                    debug!("Dropping superseded retry for {}", event.key());
                    self.metrics.observe("superseded", started.elapsed());
                    return Ok(Dispatched::Superseded);
                }
                (event, seq)
            }
        };
        let key = event.key();

        let result = tokio::select! {
            biased;
            _ = shutdown.cancelled() => {
                Err(ControllerError::Cancelled(format!("pass for {} interrupted", key)))
            }
            result = self.reconciler.handle(&event) => result,
        };

        match result {
            Ok(outcome) => {
                if event.deleted {
                    self.seqs.remove(&key);
                    self.backoffs.remove(&key);
                } else if let Some(state) = self.backoffs.get_mut(&key) {
                    state.backoff.reset();
                    state.error_count = 0;
                }
                let dispatched = match outcome {
                    Some(outcome) => {
                        debug!("Reconciled {}: {:?}", key, outcome);
                        self.metrics.observe("success", started.elapsed());
                        Dispatched::Reconciled(outcome)
                    }
                    None => {
                        self.metrics.observe("deleted", started.elapsed());
                        Dispatched::Deleted
                    }
                };
                Ok(dispatched)
            }
            Err(ControllerError::Cancelled(reason)) => {
                self.metrics.observe("cancelled", started.elapsed());
                Err(ControllerError::Cancelled(reason))
            }
            Err(e) => {
                self.metrics.observe("error", started.elapsed());
                let (delay, attempts) = self.next_backoff(&key);
                error!(
                    "Failed to reconcile {} (attempt {}): {}; retrying in {:?}",
                    key, attempts, e, delay
                );
                self.schedule_retry(event, seq, delay);
                Ok(Dispatched::Failed(delay))
            }
        }
    }

    fn bump_seq(&mut self, key: &str) -> u64 {
        self.next_seq += 1;
        self.seqs.insert(key.to_string(), self.next_seq);
        self.next_seq
    }

    fn next_backoff(&mut self, key: &str) -> (Duration, u32) {
        let (min, max) = (self.retry_min, self.retry_max);
        let state = self
            .backoffs
            .entry(key.to_string())
            .or_insert_with(|| BackoffState {
                backoff: FibonacciBackoff::new(min, max),
                error_count: 0,
            });
        state.error_count = state.error_count.saturating_add(1);
        (state.backoff.next_backoff(), state.error_count)
    }

    fn schedule_retry(&self, event: ResourceEvent, seq: u64, delay: Duration) {
        let Some(requeue) = self.requeue.upgrade() else {
            debug!("Event channel closed; not retrying {}", event.key());
            return;
        };
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if requeue.send(Delivery::Retry { event, seq }).await.is_err() {
                debug!("Event channel closed; dropping retry");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{create_test_ipfs, test_reconciler};
    use cluster_store::{MockResourceStore, StoreError, StoreOperation};

    const FAST: Duration = Duration::from_millis(10);

    fn dispatcher(
        store: &MockResourceStore,
    ) -> (Dispatcher, mpsc::Sender<Delivery>, mpsc::Receiver<Delivery>) {
        let (tx, rx) = mpsc::channel(16);
        let metrics = Arc::new(Metrics::new().unwrap());
        let dispatcher =
            Dispatcher::new(test_reconciler(store), tx.clone(), metrics, FAST, Duration::from_millis(50));
        (dispatcher, tx, rx)
    }

    async fn next_retry(rx: &mut mpsc::Receiver<Delivery>) -> Delivery {
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("retry not scheduled")
            .expect("channel closed")
    }

    #[tokio::test]
    async fn test_failed_pass_is_redelivered_and_then_converges() {
        let store = MockResourceStore::new();
        store.fail_next(StoreOperation::ListPods, StoreError::Api {
            code: 500,
            message: "etcd unavailable".to_string(),
        });
        let (mut dispatcher, _keep, mut rx) = dispatcher(&store);
        let (_tx, mut shutdown) = Shutdown::channel();
        let event = ResourceEvent::upsert(create_test_ipfs("ipfs1", "default", 2, "uid-1"));

        let first = dispatcher.dispatch(Delivery::Fresh(event), &mut shutdown).await.unwrap();
        assert_eq!(first, Dispatched::Failed(FAST));

        let retry = next_retry(&mut rx).await;
        assert!(matches!(retry, Delivery::Retry { .. }));
        let second = dispatcher.dispatch(retry, &mut shutdown).await.unwrap();
        assert!(matches!(second, Dispatched::Reconciled(_)));
    }

    #[tokio::test]
    async fn test_backoff_grows_per_resource_and_resets() {
        let store = MockResourceStore::new();
        for _ in 0..3 {
            store.fail_next(StoreOperation::CreateDeployment, StoreError::Api {
                code: 503,
                message: "unavailable".to_string(),
            });
        }
        let (mut dispatcher, _keep, _rx) = dispatcher(&store);
        let (_tx, mut shutdown) = Shutdown::channel();
        let ipfs = create_test_ipfs("ipfs1", "default", 1, "uid-1");
        let ipfs_again = ipfs.clone();
        let key = ResourceEvent::upsert(ipfs.clone()).key();

        let mut delays = Vec::new();
        for _ in 0..3 {
            let result = dispatcher
                .dispatch(Delivery::Fresh(ResourceEvent::upsert(ipfs.clone())), &mut shutdown)
                .await
                .unwrap();
            if let Dispatched::Failed(delay) = result {
                delays.push(delay);
            }
        }
        assert_eq!(delays, vec![FAST, FAST, FAST * 2]);

        let ok = dispatcher
            .dispatch(Delivery::Fresh(ResourceEvent::upsert(ipfs)), &mut shutdown)
            .await
            .unwrap();
        assert!(matches!(ok, Dispatched::Reconciled(_)));
        assert_eq!(dispatcher.backoffs.get(&key).map(|s| s.error_count), Some(0));

        store.fail_next(StoreOperation::CreateDeployment, StoreError::Api {
            code: 503,
            message: "unavailable".to_string(),
        });
        let again = dispatcher
            .dispatch(Delivery::Fresh(ResourceEvent::upsert(ipfs_again)), &mut shutdown)
            .await
            .unwrap();
        assert_eq!(again, Dispatched::Failed(FAST));
    }

    #[tokio::test]
    async fn test_retry_superseded_by_newer_event_is_dropped() {
        let store = MockResourceStore::new();
        store.fail_next(StoreOperation::CreateDeployment, StoreError::Api {
            code: 500,
            message: "boom".to_string(),
        });
        let (mut dispatcher, _keep, mut rx) = dispatcher(&store);
        let (_tx, mut shutdown) = Shutdown::channel();
        let ipfs = create_test_ipfs("ipfs1", "default", 1, "uid-1");

        dispatcher
            .dispatch(Delivery::Fresh(ResourceEvent::upsert(ipfs.clone())), &mut shutdown)
            .await
            .unwrap();
        dispatcher
            .dispatch(Delivery::Fresh(ResourceEvent::upsert(ipfs)), &mut shutdown)
            .await
            .unwrap();
        store.clear_calls();

        let retry = next_retry(&mut rx).await;
        let result = dispatcher.dispatch(retry, &mut shutdown).await.unwrap();
        assert_eq!(result, Dispatched::Superseded);
        assert!(store.calls().is_empty());
    }

    #[tokio::test]
    async fn test_retry_from_deleted_object_does_not_touch_recreated_one() {
        let store = MockResourceStore::new();
        store.fail_next(StoreOperation::CreateDeployment, StoreError::Api {
            code: 500,
            message: "boom".to_string(),
        });
        let (mut dispatcher, _keep, mut rx) = dispatcher(&store);
        let (_tx, mut shutdown) = Shutdown::channel();
        let old = create_test_ipfs("ipfs1", "default", 5, "uid-old");

        let first = dispatcher
            .dispatch(Delivery::Fresh(ResourceEvent::upsert(old.clone())), &mut shutdown)
            .await
            .unwrap();
        assert!(matches!(first, Dispatched::Failed(_)));
        dispatcher
            .dispatch(Delivery::Fresh(ResourceEvent::deleted(old)), &mut shutdown)
            .await
            .unwrap();
        let recreated = dispatcher
            .dispatch(
                Delivery::Fresh(ResourceEvent::upsert(create_test_ipfs("ipfs1", "default", 1, "uid-new"))),
                &mut shutdown,
            )
            .await
            .unwrap();
        assert!(matches!(recreated, Dispatched::Reconciled(_)));

        let retry = next_retry(&mut rx).await;
        let result = dispatcher.dispatch(retry, &mut shutdown).await.unwrap();

        assert_eq!(result, Dispatched::Superseded);
        let peer = store.deployment("default", "ipfs1-peer").unwrap();
        assert_eq!(crate::builder::replicas_of(&peer), Some(1));
    }

    #[tokio::test]
    async fn test_delete_makes_no_store_calls() {
        let store = MockResourceStore::new();
        let (mut dispatcher, _keep, _rx) = dispatcher(&store);
        let (_tx, mut shutdown) = Shutdown::channel();

        let result = dispatcher
            .dispatch(
                Delivery::Fresh(ResourceEvent::deleted(create_test_ipfs("ipfs1", "default", 1, "uid-1"))),
                &mut shutdown,
            )
            .await
            .unwrap();
        assert_eq!(result, Dispatched::Deleted);
        assert!(store.calls().is_empty());
    }

    #[tokio::test]
    async fn test_shutdown_aborts_in_flight_pass() {
        let store = MockResourceStore::new();
        store.hang_on(StoreOperation::ListPods);
        let (mut dispatcher, _keep, _rx) = dispatcher(&store);
        let (tx, mut shutdown) = Shutdown::channel();
        let event = ResourceEvent::upsert(create_test_ipfs("ipfs1", "default", 1, "uid-1"));

        let trigger = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            let _ = tx.send(true);
            tx
        });

        let result = tokio::time::timeout(
            Duration::from_secs(5),
            dispatcher.dispatch(Delivery::Fresh(event), &mut shutdown),
        )
        .await
        .expect("pass did not abort");
        assert!(matches!(result, Err(ControllerError::Cancelled(_))));
        assert!(shutdown.is_cancelled());

        // Steps before the hung call ran; nothing after it did.
        assert_eq!(store.calls_of(StoreOperation::ListPods).len(), 1);
        assert!(store.calls_of(StoreOperation::UpdateIpfsStatus).is_empty());
        drop(trigger.await);
    }

    #[tokio::test]
    async fn test_run_processes_events_in_order_until_channel_closes() {
        let store = MockResourceStore::new();
        let (tx, rx) = mpsc::channel(16);
        let metrics = Arc::new(Metrics::new().unwrap());
        let dispatcher = Dispatcher::new(test_reconciler(&store), tx.clone(), metrics, FAST, FAST);
        let (_stop, shutdown) = Shutdown::channel();

        tx.send(Delivery::Fresh(ResourceEvent::upsert(create_test_ipfs("a", "default", 1, "uid-a"))))
            .await
            .unwrap();
        tx.send(Delivery::Fresh(ResourceEvent::upsert(create_test_ipfs("b", "default", 1, "uid-b"))))
            .await
            .unwrap();
        drop(tx);

        tokio::time::timeout(Duration::from_secs(5), dispatcher.run(rx, shutdown))
            .await
            .expect("dispatcher did not stop")
            .unwrap();

        let created: Vec<_> = store
            .calls_of(StoreOperation::CreateDeployment)
            .into_iter()
            .filter_map(|call| match call {
                cluster_store::StoreCall::CreateDeployment(dep) => dep.metadata.name,
                _ => None,
            })
            .collect();
        assert_eq!(created, vec!["a-bootstrap", "a-peer", "b-bootstrap", "b-peer"]);
    }
}
