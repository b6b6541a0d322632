//! The observation subsystem: five independent tickered pollers feeding
//! a single aggregator task, publishing snapshots to an interactive
//! view layer without blocking. Owns one parent cancellation handle;
//! the latest-snapshot cell is shared under a read/write lock.

pub mod aggregator;
pub mod poller;
pub mod snapshot;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;

use crate::ceph::CephAdapter;
use crate::config::UiRefresh;
use crate::k8s::ClusterApi;
use crate::observation::aggregator::{run_aggregator, HeaderFetch, ResourceUpdate};
use crate::observation::poller::{fetch_suppressing_cancel, run_poller};
use crate::observation::snapshot::Snapshot;

/// Outbound channel capacity for the published `updates` stream.
const UPDATES_CHANNEL_CAPACITY: usize = 10;
/// Fan-in channel capacity feeding the aggregator from the five pollers.
const FAN_IN_CHANNEL_CAPACITY: usize = 32;

pub struct ObservationSubsystem {
    cancel: Arc<AtomicBool>,
    latest: Arc<RwLock<Snapshot>>,
    updates: Mutex<Option<mpsc::Receiver<Snapshot>>>,
    handles: Mutex<Vec<JoinHandle<()>>>,
    stopped: AtomicBool,
}

impl ObservationSubsystem {
    /// Spawns the five pollers and the aggregator, returning a handle
    /// the caller uses to read snapshots and eventually stop the
    /// subsystem. `cluster_namespace` scopes both the Kubernetes and
    /// Ceph-adapter calls the pollers issue.
    pub fn start(
        cluster: Arc<dyn ClusterApi>,
        ceph: Arc<CephAdapter>,
        cluster_namespace: String,
        refresh: UiRefresh,
    ) -> Self {
        let cancel = Arc::new(AtomicBool::new(false));
        let latest = Arc::new(RwLock::new(Snapshot::default()));
        let (fan_in_tx, fan_in_rx) = mpsc::channel(FAN_IN_CHANNEL_CAPACITY);
        let (updates_tx, updates_rx) = mpsc::channel(UPDATES_CHANNEL_CAPACITY);

        let mut handles = Vec::with_capacity(6);

        {
            let cluster = cluster.clone();
            let sender = fan_in_tx.clone();
            let cancel = cancel.clone();
            handles.push(tokio::spawn(run_poller(
                Duration::from_millis(refresh.nodes_ms),
                cancel,
                sender,
                move || {
                    let cluster = cluster.clone();
                    async move {
                        match fetch_suppressing_cancel(cluster.list_nodes()).await {
                            Ok(Some(v)) => Some(ResourceUpdate::Nodes(Ok(v))),
                            Ok(None) => None,
                            Err(e) => Some(ResourceUpdate::Nodes(Err(e))),
                        }
                    }
                },
            )));
        }

        {
            let cluster = cluster.clone();
            let namespace = cluster_namespace.clone();
            let sender = fan_in_tx.clone();
            let cancel = cancel.clone();
            handles.push(tokio::spawn(run_poller(
                Duration::from_millis(refresh.deployments_ms),
                cancel,
                sender,
                move || {
                    let cluster = cluster.clone();
                    let namespace = namespace.clone();
                    async move {
                        match fetch_suppressing_cancel(
                            cluster.list_deployments_in_namespace(&namespace),
                        )
                        .await
                        {
                            Ok(Some(v)) => Some(ResourceUpdate::Deployments(Ok(v))),
                            Ok(None) => None,
                            Err(e) => Some(ResourceUpdate::Deployments(Err(e))),
                        }
                    }
                },
            )));
        }

        {
            let cluster = cluster.clone();
            let namespace = cluster_namespace.clone();
            let sender = fan_in_tx.clone();
            let cancel = cancel.clone();
            handles.push(tokio::spawn(run_poller(
                Duration::from_millis(refresh.pods_ms),
                cancel,
                sender,
                move || {
                    let cluster = cluster.clone();
                    let namespace = namespace.clone();
                    async move {
                        match fetch_suppressing_cancel(
                            cluster.list_pods_in_namespace(&namespace, None),
                        )
                        .await
                        {
                            Ok(Some(v)) => Some(ResourceUpdate::Pods(Ok(v))),
                            Ok(None) => None,
                            Err(e) => Some(ResourceUpdate::Pods(Err(e))),
                        }
                    }
                },
            )));
        }

        {
            let ceph = ceph.clone();
            let namespace = cluster_namespace.clone();
            let sender = fan_in_tx.clone();
            let cancel = cancel.clone();
            handles.push(tokio::spawn(run_poller(
                Duration::from_millis(refresh.osds_ms),
                cancel,
                sender,
                move || {
                    let ceph = ceph.clone();
                    let namespace = namespace.clone();
                    async move {
                        match fetch_suppressing_cancel(ceph.get_osd_tree(&namespace)).await {
                            Ok(Some(v)) => Some(ResourceUpdate::Osds(Ok(v.nodes))),
                            Ok(None) => None,
                            Err(e) => Some(ResourceUpdate::Osds(Err(e))),
                        }
                    }
                },
            )));
        }

        {
            let ceph = ceph.clone();
            let namespace = cluster_namespace.clone();
            let sender = fan_in_tx.clone();
            let cancel = cancel.clone();
            handles.push(tokio::spawn(run_poller(
                Duration::from_millis(refresh.header_ms),
                cancel,
                sender,
                move || {
                    let ceph = ceph.clone();
                    let namespace = namespace.clone();
                    async move { Some(fetch_header(&ceph, &namespace).await) }
                },
            )));
        }

        drop(fan_in_tx);

        let aggregator_latest = latest.clone();
        handles.push(tokio::spawn(run_aggregator(
            fan_in_rx,
            aggregator_latest,
            updates_tx,
        )));

        Self {
            cancel,
            latest,
            updates: Mutex::new(Some(updates_rx)),
            handles: Mutex::new(handles),
            stopped: AtomicBool::new(false),
        }
    }

    /// A shallow copy of the most recently aggregated snapshot.
    pub async fn get_latest(&self) -> Snapshot {
        self.latest.read().await.clone()
    }

    /// Takes ownership of the outbound updates receiver. Returns `None`
    /// if already taken; there is only ever one consumer.
    pub fn take_updates(&self) -> Option<mpsc::Receiver<Snapshot>> {
        self.updates.lock().unwrap().take()
    }

    /// Cancels the parent handle and waits for every poller and the
    /// aggregator to exit, closing the outbound channel. Idempotent:
    /// subsequent calls are no-ops.
    pub async fn stop(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        self.cancel.store(true, Ordering::SeqCst);
        let handles = std::mem::take(&mut *self.handles.lock().unwrap());
        for handle in handles {
            let _ = handle.await;
        }
        self.updates.lock().unwrap().take();
    }
}

async fn fetch_header(ceph: &CephAdapter, namespace: &str) -> ResourceUpdate {
    let status = ceph.get_ceph_status(namespace).await;
    let quorum = ceph.get_monitor_status(namespace).await;
    let flags = ceph.get_ceph_flags(namespace).await;
    let storage = ceph.get_storage_usage(namespace).await;

    match (status, quorum, flags, storage) {
        (Ok(status), Ok(quorum), Ok(flags), Ok(storage)) => ResourceUpdate::Header(Ok(HeaderFetch {
            status,
            quorum,
            flags,
            storage,
        })),
        (Err(crate::error::Error::Cancelled(_)), _, _, _)
        | (_, Err(crate::error::Error::Cancelled(_)), _, _)
        | (_, _, Err(crate::error::Error::Cancelled(_)), _)
        | (_, _, _, Err(crate::error::Error::Cancelled(_))) => {
            ResourceUpdate::Header(Err("cancelled".to_string()))
        }
        (status, quorum, flags, storage) => {
            let mut errors = Vec::new();
            if let Err(e) = status {
                errors.push(format!("status: {}", e));
            }
            if let Err(e) = quorum {
                errors.push(format!("quorum: {}", e));
            }
            if let Err(e) = flags {
                errors.push(format!("flags: {}", e));
            }
            if let Err(e) = storage {
                errors.push(format!("storage: {}", e));
            }
            ResourceUpdate::Header(Err(errors.join("; ")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::FakeCluster;
    use tokio::time::{sleep, Duration as StdDuration};

    fn fast_refresh() -> UiRefresh {
        UiRefresh {
            progress_refresh_ms: 10,
            nodes_ms: 10,
            deployments_ms: 10,
            pods_ms: 10,
            osds_ms: 10,
            header_ms: 10,
        }
    }

    #[tokio::test]
    async fn publishes_a_snapshot_reflecting_seeded_nodes() {
        let fake = Arc::new(FakeCluster::new());
        fake.seed_node("worker-1", true, false);
        fake.seed_ready_tools_pod("rook-ceph", "rook-ceph-tools-abc");
        let cluster: Arc<dyn ClusterApi> = fake.clone();
        let ceph = Arc::new(CephAdapter::new(cluster.clone()));

        let subsystem = ObservationSubsystem::start(cluster, ceph, "rook-ceph".to_string(), fast_refresh());
        sleep(StdDuration::from_millis(50)).await;

        let snapshot = subsystem.get_latest().await;
        assert_eq!(snapshot.nodes.len(), 1);
        assert_eq!(snapshot.nodes[0].name, "worker-1");

        subsystem.stop().await;
    }

    #[tokio::test]
    async fn stop_is_idempotent() {
        let fake = Arc::new(FakeCluster::new());
        let cluster: Arc<dyn ClusterApi> = fake.clone();
        let ceph = Arc::new(CephAdapter::new(cluster.clone()));
        let subsystem = ObservationSubsystem::start(cluster, ceph, "rook-ceph".to_string(), fast_refresh());
        subsystem.stop().await;
        subsystem.stop().await;
    }
}
