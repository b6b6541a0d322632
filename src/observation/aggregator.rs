//! Single-task aggregator: receives updates fanned in from all resource
//! pollers, replaces the corresponding snapshot field, and non-blockingly
//! republishes the full snapshot.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{mpsc, RwLock};

use crate::ceph::types::{CephFlags, ClusterStatus, MonitorQuorum, StorageUsage};
use crate::k8s::types::{DeploymentStatus, NodeStatus, PodInfo};
use crate::observation::snapshot::Snapshot;

/// Combined fetch result for the cluster-header poller (health, quorum,
/// flags, storage). These four come from the same tools-pod round trip,
/// so they are fetched and delivered together rather than as four
/// independently-failing sources.
pub struct HeaderFetch {
    pub status: ClusterStatus,
    pub quorum: MonitorQuorum,
    pub flags: CephFlags,
    pub storage: StorageUsage,
}

/// One resource's poll outcome, tagged by source so the aggregator
/// knows which snapshot field to replace. All five pollers funnel into
/// one channel of this type rather than the aggregator `select!`-ing
/// over five differently-typed channels; an equivalent fan-in that's
/// simpler to drive from a single receiver loop.
pub enum ResourceUpdate {
    Nodes(Result<Vec<NodeStatus>, String>),
    Deployments(Result<Vec<DeploymentStatus>, String>),
    Pods(Result<Vec<PodInfo>, String>),
    Osds(Result<Vec<crate::ceph::types::OsdTreeNode>, String>),
    Header(Result<HeaderFetch, String>),
}

fn source_name(update: &ResourceUpdate) -> &'static str {
    match update {
        ResourceUpdate::Nodes(_) => "nodes",
        ResourceUpdate::Deployments(_) => "deployments",
        ResourceUpdate::Pods(_) => "pods",
        ResourceUpdate::Osds(_) => "osds",
        ResourceUpdate::Header(_) => "cluster-header",
    }
}

fn apply(snapshot: &mut Snapshot, update: ResourceUpdate) {
    let source = source_name(&update);
    match update {
        ResourceUpdate::Nodes(Ok(v)) => {
            snapshot.nodes = v;
            snapshot.error = None;
        }
        ResourceUpdate::Deployments(Ok(v)) => {
            snapshot.deployments = v;
            snapshot.error = None;
        }
        ResourceUpdate::Pods(Ok(v)) => {
            snapshot.pods = v;
            snapshot.error = None;
        }
        ResourceUpdate::Osds(Ok(v)) => {
            snapshot.osds = v;
            snapshot.error = None;
        }
        ResourceUpdate::Header(Ok(v)) => {
            snapshot.cluster_health.status = Some(v.status);
            snapshot.cluster_health.quorum = Some(v.quorum);
            snapshot.cluster_health.flags = Some(v.flags);
            snapshot.cluster_health.storage = Some(v.storage);
            snapshot.error = None;
        }
        ResourceUpdate::Nodes(Err(e))
        | ResourceUpdate::Deployments(Err(e))
        | ResourceUpdate::Pods(Err(e))
        | ResourceUpdate::Osds(Err(e))
        | ResourceUpdate::Header(Err(e)) => {
            snapshot.error = Some(format!("{}: {}", source, e));
        }
    }
    snapshot.fetched_at = Utc::now();
}

/// Drains `receiver` until every poller's sender has dropped, replacing
/// fields on `latest` and non-blockingly offering the updated snapshot
/// on `updates`. Exits when the channel closes.
pub async fn run_aggregator(
    mut receiver: mpsc::Receiver<ResourceUpdate>,
    latest: Arc<RwLock<Snapshot>>,
    updates: mpsc::Sender<Snapshot>,
) {
    while let Some(update) = receiver.recv().await {
        let snapshot = {
            let mut guard = latest.write().await;
            apply(&mut guard, update);
            guard.clone()
        };
        let _ = updates.try_send(snapshot);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::k8s::types::NodeStatus;

    fn node(name: &str) -> NodeStatus {
        NodeStatus {
            name: name.to_string(),
            ready: true,
            unschedulable: false,
            conditions: vec![],
        }
    }

    #[tokio::test]
    async fn aggregator_replaces_field_and_republishes_until_channel_closes() {
        let (tx, rx) = mpsc::channel(8);
        let (updates_tx, mut updates_rx) = mpsc::channel(10);
        let latest = Arc::new(RwLock::new(Snapshot::default()));

        let latest_for_task = latest.clone();
        let handle = tokio::spawn(run_aggregator(rx, latest_for_task, updates_tx));

        tx.send(ResourceUpdate::Nodes(Ok(vec![node("worker-1")]))).await.unwrap();
        tx.send(ResourceUpdate::Deployments(Err("boom".to_string()))).await.unwrap();
        drop(tx);
        handle.await.unwrap();

        let snapshot = latest.read().await.clone();
        assert_eq!(snapshot.nodes.len(), 1);
        assert_eq!(snapshot.nodes[0].name, "worker-1");
        assert_eq!(snapshot.error.as_deref(), Some("deployments: boom"));

        let first = updates_rx.try_recv().unwrap();
        assert_eq!(first.nodes.len(), 1);
        let second = updates_rx.try_recv().unwrap();
        assert!(second.error.is_some());
    }
}
