//! The aggregator-produced tuple of latest observed values across
//! resources. Serialization keys are the stable external schema the
//! view layer and `format::snapshot_to_json/yaml` depend on; do not
//! rename fields casually.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::ceph::types::{CephFlags, ClusterStatus, MonitorQuorum, OsdTreeNode, StorageUsage};
use crate::k8s::types::{DeploymentStatus, NodeStatus, PodInfo};

/// Cluster-wide header: health, quorum, flags, storage in one fetch
/// group, the "cluster header" poller.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ClusterHeader {
    pub status: Option<ClusterStatus>,
    pub quorum: Option<MonitorQuorum>,
    pub flags: Option<CephFlags>,
    pub storage: Option<StorageUsage>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub nodes: Vec<NodeStatus>,
    pub deployments: Vec<DeploymentStatus>,
    pub pods: Vec<PodInfo>,
    pub osds: Vec<OsdTreeNode>,
    pub cluster_health: ClusterHeader,
    pub fetched_at: DateTime<Utc>,
    /// Most recent per-resource error, if any. The snapshot keeps
    /// last-good values; absence of a field never signals error.
    pub error: Option<String>,
}

impl Default for Snapshot {
    fn default() -> Self {
        Self {
            nodes: Vec::new(),
            deployments: Vec::new(),
            pods: Vec::new(),
            osds: Vec::new(),
            cluster_health: ClusterHeader::default(),
            fetched_at: Utc.timestamp_opt(0, 0).single().expect("epoch is representable"),
            error: None,
        }
    }
}
