//! Plain data types returned by `ClusterApi`, independent of `k8s-openapi`
//! wire types so callers (retry, wait, orchestrator) don't need to pull
//! in `k8s_openapi` themselves.

use serde::{Deserialize, Serialize};

pub const HOSTNAME_SELECTOR_KEY: &str = "kubernetes.io/hostname";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeStatus {
    pub name: String,
    pub ready: bool,
    pub unschedulable: bool,
    pub conditions: Vec<NodeCondition>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeCondition {
    #[serde(rename = "type")]
    pub condition_type: String,
    pub status: String,
    pub reason: Option<String>,
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeploymentId {
    pub namespace: String,
    pub name: String,
}

impl DeploymentId {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl std::fmt::Display for DeploymentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentStatus {
    pub id: DeploymentId,
    /// Desired replicas; unset on the Deployment resource is treated as 1.
    pub desired_replicas: i32,
    pub ready_replicas: i32,
    pub available: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PodInfo {
    pub namespace: String,
    pub name: String,
    pub node_name: Option<String>,
    pub phase: Option<String>,
    pub ready: bool,
    pub containers: Vec<String>,
    pub owner_kind: Option<String>,
    pub owner_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OwnerChain {
    pub pod: String,
    /// Intermediate owner (ReplicaSet/StatefulSet/DaemonSet), one hop up from the pod.
    pub controller: Option<(String, String)>,
    /// Owning Deployment, one further hop up from a ReplicaSet controller
    /// only; deeper owner chains are not resolved.
    pub deployment: Option<DeploymentId>,
}
