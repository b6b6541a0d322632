//! The narrow capability surface the core actually consumes from a
//! Kubernetes cluster. Everything above the `kube`/`k8s-openapi` line
//! talks to this trait, never to `kube::Client` directly.
//!
//! Production code implements it via `ClusterClient` (`k8s::client`);
//! tests implement it via `crate::testutil::FakeCluster`, a hand-built
//! in-memory fixture, closer to literal scenario inputs/outputs than
//! a per-call mock expectation would be.

use crate::error::Result;
use crate::k8s::types::{DeploymentId, DeploymentStatus, NodeStatus, OwnerChain, PodInfo};
use async_trait::async_trait;

#[async_trait]
pub trait ClusterApi: Send + Sync {
    /// Hits the discovery server-version endpoint; failure is fatal at
    /// construction time.
    async fn probe_connectivity(&self) -> Result<()>;

    async fn cordon_node(&self, name: &str) -> Result<()>;
    async fn uncordon_node(&self, name: &str) -> Result<()>;
    async fn get_node_status(&self, name: &str) -> Result<NodeStatus>;
    async fn list_nodes(&self) -> Result<Vec<NodeStatus>>;
    async fn node_exists(&self, name: &str) -> Result<bool>;
    async fn namespace_exists(&self, name: &str) -> Result<bool>;

    async fn scale_deployment(&self, id: &DeploymentId, replicas: i32) -> Result<()>;
    async fn get_deployment_status(&self, id: &DeploymentId) -> Result<DeploymentStatus>;
    async fn list_deployments_in_namespace(&self, namespace: &str) -> Result<Vec<DeploymentStatus>>;

    /// Deployments in `namespace` whose pod template is pinned to `node`
    /// via nodeSelector or required nodeAffinity on the hostname key.
    /// Portable deployments are excluded.
    async fn list_node_pinned_deployments(
        &self,
        namespace: &str,
        node: &str,
    ) -> Result<Vec<DeploymentStatus>>;

    /// The subset of `list_node_pinned_deployments` with `spec.replicas == 0`.
    async fn list_scaled_down_deployments_for_node(
        &self,
        namespace: &str,
        node: &str,
    ) -> Result<Vec<DeploymentStatus>>;

    async fn list_pods_in_namespace(
        &self,
        namespace: &str,
        node_name_filter: Option<&str>,
    ) -> Result<Vec<PodInfo>>;

    /// Pods in `namespace` matching `label_selector` (e.g.
    /// `app=rook-ceph-tools`). Used for tools-pod discovery.
    async fn list_pods_by_label(
        &self,
        namespace: &str,
        label_selector: &str,
    ) -> Result<Vec<PodInfo>>;

    /// Walks a pod's controller references one level (Pod -> ReplicaSet /
    /// StatefulSet / DaemonSet), and for a ReplicaSet owner, one further
    /// level to its owning Deployment. Deeper chains are not resolved.
    async fn get_owner_chain(&self, namespace: &str, pod_name: &str) -> Result<OwnerChain>;

    /// Streams combined stdout from an exec into `pod`/`container`
    /// (container defaults to the pod's first container when `None`).
    /// Fails if the pod is not `Running & Ready`.
    async fn exec_in_pod(
        &self,
        namespace: &str,
        pod_name: &str,
        container: Option<&str>,
        command: &[String],
    ) -> Result<String>;

    /// Self-subject-access-review for `(resource, verb)` in `namespace`.
    /// A review that itself errors should be treated as best-effort-allowed
    /// by the caller, not surfaced here as `Err`.
    async fn can_i(&self, resource: &str, verb: &str, namespace: &str) -> Result<bool>;
}
