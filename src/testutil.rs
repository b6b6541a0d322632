//! In-memory `ClusterApi` fixture for tests. Hand-written rather than a
//! generated mock so scenario tests can assert on literal before/after
//! cluster state, not just call expectations.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::k8s::types::{
    DeploymentId, DeploymentStatus, NodeCondition, NodeStatus, OwnerChain, PodInfo,
    HOSTNAME_SELECTOR_KEY,
};
use crate::k8s::ClusterApi;

#[derive(Debug, Clone)]
struct DeploymentFixture {
    status: DeploymentStatus,
    /// Node this deployment's template is pinned to, if any.
    pinned_node: Option<String>,
}

#[derive(Default)]
struct State {
    nodes: HashMap<String, NodeStatus>,
    namespaces: HashMap<String, ()>,
    deployments: HashMap<DeploymentId, DeploymentFixture>,
    /// (namespace, label selector) -> pods.
    labeled_pods: HashMap<(String, String), Vec<PodInfo>>,
    pods_by_namespace: HashMap<String, Vec<PodInfo>>,
    owner_chains: HashMap<(String, String), OwnerChain>,
    /// Joined command -> canned stdout, or an error message (falls back
    /// to "{}" stdout if unset).
    exec_responses: HashMap<String, std::result::Result<String, String>>,
    executed_commands: Vec<Vec<String>>,
    denied_access: HashMap<(String, String, String), ()>,
}

pub struct FakeCluster {
    state: Mutex<State>,
}

impl Default for FakeCluster {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeCluster {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
        }
    }

    pub fn seed_node(&self, name: &str, ready: bool, unschedulable: bool) {
        self.state.lock().unwrap().nodes.insert(
            name.to_string(),
            NodeStatus {
                name: name.to_string(),
                ready,
                unschedulable,
                conditions: vec![NodeCondition {
                    condition_type: "Ready".to_string(),
                    status: if ready { "True" } else { "False" }.to_string(),
                    reason: None,
                    message: None,
                }],
            },
        );
    }

    pub fn seed_namespace(&self, name: &str) {
        self.state.lock().unwrap().namespaces.insert(name.to_string(), ());
    }

    #[allow(clippy::too_many_arguments)]
    pub fn seed_deployment(
        &self,
        namespace: &str,
        name: &str,
        desired_replicas: i32,
        ready_replicas: i32,
        available: bool,
        pinned_node: Option<&str>,
    ) {
        let id = DeploymentId::new(namespace, name);
        self.state.lock().unwrap().deployments.insert(
            id.clone(),
            DeploymentFixture {
                status: DeploymentStatus {
                    id,
                    desired_replicas,
                    ready_replicas,
                    available,
                },
                pinned_node: pinned_node.map(|s| s.to_string()),
            },
        );
    }

    pub fn seed_ready_tools_pod(&self, namespace: &str, pod_name: &str) {
        let pod = PodInfo {
            namespace: namespace.to_string(),
            name: pod_name.to_string(),
            node_name: None,
            phase: Some("Running".to_string()),
            ready: true,
            containers: vec!["ceph-tools".to_string()],
            owner_kind: None,
            owner_name: None,
        };
        self.state
            .lock()
            .unwrap()
            .labeled_pods
            .insert((namespace.to_string(), "app=rook-ceph-tools".to_string()), vec![pod]);
    }

    pub fn seed_pods_in_namespace(&self, namespace: &str, pods: Vec<PodInfo>) {
        self.state
            .lock()
            .unwrap()
            .pods_by_namespace
            .insert(namespace.to_string(), pods);
    }

    pub fn seed_owner_chain(&self, namespace: &str, pod: &str, chain: OwnerChain) {
        self.state
            .lock()
            .unwrap()
            .owner_chains
            .insert((namespace.to_string(), pod.to_string()), chain);
    }

    /// Seeds the canned stdout for `command` (e.g. `"ceph status --format json"`).
    pub fn set_exec_response(&self, command: &str, stdout: &str) {
        self.state
            .lock()
            .unwrap()
            .exec_responses
            .insert(command.to_string(), Ok(stdout.to_string()));
    }

    /// Seeds `command` to fail with `message` when executed.
    pub fn set_exec_failure(&self, command: &str, message: &str) {
        self.state
            .lock()
            .unwrap()
            .exec_responses
            .insert(command.to_string(), Err(message.to_string()));
    }

    pub fn deny_access(&self, resource: &str, verb: &str, namespace: &str) {
        self.state.lock().unwrap().denied_access.insert(
            (resource.to_string(), verb.to_string(), namespace.to_string()),
            (),
        );
    }

    pub fn executed_commands(&self) -> Vec<Vec<String>> {
        self.state.lock().unwrap().executed_commands.clone()
    }

    pub fn deployment_status(&self, namespace: &str, name: &str) -> Option<DeploymentStatus> {
        self.state
            .lock()
            .unwrap()
            .deployments
            .get(&DeploymentId::new(namespace, name))
            .map(|f| f.status.clone())
    }

    pub fn node_status(&self, name: &str) -> Option<NodeStatus> {
        self.state.lock().unwrap().nodes.get(name).cloned()
    }
}

#[async_trait]
impl ClusterApi for FakeCluster {
    async fn probe_connectivity(&self) -> Result<()> {
        Ok(())
    }

    async fn cordon_node(&self, name: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let node = state
            .nodes
            .get_mut(name)
            .ok_or_else(|| Error::NotFound(format!("node {}", name)))?;
        node.unschedulable = true;
        Ok(())
    }

    async fn uncordon_node(&self, name: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let node = state
            .nodes
            .get_mut(name)
            .ok_or_else(|| Error::NotFound(format!("node {}", name)))?;
        node.unschedulable = false;
        Ok(())
    }

    async fn get_node_status(&self, name: &str) -> Result<NodeStatus> {
        self.state
            .lock()
            .unwrap()
            .nodes
            .get(name)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("node {}", name)))
    }

    async fn list_nodes(&self) -> Result<Vec<NodeStatus>> {
        Ok(self.state.lock().unwrap().nodes.values().cloned().collect())
    }

    async fn node_exists(&self, name: &str) -> Result<bool> {
        Ok(self.state.lock().unwrap().nodes.contains_key(name))
    }

    async fn namespace_exists(&self, name: &str) -> Result<bool> {
        Ok(self.state.lock().unwrap().namespaces.contains_key(name))
    }

    async fn scale_deployment(&self, id: &DeploymentId, replicas: i32) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let fixture = state
            .deployments
            .get_mut(id)
            .ok_or_else(|| Error::NotFound(format!("deployment {}", id)))?;
        fixture.status.desired_replicas = replicas;
        // Fakes settle instantly: ready replicas track desired so wait
        // primitives observe convergence on the next poll.
        fixture.status.ready_replicas = replicas;
        fixture.status.available = replicas > 0;
        Ok(())
    }

    async fn get_deployment_status(&self, id: &DeploymentId) -> Result<DeploymentStatus> {
        self.state
            .lock()
            .unwrap()
            .deployments
            .get(id)
            .map(|f| f.status.clone())
            .ok_or_else(|| Error::NotFound(format!("deployment {}", id)))
    }

    async fn list_deployments_in_namespace(&self, namespace: &str) -> Result<Vec<DeploymentStatus>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .deployments
            .values()
            .filter(|f| f.status.id.namespace == namespace)
            .map(|f| f.status.clone())
            .collect())
    }

    async fn list_node_pinned_deployments(
        &self,
        namespace: &str,
        node: &str,
    ) -> Result<Vec<DeploymentStatus>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .deployments
            .values()
            .filter(|f| {
                f.status.id.namespace == namespace && f.pinned_node.as_deref() == Some(node)
            })
            .map(|f| f.status.clone())
            .collect())
    }

    async fn list_scaled_down_deployments_for_node(
        &self,
        namespace: &str,
        node: &str,
    ) -> Result<Vec<DeploymentStatus>> {
        Ok(self
            .list_node_pinned_deployments(namespace, node)
            .await?
            .into_iter()
            .filter(|d| d.desired_replicas == 0)
            .collect())
    }

    async fn list_pods_in_namespace(
        &self,
        namespace: &str,
        node_name_filter: Option<&str>,
    ) -> Result<Vec<PodInfo>> {
        let state = self.state.lock().unwrap();
        let pods = state.pods_by_namespace.get(namespace).cloned().unwrap_or_default();
        Ok(match node_name_filter {
            Some(node) => pods
                .into_iter()
                .filter(|p| p.node_name.as_deref() == Some(node))
                .collect(),
            None => pods,
        })
    }

    async fn list_pods_by_label(&self, namespace: &str, label_selector: &str) -> Result<Vec<PodInfo>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .labeled_pods
            .get(&(namespace.to_string(), label_selector.to_string()))
            .cloned()
            .unwrap_or_default())
    }

    async fn get_owner_chain(&self, namespace: &str, pod_name: &str) -> Result<OwnerChain> {
        self.state
            .lock()
            .unwrap()
            .owner_chains
            .get(&(namespace.to_string(), pod_name.to_string()))
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("pod {}/{}", namespace, pod_name)))
    }

    async fn exec_in_pod(
        &self,
        _namespace: &str,
        _pod_name: &str,
        _container: Option<&str>,
        command: &[String],
    ) -> Result<String> {
        let joined = command.join(" ");
        let mut state = self.state.lock().unwrap();
        state.executed_commands.push(command.to_vec());
        match state.exec_responses.get(&joined) {
            Some(Ok(stdout)) => Ok(stdout.clone()),
            Some(Err(message)) => Err(Error::RemoteCommandFailure {
                command: joined,
                stderr: message.clone(),
            }),
            None => Ok("{}".to_string()),
        }
    }

    async fn can_i(&self, resource: &str, verb: &str, namespace: &str) -> Result<bool> {
        let denied = self.state.lock().unwrap().denied_access.contains_key(&(
            resource.to_string(),
            verb.to_string(),
            namespace.to_string(),
        ));
        Ok(!denied)
    }
}

// HOSTNAME_SELECTOR_KEY is part of the fixture's public contract so test
// callers can build pinned-node seeds without importing the constant
// twice.
pub const HOSTNAME_KEY: &str = HOSTNAME_SELECTOR_KEY;
