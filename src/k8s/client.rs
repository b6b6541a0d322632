//! Typed operations over a live Kubernetes cluster, hiding REST details.
//! One `Api<T>` accessor per resource family, grouped by concern.
//! Implements `ClusterApi` so orchestrator/wait/retry code is written
//! against the trait, never against `kube::Client` directly.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::{Deployment, ReplicaSet};
use k8s_openapi::api::authorization::v1::{
    ResourceAttributes, SelfSubjectAccessReview, SelfSubjectAccessReviewSpec,
};
use k8s_openapi::api::core::v1::{Namespace, Node, Pod};
use kube::api::{Api, AttachParams, ListParams, Patch, PatchParams, PostParams};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config};

use crate::error::{Error, Result};
use crate::k8s::capability::ClusterApi;
use crate::k8s::types::{
    DeploymentId, DeploymentStatus, NodeCondition, NodeStatus, OwnerChain, PodInfo,
    HOSTNAME_SELECTOR_KEY,
};

/// Finds, among `candidates`, the longest one that is a string prefix of
/// `replicaset_name`. Standard ReplicaSet naming is `<deployment>-<hash>`,
/// but when two deployment names are themselves prefixes of one another
/// (e.g. "rook-ceph-osd" and "rook-ceph-osd-0"), a plain first-`starts_with`
/// scan can pick the wrong, shorter candidate.
pub(crate) fn longest_prefix_match<'a>(
    candidates: impl IntoIterator<Item = &'a str>,
    replicaset_name: &str,
) -> Option<&'a str> {
    candidates
        .into_iter()
        .filter(|c| replicaset_name.starts_with(*c))
        .max_by_key(|c| c.len())
}

pub struct ClusterClient {
    client: Client,
    api_timeout: Duration,
}

impl ClusterClient {
    pub async fn new(
        kubeconfig_path: Option<&str>,
        context: Option<&str>,
        api_timeout: Duration,
    ) -> Result<Self> {
        let config = if let Some(path) = kubeconfig_path {
            let kubeconfig = Kubeconfig::read_from(path).map_err(|e| {
                Error::Validation(format!("failed to read kubeconfig {}: {}", path, e))
            })?;
            let options = KubeConfigOptions {
                context: context.map(|c| c.to_string()),
                ..Default::default()
            };
            Config::from_custom_kubeconfig(kubeconfig, &options)
                .await
                .map_err(|e| Error::Validation(format!("invalid kubeconfig: {}", e)))?
        } else {
            Config::infer()
                .await
                .map_err(|e| Error::Validation(format!("could not infer kube config: {}", e)))?
        };

        let client = Client::try_from(config)?;
        let this = Self {
            client,
            api_timeout,
        };
        this.probe_connectivity().await?;
        Ok(this)
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    fn nodes(&self) -> Api<Node> {
        Api::all(self.client.clone())
    }

    fn deployments(&self, namespace: &str) -> Api<Deployment> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn pods(&self, namespace: &str) -> Api<Pod> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn replicasets(&self, namespace: &str) -> Api<ReplicaSet> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn namespaces(&self) -> Api<Namespace> {
        Api::all(self.client.clone())
    }

    fn access_reviews(&self) -> Api<SelfSubjectAccessReview> {
        Api::all(self.client.clone())
    }
}

fn node_status_from(node: Node) -> NodeStatus {
    let name = node.metadata.name.clone().unwrap_or_default();
    let unschedulable = node
        .spec
        .as_ref()
        .and_then(|s| s.unschedulable)
        .unwrap_or(false);
    let raw_conditions = node
        .status
        .as_ref()
        .and_then(|s| s.conditions.clone())
        .unwrap_or_default();
    let ready = raw_conditions
        .iter()
        .find(|c| c.type_ == "Ready")
        .map(|c| c.status == "True")
        .unwrap_or(false);
    let conditions = raw_conditions
        .into_iter()
        .map(|c| NodeCondition {
            condition_type: c.type_,
            status: c.status,
            reason: c.reason,
            message: c.message,
        })
        .collect();
    NodeStatus {
        name,
        ready,
        unschedulable,
        conditions,
    }
}

fn deployment_status_from(d: &Deployment) -> DeploymentStatus {
    let id = DeploymentId::new(
        d.metadata.namespace.clone().unwrap_or_default(),
        d.metadata.name.clone().unwrap_or_default(),
    );
    // Unset desired replicas is treated as 1.
    let desired_replicas = d.spec.as_ref().and_then(|s| s.replicas).unwrap_or(1);
    let status = d.status.as_ref();
    let ready_replicas = status.and_then(|s| s.ready_replicas).unwrap_or(0);
    let available = status
        .and_then(|s| s.conditions.as_ref())
        .map(|conds| {
            conds
                .iter()
                .any(|c| c.type_ == "Available" && c.status == "True")
        })
        .unwrap_or(false);
    DeploymentStatus {
        id,
        desired_replicas,
        ready_replicas,
        available,
    }
}

fn pod_info_from(p: Pod) -> PodInfo {
    let owner = p
        .metadata
        .owner_references
        .as_ref()
        .and_then(|refs| refs.iter().find(|r| r.controller.unwrap_or(false)));
    let ready = p
        .status
        .as_ref()
        .and_then(|s| s.conditions.as_ref())
        .map(|conds| conds.iter().any(|c| c.type_ == "Ready" && c.status == "True"))
        .unwrap_or(false);
    PodInfo {
        namespace: p.metadata.namespace.clone().unwrap_or_default(),
        name: p.metadata.name.clone().unwrap_or_default(),
        node_name: p.spec.as_ref().and_then(|s| s.node_name.clone()),
        phase: p.status.as_ref().and_then(|s| s.phase.clone()),
        ready,
        containers: p
            .spec
            .as_ref()
            .map(|s| s.containers.iter().map(|c| c.name.clone()).collect())
            .unwrap_or_default(),
        owner_kind: owner.map(|o| o.kind.clone()),
        owner_name: owner.map(|o| o.name.clone()),
    }
}

/// True if `deployment`'s pod template is pinned to `node` via
/// nodeSelector or a required-nodeAffinity `In` match on the hostname
/// key.
fn is_node_pinned(deployment: &Deployment, node: &str) -> bool {
    let Some(spec) = deployment.spec.as_ref() else {
        return false;
    };
    let pod_spec = &spec.template.spec;
    let Some(pod_spec) = pod_spec.as_ref() else {
        return false;
    };

    if let Some(selector) = pod_spec.node_selector.as_ref() {
        if selector.get(HOSTNAME_SELECTOR_KEY).map(|v| v.as_str()) == Some(node) {
            return true;
        }
    }

    if let Some(affinity) = pod_spec.affinity.as_ref() {
        if let Some(node_affinity) = affinity.node_affinity.as_ref() {
            if let Some(required) = node_affinity.required_during_scheduling_ignored_during_execution.as_ref() {
                for term in &required.node_selector_terms {
                    let Some(exprs) = term.match_expressions.as_ref() else {
                        continue;
                    };
                    for expr in exprs {
                        if expr.key == HOSTNAME_SELECTOR_KEY
                            && expr.operator == "In"
                            && expr
                                .values
                                .as_ref()
                                .map(|vs| vs.iter().any(|v| v == node))
                                .unwrap_or(false)
                        {
                            return true;
                        }
                    }
                }
            }
        }
    }

    false
}

#[async_trait]
impl ClusterApi for ClusterClient {
    async fn probe_connectivity(&self) -> Result<()> {
        self.client
            .apiserver_version()
            .await
            .map(|_| ())
            .map_err(|e| {
                Error::Validation(format!("could not reach apiserver: {}", e))
            })
    }

    async fn cordon_node(&self, name: &str) -> Result<()> {
        set_unschedulable(self, name, true).await
    }

    async fn uncordon_node(&self, name: &str) -> Result<()> {
        set_unschedulable(self, name, false).await
    }

    async fn get_node_status(&self, name: &str) -> Result<NodeStatus> {
        let node = self.nodes().get(name).await.map_err(|e| match e {
            kube::Error::Api(resp) if resp.code == 404 => {
                Error::NotFound(format!("node {}", name))
            }
            other => Error::Kube(other),
        })?;
        Ok(node_status_from(node))
    }

    async fn list_nodes(&self) -> Result<Vec<NodeStatus>> {
        let list = self.nodes().list(&ListParams::default()).await?;
        Ok(list.items.into_iter().map(node_status_from).collect())
    }

    async fn node_exists(&self, name: &str) -> Result<bool> {
        match self.nodes().get(name).await {
            Ok(_) => Ok(true),
            Err(kube::Error::Api(resp)) if resp.code == 404 => Ok(false),
            Err(e) => Err(Error::Kube(e)),
        }
    }

    async fn namespace_exists(&self, name: &str) -> Result<bool> {
        match self.namespaces().get(name).await {
            Ok(_) => Ok(true),
            Err(kube::Error::Api(resp)) if resp.code == 404 => Ok(false),
            Err(e) => Err(Error::Kube(e)),
        }
    }

    async fn scale_deployment(&self, id: &DeploymentId, replicas: i32) -> Result<()> {
        let api = self.deployments(&id.namespace);
        let mut d = api.get(&id.name).await.map_err(|e| match e {
            kube::Error::Api(resp) if resp.code == 404 => {
                Error::NotFound(format!("deployment {}", id))
            }
            other => Error::Kube(other),
        })?;
        if let Some(spec) = d.spec.as_mut() {
            spec.replicas = Some(replicas);
        }
        api.replace(&id.name, &PostParams::default(), &d)
            .await
            .map_err(|e| match e {
                kube::Error::Api(resp) if resp.code == 409 => {
                    Error::Conflict(id.to_string())
                }
                other => Error::Kube(other),
            })?;
        Ok(())
    }

    async fn get_deployment_status(&self, id: &DeploymentId) -> Result<DeploymentStatus> {
        let d = self
            .deployments(&id.namespace)
            .get(&id.name)
            .await
            .map_err(|e| match e {
                kube::Error::Api(resp) if resp.code == 404 => {
                    Error::NotFound(format!("deployment {}", id))
                }
                other => Error::Kube(other),
            })?;
        Ok(deployment_status_from(&d))
    }

    async fn list_deployments_in_namespace(&self, namespace: &str) -> Result<Vec<DeploymentStatus>> {
        let list = self
            .deployments(namespace)
            .list(&ListParams::default())
            .await?;
        Ok(list.items.iter().map(deployment_status_from).collect())
    }

    async fn list_node_pinned_deployments(
        &self,
        namespace: &str,
        node: &str,
    ) -> Result<Vec<DeploymentStatus>> {
        let list = self
            .deployments(namespace)
            .list(&ListParams::default())
            .await?;
        Ok(list
            .items
            .iter()
            .filter(|d| is_node_pinned(d, node))
            .map(deployment_status_from)
            .collect())
    }

    async fn list_scaled_down_deployments_for_node(
        &self,
        namespace: &str,
        node: &str,
    ) -> Result<Vec<DeploymentStatus>> {
        let pinned = self.list_node_pinned_deployments(namespace, node).await?;
        Ok(pinned
            .into_iter()
            .filter(|d| d.desired_replicas == 0)
            .collect())
    }

    async fn list_pods_in_namespace(
        &self,
        namespace: &str,
        node_name_filter: Option<&str>,
    ) -> Result<Vec<PodInfo>> {
        let mut params = ListParams::default();
        if let Some(node) = node_name_filter {
            params = params.fields(&format!("spec.nodeName={}", node));
        }
        let list = self.pods(namespace).list(&params).await?;
        Ok(list.items.into_iter().map(pod_info_from).collect())
    }

    async fn list_pods_by_label(
        &self,
        namespace: &str,
        label_selector: &str,
    ) -> Result<Vec<PodInfo>> {
        let params = ListParams::default().labels(label_selector);
        let list = self.pods(namespace).list(&params).await?;
        Ok(list.items.into_iter().map(pod_info_from).collect())
    }

    async fn get_owner_chain(&self, namespace: &str, pod_name: &str) -> Result<OwnerChain> {
        let pod = self.pods(namespace).get(pod_name).await.map_err(|e| match e {
            kube::Error::Api(resp) if resp.code == 404 => {
                Error::NotFound(format!("pod {}/{}", namespace, pod_name))
            }
            other => Error::Kube(other),
        })?;

        let controller_ref = pod
            .metadata
            .owner_references
            .as_ref()
            .and_then(|refs| refs.iter().find(|r| r.controller.unwrap_or(false)));

        let Some(controller_ref) = controller_ref else {
            return Ok(OwnerChain {
                pod: pod_name.to_string(),
                controller: None,
                deployment: None,
            });
        };

        let controller = Some((controller_ref.kind.clone(), controller_ref.name.clone()));

        let deployment = if controller_ref.kind == "ReplicaSet" {
            self.resolve_replicaset_deployment(namespace, &controller_ref.name)
                .await?
        } else {
            None
        };

        Ok(OwnerChain {
            pod: pod_name.to_string(),
            controller,
            deployment,
        })
    }

    async fn exec_in_pod(
        &self,
        namespace: &str,
        pod_name: &str,
        container: Option<&str>,
        command: &[String],
    ) -> Result<String> {
        let pods = self.pods(namespace);
        let pod = pods.get(pod_name).await.map_err(|e| match e {
            kube::Error::Api(resp) if resp.code == 404 => {
                Error::NotFound(format!("pod {}/{}", namespace, pod_name))
            }
            other => Error::Kube(other),
        })?;

        if !pod_running_and_ready(&pod) {
            return Err(Error::Validation(format!(
                "pod {}/{} is not Running & Ready",
                namespace, pod_name
            )));
        }

        let container_name = container.map(|c| c.to_string()).or_else(|| {
            pod.spec
                .as_ref()
                .and_then(|s| s.containers.first())
                .map(|c| c.name.clone())
        });

        let mut attach_params = AttachParams::default().stdout(true).stderr(true);
        if let Some(c) = container_name {
            attach_params = attach_params.container(c);
        }

        let cmd: Vec<&str> = command.iter().map(|s| s.as_str()).collect();
        let mut process = pods
            .exec(pod_name, cmd, &attach_params)
            .await
            .map_err(Error::Kube)?;

        let stdout_fut = futures::future::OptionFuture::from(
            process.stdout().map(read_all_to_string),
        );
        let stderr_fut = futures::future::OptionFuture::from(
            process.stderr().map(read_all_to_string),
        );
        let status_fut = process.take_status();
        let (stdout, stderr) = futures::join!(stdout_fut, stderr_fut);
        let stdout = stdout.unwrap_or_default().unwrap_or_default();
        let stderr = stderr.unwrap_or_default().unwrap_or_default();

        let status = match status_fut {
            Some(fut) => fut.await,
            None => None,
        };
        let succeeded = status
            .as_ref()
            .map(|s| s.status.as_deref() == Some("Success"))
            .unwrap_or(true);

        if !succeeded {
            let reason = status
                .and_then(|s| s.reason)
                .unwrap_or_else(|| "non-zero exit".to_string());
            return Err(Error::RemoteCommandFailure {
                command: command.join(" "),
                stderr: format!("command failed: {}; stderr: {}", reason, stderr),
            });
        }

        Ok(stdout)
    }

    async fn can_i(&self, resource: &str, verb: &str, namespace: &str) -> Result<bool> {
        let review = SelfSubjectAccessReview {
            spec: SelfSubjectAccessReviewSpec {
                resource_attributes: Some(ResourceAttributes {
                    namespace: Some(namespace.to_string()),
                    resource: Some(resource.to_string()),
                    verb: Some(verb.to_string()),
                    ..Default::default()
                }),
                ..Default::default()
            },
            ..Default::default()
        };
        let result = self
            .access_reviews()
            .create(&PostParams::default(), &review)
            .await?;
        Ok(result.status.map(|s| s.allowed).unwrap_or(false))
    }
}

async fn read_all_to_string(
    mut stream: impl tokio::io::AsyncRead + Unpin,
) -> String {
    use tokio::io::AsyncReadExt;
    let mut buf = String::new();
    let _ = stream.read_to_string(&mut buf).await;
    buf
}

fn pod_running_and_ready(pod: &Pod) -> bool {
    let phase_running = pod
        .status
        .as_ref()
        .and_then(|s| s.phase.as_deref())
        .map(|p| p == "Running")
        .unwrap_or(false);
    let ready = pod
        .status
        .as_ref()
        .and_then(|s| s.conditions.as_ref())
        .map(|conds| conds.iter().any(|c| c.type_ == "Ready" && c.status == "True"))
        .unwrap_or(false);
    phase_running && ready
}

async fn set_unschedulable(client: &ClusterClient, name: &str, target: bool) -> Result<()> {
    let api = client.nodes();
    let current = api.get(name).await.map_err(|e| match e {
        kube::Error::Api(resp) if resp.code == 404 => Error::NotFound(format!("node {}", name)),
        other => Error::Kube(other),
    })?;
    let already = current
        .spec
        .as_ref()
        .and_then(|s| s.unschedulable)
        .unwrap_or(false);
    if already == target {
        return Ok(());
    }
    let patch = serde_json::json!({ "spec": { "unschedulable": target } });
    api.patch(name, &PatchParams::default(), &Patch::Strategic(&patch))
        .await?;
    Ok(())
}

impl ClusterClient {
    async fn resolve_replicaset_deployment(
        &self,
        namespace: &str,
        replicaset_name: &str,
    ) -> Result<Option<DeploymentId>> {
        let rs = match self.replicasets(namespace).get(replicaset_name).await {
            Ok(rs) => rs,
            Err(kube::Error::Api(resp)) if resp.code == 404 => return Ok(None),
            Err(e) => return Err(Error::Kube(e)),
        };

        if let Some(owner) = rs
            .metadata
            .owner_references
            .as_ref()
            .and_then(|refs| refs.iter().find(|r| r.controller.unwrap_or(false) && r.kind == "Deployment"))
        {
            return Ok(Some(DeploymentId::new(namespace, owner.name.clone())));
        }

        // Orphaned ReplicaSet (no owner reference): fall back to
        // longest-prefix name matching against deployments in the
        // namespace. See `longest_prefix_match`.
        let deployments = self
            .deployments(namespace)
            .list(&ListParams::default())
            .await?;
        let names: Vec<&str> = deployments
            .items
            .iter()
            .filter_map(|d| d.metadata.name.as_deref())
            .collect();
        Ok(longest_prefix_match(names, replicaset_name)
            .map(|name| DeploymentId::new(namespace, name.to_string())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn longest_prefix_wins_over_shorter_candidate() {
        let candidates = vec!["rook-ceph-osd", "rook-ceph-osd-0"];
        let got = longest_prefix_match(candidates, "rook-ceph-osd-0-7d8f9c6b5d");
        assert_eq!(got, Some("rook-ceph-osd-0"));
    }

    #[test]
    fn no_match_returns_none() {
        let candidates = vec!["rook-ceph-mon"];
        let got = longest_prefix_match(candidates, "rook-ceph-osd-0-7d8f9c6b5d");
        assert_eq!(got, None);
    }
}
