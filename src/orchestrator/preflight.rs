//! Pre-flight validation. Read-only: no check mutates cluster state.
//! Every check runs regardless of earlier failures so a single report
//! surfaces everything wrong at once.

use crate::k8s::types::NodeStatus;
use crate::k8s::ClusterApi;

const REQUIRED_RBAC: &[(&str, &str)] = &[
    ("nodes", "patch"),
    ("deployments", "get"),
    ("deployments", "update"),
    ("pods", "list"),
    ("pods/exec", "create"),
];

#[derive(Debug, Clone)]
pub struct PreflightCheck {
    pub name: String,
    pub passed: bool,
    pub error: Option<String>,
    pub message: String,
}

#[derive(Debug, Clone, Default)]
pub struct PreflightReport {
    pub checks: Vec<PreflightCheck>,
    /// Non-fatal observations, e.g. another node that appears to be
    /// under maintenance concurrently. The system assumes exactly one
    /// node at a time; these never fail the report, only surface the
    /// assumption may be violated.
    pub warnings: Vec<String>,
}

impl PreflightReport {
    pub fn all_passed(&self) -> bool {
        self.checks.iter().all(|c| c.passed)
    }

    pub fn failures(&self) -> Vec<&PreflightCheck> {
        self.checks.iter().filter(|c| !c.passed).collect()
    }
}

fn pass(name: &str, message: &str) -> PreflightCheck {
    PreflightCheck {
        name: name.to_string(),
        passed: true,
        error: None,
        message: message.to_string(),
    }
}

fn fail(name: &str, message: &str) -> PreflightCheck {
    PreflightCheck {
        name: name.to_string(),
        passed: false,
        error: Some(message.to_string()),
        message: message.to_string(),
    }
}

async fn check_node_exists(cluster: &dyn ClusterApi, node: &str) -> PreflightCheck {
    match cluster.node_exists(node).await {
        Ok(true) => pass("node-exists", &format!("node '{}' exists", node)),
        Ok(false) => fail(
            "node-exists",
            &format!("node '{}' does not exist in the cluster", node),
        ),
        Err(err) => fail("node-exists", &format!("could not check node existence: {}", err)),
    }
}

async fn check_namespace_exists(cluster: &dyn ClusterApi, name: &str, namespace: &str) -> PreflightCheck {
    match cluster.namespace_exists(namespace).await {
        Ok(true) => pass(name, &format!("namespace '{}' exists", namespace)),
        Ok(false) => fail(
            name,
            &format!(
                "namespace '{}' does not exist; check the configured namespace",
                namespace
            ),
        ),
        Err(err) => fail(name, &format!("could not check namespace '{}': {}", namespace, err)),
    }
}

async fn check_tools_deployment_ready(cluster: &dyn ClusterApi, cluster_namespace: &str) -> PreflightCheck {
    match cluster
        .list_deployments_in_namespace(cluster_namespace)
        .await
    {
        Ok(deployments) => {
            let tools = deployments
                .iter()
                .find(|d| d.id.name.contains("rook-ceph-tools"));
            match tools {
                Some(d) if d.ready_replicas >= 1 => pass(
                    "tools-deployment-ready",
                    "rook-ceph-tools deployment has at least one ready replica",
                ),
                Some(_) => fail(
                    "tools-deployment-ready",
                    "rook-ceph-tools deployment exists but has no ready replicas; Ceph commands will fail",
                ),
                None => fail(
                    "tools-deployment-ready",
                    &format!(
                        "no rook-ceph-tools deployment found in namespace '{}'",
                        cluster_namespace
                    ),
                ),
            }
        }
        Err(err) => fail(
            "tools-deployment-ready",
            &format!("could not list deployments in '{}': {}", cluster_namespace, err),
        ),
    }
}

async fn check_rbac(cluster: &dyn ClusterApi, namespace: &str) -> Vec<PreflightCheck> {
    let mut checks = Vec::with_capacity(REQUIRED_RBAC.len());
    for (resource, verb) in REQUIRED_RBAC {
        let name = format!("rbac-{}-{}", resource.replace('/', "-"), verb);
        let check = match cluster.can_i(resource, verb, namespace).await {
            Ok(true) => pass(&name, &format!("allowed to {} {}", verb, resource)),
            Ok(false) => fail(&name, &format!("not allowed to {} {}", verb, resource)),
            // A review that itself errors is assumed allowed, best-effort,
            // still surfaced as a passing-but-noted check.
            Err(err) => {
                let mut check = pass(&name, "unable to verify; assuming allowed");
                check.error = Some(err.to_string());
                check
            }
        };
        checks.push(check);
    }
    checks
}

/// Non-fatal: other nodes that are already cordoned look like they may
/// be under maintenance by a separate, concurrent invocation of this
/// same tool. This system assumes exactly one node at a time (spec
/// Non-goals); it does not block on the assumption being violated, only
/// warns so an operator can investigate before proceeding.
fn check_concurrent_maintenance(nodes: &[NodeStatus], target: &str) -> Vec<String> {
    nodes
        .iter()
        .filter(|n| n.name != target && n.unschedulable)
        .map(|n| {
            format!(
                "node '{}' is also cordoned; this tool assumes exactly one node is under maintenance at a time, verify no other maintenance is in progress",
                n.name
            )
        })
        .collect()
}

async fn concurrent_maintenance_warnings(cluster: &dyn ClusterApi, target: &str) -> Vec<String> {
    match cluster.list_nodes().await {
        Ok(nodes) => check_concurrent_maintenance(&nodes, target),
        // Best-effort: an error listing nodes is surfaced by the
        // node-exists check already; this warning pass stays silent.
        Err(_) => Vec::new(),
    }
}

/// Full down-phase pre-flight: connectivity, node existence, namespace
/// existence (operator and cluster), tools deployment readiness, RBAC.
pub async fn run_down_preflight(
    cluster: &dyn ClusterApi,
    operator_namespace: &str,
    cluster_namespace: &str,
    node: &str,
) -> PreflightReport {
    let mut checks = vec![pass("connectivity", "cluster client constructed successfully")];
    checks.push(check_node_exists(cluster, node).await);
    checks.push(check_namespace_exists(cluster, "operator-namespace-exists", operator_namespace).await);
    checks.push(check_namespace_exists(cluster, "cluster-namespace-exists", cluster_namespace).await);
    checks.push(check_tools_deployment_ready(cluster, cluster_namespace).await);
    checks.extend(check_rbac(cluster, operator_namespace).await);
    let warnings = concurrent_maintenance_warnings(cluster, node).await;
    PreflightReport { checks, warnings }
}

/// Up-phase pre-flight: connectivity, node existence, and namespace
/// existence only, no tools-deployment or RBAC checks.
pub async fn run_up_preflight(
    cluster: &dyn ClusterApi,
    operator_namespace: &str,
    cluster_namespace: &str,
    node: &str,
) -> PreflightReport {
    let mut checks = vec![pass("connectivity", "cluster client constructed successfully")];
    checks.push(check_node_exists(cluster, node).await);
    checks.push(check_namespace_exists(cluster, "operator-namespace-exists", operator_namespace).await);
    checks.push(check_namespace_exists(cluster, "cluster-namespace-exists", cluster_namespace).await);
    let warnings = concurrent_maintenance_warnings(cluster, node).await;
    PreflightReport { checks, warnings }
}
