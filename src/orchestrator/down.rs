//! Down-phase state machine: quiesce a node's Rook-Ceph workloads
//! without provoking data rebalancing. Sequential and single-threaded;
//! the only suspension is inside the wait primitives.

use std::sync::Arc;

use crate::ceph::CephAdapter;
use crate::config::MaintenanceConfig;
use crate::error::{Error, Result};
use crate::k8s::types::DeploymentStatus;
use crate::k8s::ClusterApi;
use crate::orchestrator::deployment_order::order_deployments_for_down;
use crate::orchestrator::preflight::run_down_preflight;
use crate::orchestrator::{PhaseOptions, ProgressEvent, Stage};
use crate::retry::{with_retry, CancelSignal, RetryPolicy};
use crate::wait::wait_for_deployment_replicas;

pub(crate) async fn find_operator_deployment(
    cluster: &dyn ClusterApi,
    operator_namespace: &str,
) -> Result<DeploymentStatus> {
    let deployments = cluster.list_deployments_in_namespace(operator_namespace).await?;
    deployments
        .into_iter()
        .find(|d| d.id.name.contains("rook-ceph-operator"))
        .ok_or_else(|| {
            Error::NotFound(format!(
                "no rook-ceph-operator deployment found in namespace '{}'",
                operator_namespace
            ))
        })
}

pub async fn execute_down_phase(
    cluster: Arc<dyn ClusterApi>,
    ceph: &CephAdapter,
    config: &MaintenanceConfig,
    node: &str,
    cancel: &dyn CancelSignal,
    options: &PhaseOptions<'_>,
) -> Result<()> {
    let emit = |event: ProgressEvent| (options.progress)(&event);

    let report = run_down_preflight(
        cluster.as_ref(),
        &config.operator_namespace,
        &config.cluster_namespace,
        node,
    )
    .await;
    if !report.all_passed() {
        let message = report
            .failures()
            .iter()
            .map(|c| format!("{}: {}", c.name, c.message))
            .collect::<Vec<_>>()
            .join("; ");
        emit(ProgressEvent::new(Stage::Error, message.clone()));
        return Err(Error::Validation(message));
    }
    for warning in &report.warnings {
        log::warn!("{}", warning);
    }
    emit(ProgressEvent::new(Stage::PreFlight, "pre-flight checks passed"));

    with_retry(RetryPolicy::default(), cancel, || async {
        cluster.cordon_node(node).await
    })
    .await?;
    emit(ProgressEvent::new(
        Stage::Cordon,
        format!("node '{}' cordoned", node),
    ));

    with_retry(RetryPolicy::default(), cancel, || async {
        ceph.set_no_out(&config.cluster_namespace).await
    })
    .await?;
    emit(ProgressEvent::new(Stage::NoOut, "noout flag set"));

    let operator = find_operator_deployment(cluster.as_ref(), &config.operator_namespace).await?;
    with_retry(RetryPolicy::default(), cancel, || async {
        cluster.scale_deployment(&operator.id, 0).await
    })
    .await?;
    wait_for_deployment_replicas(
        cluster.as_ref(),
        &operator.id,
        0,
        options.wait.timeout,
        options.wait.poll_interval,
        options.wait.api_timeout,
        cancel,
    )
    .await?;
    emit(ProgressEvent::for_deployment(
        Stage::Operator,
        format!("{} scaled to 0", operator.id),
        operator.id.clone(),
    ));

    let pinned = cluster
        .list_node_pinned_deployments(&config.cluster_namespace, node)
        .await?;
    emit(ProgressEvent::new(
        Stage::Discover,
        format!("{} node-pinned deployment(s) found on '{}'", pinned.len(), node),
    ));

    if pinned.is_empty() {
        emit(ProgressEvent::new(Stage::Complete, "nothing to scale down"));
        return Ok(());
    }

    for deployment in order_deployments_for_down(pinned) {
        if deployment.desired_replicas > 1 {
            log::warn!(
                "{}: unexpected replica count; Rook-Ceph node-pinned deployments should have 1 replica",
                deployment.id
            );
        }

        if deployment.desired_replicas == 0 {
            emit(ProgressEvent::for_deployment(
                Stage::Skip,
                format!("{} already scaled to 0", deployment.id),
                deployment.id.clone(),
            ));
            continue;
        }

        let id = deployment.id.clone();
        with_retry(RetryPolicy::default(), cancel, || async {
            cluster.scale_deployment(&id, 0).await
        })
        .await?;
        wait_for_deployment_replicas(
            cluster.as_ref(),
            &deployment.id,
            0,
            options.wait.timeout,
            options.wait.poll_interval,
            options.wait.api_timeout,
            cancel,
        )
        .await?;
        emit(ProgressEvent::for_deployment(
            Stage::ScaleDown,
            format!("{} scaled to 0", deployment.id),
            deployment.id.clone(),
        ));
    }

    emit(ProgressEvent::new(Stage::Complete, "down phase complete"));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MaintenanceConfig;
    use crate::retry::NeverCancel;
    use crate::testutil::FakeCluster;
    use std::sync::Mutex;
    use std::time::Duration;

    fn wait_opts() -> crate::orchestrator::WaitOptions {
        crate::orchestrator::WaitOptions {
            poll_interval: Duration::from_millis(5),
            timeout: Duration::from_millis(200),
            api_timeout: Duration::from_millis(200),
        }
    }

    #[tokio::test]
    async fn happy_path_emits_expected_stage_order() {
        let fake = Arc::new(FakeCluster::new());
        fake.seed_node("worker-1", true, false);
        fake.seed_namespace("rook-ceph");
        fake.seed_deployment("rook-ceph", "rook-ceph-tools", 1, 1, true, None);
        fake.seed_deployment("rook-ceph", "rook-ceph-operator", 1, 1, true, None);
        fake.seed_deployment("rook-ceph", "rook-ceph-osd-0", 1, 1, true, Some("worker-1"));
        fake.seed_deployment("rook-ceph", "rook-ceph-mon-a", 1, 1, true, Some("worker-1"));
        fake.seed_deployment(
            "rook-ceph",
            "rook-ceph-exporter-worker-1",
            1,
            1,
            true,
            Some("worker-1"),
        );
        fake.seed_ready_tools_pod("rook-ceph", "rook-ceph-tools-abc");

        let cluster: Arc<dyn ClusterApi> = fake.clone();
        let ceph = CephAdapter::new(cluster.clone());
        let config = MaintenanceConfig::default();
        let stages = Mutex::new(Vec::new());
        let progress = |event: &ProgressEvent| stages.lock().unwrap().push(event.stage);
        let options = PhaseOptions {
            progress: &progress,
            wait: wait_opts(),
        };

        execute_down_phase(cluster, &ceph, &config, "worker-1", &NeverCancel, &options)
            .await
            .unwrap();

        let observed = stages.into_inner().unwrap();
        assert_eq!(
            observed,
            vec![
                Stage::PreFlight,
                Stage::Cordon,
                Stage::NoOut,
                Stage::Operator,
                Stage::Discover,
                Stage::ScaleDown,
                Stage::ScaleDown,
                Stage::ScaleDown,
                Stage::Complete,
            ]
        );

        assert!(fake.node_status("worker-1").unwrap().unschedulable);
        assert_eq!(
            fake.deployment_status("rook-ceph", "rook-ceph-operator")
                .unwrap()
                .desired_replicas,
            0
        );
        assert_eq!(
            fake.deployment_status("rook-ceph", "rook-ceph-osd-0")
                .unwrap()
                .desired_replicas,
            0
        );
    }

    #[tokio::test]
    async fn empty_discovery_completes_without_scaling_anything() {
        let fake = Arc::new(FakeCluster::new());
        fake.seed_node("worker-1", true, false);
        fake.seed_namespace("rook-ceph");
        fake.seed_deployment("rook-ceph", "rook-ceph-tools", 1, 1, true, None);
        fake.seed_deployment("rook-ceph", "rook-ceph-operator", 1, 1, true, None);
        fake.seed_ready_tools_pod("rook-ceph", "rook-ceph-tools-abc");

        let cluster: Arc<dyn ClusterApi> = fake.clone();
        let ceph = CephAdapter::new(cluster.clone());
        let config = MaintenanceConfig::default();
        let stages = Mutex::new(Vec::new());
        let progress = |event: &ProgressEvent| stages.lock().unwrap().push(event.stage);
        let options = PhaseOptions {
            progress: &progress,
            wait: wait_opts(),
        };

        execute_down_phase(cluster, &ceph, &config, "worker-1", &NeverCancel, &options)
            .await
            .unwrap();

        let observed = stages.into_inner().unwrap();
        assert_eq!(
            observed,
            vec![
                Stage::PreFlight,
                Stage::Cordon,
                Stage::NoOut,
                Stage::Operator,
                Stage::Discover,
                Stage::Complete,
            ]
        );
    }

    #[tokio::test]
    async fn preflight_failure_aborts_before_any_mutation() {
        let fake = Arc::new(FakeCluster::new());
        fake.seed_namespace("rook-ceph");
        fake.seed_deployment("rook-ceph", "rook-ceph-tools", 1, 1, true, None);
        // No node seeded: node-exists check fails.

        let cluster: Arc<dyn ClusterApi> = fake.clone();
        let ceph = CephAdapter::new(cluster.clone());
        let config = MaintenanceConfig::default();
        let progress = |_: &ProgressEvent| {};
        let options = PhaseOptions {
            progress: &progress,
            wait: wait_opts(),
        };

        let result =
            execute_down_phase(cluster, &ceph, &config, "worker-1", &NeverCancel, &options).await;
        assert!(matches!(result, Err(Error::Validation(_))));
    }
}
