//! Up-phase state machine: restore a node's Rook-Ceph workloads in
//! monitor-quorum-gated order. The node is uncordoned
//! before anything scales up so pods can be placed; monitors restore
//! and reach quorum before OSDs; the operator is restored last so it
//! cannot re-reconcile mid-sequence; noout clears last.

use std::sync::Arc;

use crate::ceph::CephAdapter;
use crate::config::MaintenanceConfig;
use crate::error::Result;
use crate::k8s::ClusterApi;
use crate::orchestrator::deployment_order::{is_monitor_deployment, order_deployments_for_up_remaining};
use crate::orchestrator::down::find_operator_deployment;
use crate::orchestrator::preflight::run_up_preflight;
use crate::orchestrator::{PhaseOptions, ProgressEvent, Stage};
use crate::retry::{with_retry, CancelSignal, RetryPolicy};
use crate::wait::{wait_for_deployment_ready, wait_for_deployment_replicas, wait_for_monitor_quorum};

pub async fn execute_up_phase(
    cluster: Arc<dyn ClusterApi>,
    ceph: &CephAdapter,
    config: &MaintenanceConfig,
    node: &str,
    cancel: &dyn CancelSignal,
    options: &PhaseOptions<'_>,
) -> Result<()> {
    let emit = |event: ProgressEvent| (options.progress)(&event);

    let report = run_up_preflight(
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
        return Err(crate::error::Error::Validation(message));
    }
    for warning in &report.warnings {
        log::warn!("{}", warning);
    }
    emit(ProgressEvent::new(Stage::PreFlight, "pre-flight checks passed"));

    let scaled_down = cluster
        .list_scaled_down_deployments_for_node(&config.cluster_namespace, node)
        .await?;
    emit(ProgressEvent::new(
        Stage::Discover,
        format!("{} previously scaled-down deployment(s) found on '{}'", scaled_down.len(), node),
    ));

    with_retry(RetryPolicy::default(), cancel, || async {
        cluster.uncordon_node(node).await
    })
    .await?;
    emit(ProgressEvent::new(
        Stage::Uncordon,
        format!("node '{}' uncordoned", node),
    ));

    let (monitors, rest): (Vec<_>, Vec<_>) = scaled_down
        .into_iter()
        .partition(|d| is_monitor_deployment(&d.id.name));

    if !monitors.is_empty() {
        for mon in &monitors {
            let id = mon.id.clone();
            with_retry(RetryPolicy::default(), cancel, || async {
                cluster.scale_deployment(&id, 1).await
            })
            .await?;
            wait_for_deployment_replicas(
                cluster.as_ref(),
                &mon.id,
                1,
                options.wait.timeout,
                options.wait.poll_interval,
                options.wait.api_timeout,
                cancel,
            )
            .await?;
            emit(ProgressEvent::for_deployment(
                Stage::ScaleUp,
                format!("{} scaled to 1", mon.id),
                mon.id.clone(),
            ));
        }

        emit(ProgressEvent::new(Stage::Quorum, "waiting for monitor quorum"));
        let cluster_namespace = config.cluster_namespace.clone();
        wait_for_monitor_quorum(
            || {
                let ns = cluster_namespace.clone();
                async move { ceph.get_monitor_status(&ns).await }
            },
            options.wait.timeout,
            options.wait.poll_interval,
            options.wait.api_timeout,
            cancel,
        )
        .await?;
        emit(ProgressEvent::new(Stage::Quorum, "monitor quorum established"));
    }

    for deployment in order_deployments_for_up_remaining(rest) {
        let id = deployment.id.clone();
        with_retry(RetryPolicy::default(), cancel, || async {
            cluster.scale_deployment(&id, 1).await
        })
        .await?;
        wait_for_deployment_ready(
            cluster.as_ref(),
            &deployment.id,
            options.wait.timeout,
            options.wait.poll_interval,
            options.wait.api_timeout,
            cancel,
        )
        .await?;
        emit(ProgressEvent::for_deployment(
            Stage::ScaleUp,
            format!("{} scaled to 1", deployment.id),
            deployment.id.clone(),
        ));
    }

    let operator = find_operator_deployment(cluster.as_ref(), &config.operator_namespace).await?;
    with_retry(RetryPolicy::default(), cancel, || async {
        cluster.scale_deployment(&operator.id, 1).await
    })
    .await?;
    wait_for_deployment_ready(
        cluster.as_ref(),
        &operator.id,
        options.wait.timeout,
        options.wait.poll_interval,
        options.wait.api_timeout,
        cancel,
    )
    .await?;
    emit(ProgressEvent::for_deployment(
        Stage::Operator,
        format!("{} scaled to 1", operator.id),
        operator.id.clone(),
    ));

    with_retry(RetryPolicy::default(), cancel, || async {
        ceph.unset_no_out(&config.cluster_namespace).await
    })
    .await?;
    emit(ProgressEvent::new(Stage::UnsetNoOut, "noout flag cleared"));

    emit(ProgressEvent::new(Stage::Complete, "up phase complete"));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::NeverCancel;
    use crate::testutil::FakeCluster;
    use std::sync::Mutex;
    use std::time::Duration;

    fn wait_opts() -> crate::orchestrator::WaitOptions {
        crate::orchestrator::WaitOptions {
            poll_interval: Duration::from_millis(5),
            timeout: Duration::from_millis(500),
            api_timeout: Duration::from_millis(200),
        }
    }

    #[tokio::test]
    async fn up_phase_with_quorum_wait_orders_mons_before_osds() {
        let fake = Arc::new(FakeCluster::new());
        fake.seed_node("worker-1", true, true);
        fake.seed_namespace("rook-ceph");
        fake.seed_deployment("rook-ceph", "rook-ceph-operator", 0, 0, false, None);
        fake.seed_deployment("rook-ceph", "rook-ceph-mon-a", 0, 0, false, Some("worker-1"));
        fake.seed_deployment("rook-ceph", "rook-ceph-mon-b", 0, 0, false, Some("worker-1"));
        fake.seed_deployment("rook-ceph", "rook-ceph-osd-0", 0, 0, false, Some("worker-1"));
        fake.seed_deployment(
            "rook-ceph",
            "rook-ceph-exporter-worker-1",
            0,
            0,
            false,
            Some("worker-1"),
        );
        fake.seed_ready_tools_pod("rook-ceph", "rook-ceph-tools-abc");
        fake.set_exec_response(
            "ceph quorum_status --format json",
            r#"{"election_epoch":1,"quorum":[0,1],"quorum_names":["a","b"],"monmap":{"mons":[{"rank":0,"name":"a"},{"rank":1,"name":"b"}]}}"#,
        );

        let cluster: Arc<dyn ClusterApi> = fake.clone();
        let ceph = CephAdapter::new(cluster.clone());
        let config = MaintenanceConfig::default();
        let stages = Mutex::new(Vec::new());
        let progress = |event: &ProgressEvent| stages.lock().unwrap().push(event.stage);
        let options = PhaseOptions {
            progress: &progress,
            wait: wait_opts(),
        };

        execute_up_phase(cluster, &ceph, &config, "worker-1", &NeverCancel, &options)
            .await
            .unwrap();

        let observed = stages.into_inner().unwrap();
        let quorum_index = observed.iter().position(|s| *s == Stage::Quorum).unwrap();
        let first_osd_scale_up_index = observed
            .iter()
            .enumerate()
            .filter(|(_, s)| **s == Stage::ScaleUp)
            .nth(2)
            .map(|(i, _)| i)
            .unwrap();
        assert!(quorum_index < first_osd_scale_up_index);
        assert!(!fake.node_status("worker-1").unwrap().unschedulable);
    }

    #[tokio::test]
    async fn empty_discovery_still_restores_operator_and_clears_noout() {
        let fake = Arc::new(FakeCluster::new());
        fake.seed_node("worker-1", true, true);
        fake.seed_namespace("rook-ceph");
        fake.seed_deployment("rook-ceph", "rook-ceph-operator", 0, 0, false, None);
        fake.seed_ready_tools_pod("rook-ceph", "rook-ceph-tools-abc");

        let cluster: Arc<dyn ClusterApi> = fake.clone();
        let ceph = CephAdapter::new(cluster.clone());
        let config = MaintenanceConfig::default();
        let progress = |_: &ProgressEvent| {};
        let options = PhaseOptions {
            progress: &progress,
            wait: wait_opts(),
        };

        execute_up_phase(cluster, &ceph, &config, "worker-1", &NeverCancel, &options)
            .await
            .unwrap();

        assert_eq!(
            fake.deployment_status("rook-ceph", "rook-ceph-operator")
                .unwrap()
                .desired_replicas,
            1
        );
        assert!(!fake.node_status("worker-1").unwrap().unschedulable);
    }
}
