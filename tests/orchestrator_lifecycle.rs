//! Black-box lifecycle test: a node taken down and then brought back up
//! through the public orchestrator API, exercised the way an external
//! caller (the CLI binary) would use it.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use cephmaint::ceph::CephAdapter;
use cephmaint::config::MaintenanceConfig;
use cephmaint::k8s::ClusterApi;
use cephmaint::orchestrator::{execute_down_phase, execute_up_phase, PhaseOptions, ProgressEvent, Stage, WaitOptions};
use cephmaint::retry::NeverCancel;
use cephmaint::testutil::FakeCluster;

fn wait_opts() -> WaitOptions {
    WaitOptions {
        poll_interval: Duration::from_millis(5),
        timeout: Duration::from_millis(500),
        api_timeout: Duration::from_millis(200),
    }
}

fn seed_cluster() -> Arc<FakeCluster> {
    let fake = Arc::new(FakeCluster::new());
    fake.seed_node("worker-1", true, false);
    fake.seed_namespace("rook-ceph");
    fake.seed_deployment("rook-ceph", "rook-ceph-tools", 1, 1, true, None);
    fake.seed_deployment("rook-ceph", "rook-ceph-operator", 1, 1, true, None);
    fake.seed_deployment("rook-ceph", "rook-ceph-osd-0", 1, 1, true, Some("worker-1"));
    fake.seed_deployment("rook-ceph", "rook-ceph-mon-a", 1, 1, true, Some("worker-1"));
    fake.seed_deployment("rook-ceph", "rook-ceph-mon-b", 1, 1, true, Some("worker-1"));
    fake.seed_deployment(
        "rook-ceph",
        "rook-ceph-exporter-worker-1",
        1,
        1,
        true,
        Some("worker-1"),
    );
    fake.seed_ready_tools_pod("rook-ceph", "rook-ceph-tools-abc");
    fake.set_exec_response(
        "ceph quorum_status --format json",
        r#"{"election_epoch":1,"quorum":[0,1],"quorum_names":["a","b"],"monmap":{"mons":[{"rank":0,"name":"a"},{"rank":1,"name":"b"}]}}"#,
    );
    fake
}

#[tokio::test]
async fn node_survives_a_full_down_then_up_round_trip() {
    let fake = seed_cluster();
    let cluster: Arc<dyn ClusterApi> = fake.clone();
    let ceph = CephAdapter::new(cluster.clone());
    let config = MaintenanceConfig::default();
    let progress = |_: &ProgressEvent| {};
    let options = PhaseOptions {
        progress: &progress,
        wait: wait_opts(),
    };

    execute_down_phase(cluster.clone(), &ceph, &config, "worker-1", &NeverCancel, &options)
        .await
        .expect("down phase should succeed");

    assert!(fake.node_status("worker-1").unwrap().unschedulable);
    for name in ["rook-ceph-operator", "rook-ceph-osd-0", "rook-ceph-mon-a", "rook-ceph-mon-b"] {
        assert_eq!(
            fake.deployment_status("rook-ceph", name).unwrap().desired_replicas,
            0,
            "{} should be scaled to 0 after the down phase",
            name
        );
    }

    execute_up_phase(cluster, &ceph, &config, "worker-1", &NeverCancel, &options)
        .await
        .expect("up phase should succeed");

    assert!(!fake.node_status("worker-1").unwrap().unschedulable);
    for name in [
        "rook-ceph-operator",
        "rook-ceph-osd-0",
        "rook-ceph-mon-a",
        "rook-ceph-mon-b",
        "rook-ceph-exporter-worker-1",
    ] {
        assert_eq!(
            fake.deployment_status("rook-ceph", name).unwrap().desired_replicas,
            1,
            "{} should be restored to 1 after the up phase",
            name
        );
    }
}

#[tokio::test]
async fn down_phase_reports_a_terminal_error_event_on_preflight_failure() {
    // No node seeded: the node-exists pre-flight check fails before any mutation runs.
    let fake = Arc::new(FakeCluster::new());
    fake.seed_namespace("rook-ceph");
    fake.seed_deployment("rook-ceph", "rook-ceph-tools", 1, 1, true, None);
    fake.seed_ready_tools_pod("rook-ceph", "rook-ceph-tools-abc");

    let cluster: Arc<dyn ClusterApi> = fake;
    let ceph = CephAdapter::new(cluster.clone());
    let config = MaintenanceConfig::default();
    let events: Mutex<Vec<ProgressEvent>> = Mutex::new(Vec::new());
    let progress = |event: &ProgressEvent| events.lock().unwrap().push(event.clone());
    let options = PhaseOptions {
        progress: &progress,
        wait: wait_opts(),
    };

    let result = execute_down_phase(cluster, &ceph, &config, "worker-1", &NeverCancel, &options).await;

    assert!(result.is_err());
    let observed = events.into_inner().unwrap();
    assert_eq!(observed.len(), 1);
    assert_eq!(observed[0].stage, Stage::Error);
}
