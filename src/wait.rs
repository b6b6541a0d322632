//! Poll-until-condition primitives used by the down/up phase state
//! machines. Built on `tokio::time::interval` rather than
//! sleep-in-a-loop so polling cadence doesn't drift with call latency.
//! Every suspension point here observes the caller's cancellation handle
//! and bounds each read under an `api_timeout` sub-deadline, per the
//! orchestrator's overall suspension-point contract.

use std::time::Duration;

use tokio::time::{interval, timeout, Instant};

use crate::error::{Error, Result};
use crate::k8s::types::DeploymentId;
use crate::k8s::ClusterApi;
use crate::retry::CancelSignal;

/// Polls `condition` on `poll_interval` until it returns `true` or
/// `timeout_after` elapses. Each call to `condition`/`describe` is
/// bounded by `api_timeout`; a single slow read does not fail the wait,
/// it simply counts as "not yet met" for that tick. `cancel` is checked
/// before each attempt and each sleep; a cancelled caller short-circuits
/// with a wrapped cancellation error. `what` names the condition for the
/// timeout error message; `last_status` is recomputed from `describe` on
/// timeout so the error carries the final observed state.
pub async fn wait_until<C, Fut, D, DFut>(
    what: &str,
    timeout_after: Duration,
    poll_interval: Duration,
    api_timeout: Duration,
    cancel: &dyn CancelSignal,
    mut condition: C,
    mut describe: D,
) -> Result<()>
where
    C: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<bool>>,
    D: FnMut() -> DFut,
    DFut: std::future::Future<Output = String>,
{
    let deadline = Instant::now() + timeout_after;
    let mut ticker = interval(poll_interval);

    loop {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled(cancel.cause()));
        }

        match timeout(api_timeout, condition()).await {
            Ok(Ok(true)) => return Ok(()),
            Ok(Ok(false)) => {}
            Ok(Err(err)) => return Err(err),
            Err(_) => {} // api_timeout elapsed this tick; treated as not-yet-met
        }

        if cancel.is_cancelled() {
            return Err(Error::Cancelled(cancel.cause()));
        }

        if Instant::now() >= deadline {
            let last_status = match timeout(api_timeout, describe()).await {
                Ok(status) => status,
                Err(_) => "status unavailable: api call timed out".to_string(),
            };
            return Err(Error::Timeout {
                what: what.to_string(),
                last_status,
            });
        }

        ticker.tick().await;
    }
}

/// Waits for a deployment's ready replica count to reach `target`. For
/// scale-down (`target == 0`) this also requires `spec.replicas == 0`,
/// since a deployment whose spec update is still propagating can
/// transiently report zero ready replicas before its spec has caught up.
pub async fn wait_for_deployment_replicas(
    cluster: &dyn ClusterApi,
    id: &DeploymentId,
    target: i32,
    timeout_after: Duration,
    poll_interval: Duration,
    api_timeout: Duration,
    cancel: &dyn CancelSignal,
) -> Result<()> {
    let id_for_condition = id.clone();
    let id_for_describe = id.clone();
    wait_until(
        &format!("deployment {} to reach {} ready replicas", id, target),
        timeout_after,
        poll_interval,
        api_timeout,
        cancel,
        move || {
            let cluster = cluster;
            let id = id_for_condition.clone();
            async move {
                let status = cluster.get_deployment_status(&id).await?;
                let ready_matches = status.ready_replicas == target;
                let desired_matches = target != 0 || status.desired_replicas == 0;
                Ok(ready_matches && desired_matches)
            }
        },
        move || {
            let cluster = cluster;
            let id = id_for_describe.clone();
            async move {
                match cluster.get_deployment_status(&id).await {
                    Ok(status) => format!(
                        "ready={} desired={} available={}",
                        status.ready_replicas, status.desired_replicas, status.available
                    ),
                    Err(err) => format!("status unavailable: {}", err),
                }
            }
        },
    )
    .await
}

/// Waits for a deployment to be fully ready and available at its
/// current desired replica count.
pub async fn wait_for_deployment_ready(
    cluster: &dyn ClusterApi,
    id: &DeploymentId,
    timeout_after: Duration,
    poll_interval: Duration,
    api_timeout: Duration,
    cancel: &dyn CancelSignal,
) -> Result<()> {
    let id_for_condition = id.clone();
    let id_for_describe = id.clone();
    wait_until(
        &format!("deployment {} to become ready", id),
        timeout_after,
        poll_interval,
        api_timeout,
        cancel,
        move || {
            let cluster = cluster;
            let id = id_for_condition.clone();
            async move {
                let status = cluster.get_deployment_status(&id).await?;
                Ok(status.available && status.ready_replicas == status.desired_replicas)
            }
        },
        move || {
            let cluster = cluster;
            let id = id_for_describe.clone();
            async move {
                match cluster.get_deployment_status(&id).await {
                    Ok(status) => format!(
                        "ready={} desired={} available={}",
                        status.ready_replicas, status.desired_replicas, status.available
                    ),
                    Err(err) => format!("status unavailable: {}", err),
                }
            }
        },
    )
    .await
}

/// Waits for the monitor quorum reported by `fetch_quorum` to satisfy
/// `InQuorum > Total/2`. Takes a fetch closure rather than `ClusterApi`
/// directly since quorum comes from the Ceph adapter, not the
/// Kubernetes API. Each fetch is bounded by `api_timeout`.
pub async fn wait_for_monitor_quorum<F, Fut>(
    mut fetch_quorum: F,
    timeout_after: Duration,
    poll_interval: Duration,
    api_timeout: Duration,
    cancel: &dyn CancelSignal,
) -> Result<()>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<crate::ceph::types::MonitorQuorum>>,
{
    let deadline = Instant::now() + timeout_after;
    let mut ticker = interval(poll_interval);
    let mut last_seen: Option<crate::ceph::types::MonitorQuorum> = None;

    loop {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled(cancel.cause()));
        }

        match timeout(api_timeout, fetch_quorum()).await {
            Ok(Ok(quorum)) => {
                let has_quorum = quorum.has_quorum();
                last_seen = Some(quorum);
                if has_quorum {
                    return Ok(());
                }
            }
            Ok(Err(err)) => return Err(err),
            Err(_) => {} // api_timeout elapsed this tick; treated as not-yet-met
        }

        if cancel.is_cancelled() {
            return Err(Error::Cancelled(cancel.cause()));
        }

        if Instant::now() >= deadline {
            let last_status = last_seen
                .map(|q| format!("{}/{} in quorum", q.in_quorum_count, q.total_count))
                .unwrap_or_else(|| "no quorum status observed".to_string());
            return Err(Error::Timeout {
                what: "monitor quorum".to_string(),
                last_status,
            });
        }

        ticker.tick().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ceph::types::MonitorQuorum;
    use crate::retry::NeverCancel;
    use crate::testutil::FakeCluster;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    struct AlwaysCancelled;
    #[async_trait::async_trait]
    impl CancelSignal for AlwaysCancelled {
        fn is_cancelled(&self) -> bool {
            true
        }
    }

    #[tokio::test]
    async fn wait_for_deployment_replicas_succeeds_once_fixture_settles() {
        let fake = FakeCluster::new();
        fake.seed_deployment("rook-ceph", "rook-ceph-osd-0", 1, 1, true, Some("node-a"));
        let id = DeploymentId::new("rook-ceph", "rook-ceph-osd-0");
        fake.scale_deployment(&id, 0).await.unwrap();
        let result = wait_for_deployment_replicas(
            &fake,
            &id,
            0,
            Duration::from_millis(200),
            Duration::from_millis(10),
            Duration::from_millis(50),
            &NeverCancel,
        )
        .await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn wait_for_deployment_replicas_times_out_with_last_status() {
        let fake = FakeCluster::new();
        fake.seed_deployment("rook-ceph", "rook-ceph-osd-0", 3, 3, true, Some("node-a"));
        let id = DeploymentId::new("rook-ceph", "rook-ceph-osd-0");
        let result = wait_for_deployment_replicas(
            &fake,
            &id,
            0,
            Duration::from_millis(30),
            Duration::from_millis(10),
            Duration::from_millis(50),
            &NeverCancel,
        )
        .await;
        match result {
            Err(Error::Timeout { last_status, .. }) => {
                assert!(last_status.contains("ready=3"));
            }
            other => panic!("expected timeout, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn wait_for_deployment_replicas_rejects_zero_ready_with_stale_spec() {
        // spec.replicas is still 3 even though readyReplicas already reports 0
        // (the update hasn't propagated yet) -- this must not read as "scaled down".
        let fake = FakeCluster::new();
        fake.seed_deployment("rook-ceph", "rook-ceph-osd-0", 3, 0, true, Some("node-a"));
        let id = DeploymentId::new("rook-ceph", "rook-ceph-osd-0");
        let result = wait_for_deployment_replicas(
            &fake,
            &id,
            0,
            Duration::from_millis(30),
            Duration::from_millis(10),
            Duration::from_millis(50),
            &NeverCancel,
        )
        .await;
        assert!(matches!(result, Err(Error::Timeout { .. })));
    }

    #[tokio::test]
    async fn wait_is_cancelled_promptly_instead_of_running_out_the_full_timeout() {
        let fake = FakeCluster::new();
        fake.seed_deployment("rook-ceph", "rook-ceph-osd-0", 3, 3, true, Some("node-a"));
        let id = DeploymentId::new("rook-ceph", "rook-ceph-osd-0");
        let result = wait_for_deployment_replicas(
            &fake,
            &id,
            0,
            Duration::from_secs(600),
            Duration::from_millis(10),
            Duration::from_millis(50),
            &AlwaysCancelled,
        )
        .await;
        assert!(matches!(result, Err(Error::Cancelled(_))));
    }

    #[tokio::test]
    async fn wait_for_monitor_quorum_succeeds_when_majority_present() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls2 = calls.clone();
        let result = wait_for_monitor_quorum(
            move || {
                let calls = calls2.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(MonitorQuorum {
                        total_count: 3,
                        in_quorum_count: 2,
                        leader: Some("a".to_string()),
                        quorum_names: vec!["a".to_string(), "b".to_string()],
                        out_of_quorum_names: vec!["c".to_string()],
                        election_epoch: 1,
                    })
                }
            },
            Duration::from_millis(200),
            Duration::from_millis(10),
            Duration::from_millis(50),
            &NeverCancel,
        )
        .await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn wait_for_monitor_quorum_times_out_without_majority() {
        let result = wait_for_monitor_quorum(
            || async {
                Ok(MonitorQuorum {
                    total_count: 3,
                    in_quorum_count: 1,
                    leader: None,
                    quorum_names: vec!["a".to_string()],
                    out_of_quorum_names: vec!["b".to_string(), "c".to_string()],
                    election_epoch: 1,
                })
            },
            Duration::from_millis(30),
            Duration::from_millis(10),
            Duration::from_millis(50),
            &NeverCancel,
        )
        .await;
        assert!(matches!(result, Err(Error::Timeout { .. })));
    }

    #[tokio::test]
    async fn wait_for_monitor_quorum_is_cancelled_promptly() {
        let result = wait_for_monitor_quorum(
            || async {
                Ok(MonitorQuorum {
                    total_count: 3,
                    in_quorum_count: 1,
                    leader: None,
                    quorum_names: vec!["a".to_string()],
                    out_of_quorum_names: vec!["b".to_string(), "c".to_string()],
                    election_epoch: 1,
                })
            },
            Duration::from_secs(600),
            Duration::from_millis(10),
            Duration::from_millis(50),
            &AlwaysCancelled,
        )
        .await;
        assert!(matches!(result, Err(Error::Cancelled(_))));
    }
}
