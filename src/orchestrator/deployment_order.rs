//! Safety-order classification for node-pinned Rook-Ceph deployments.
//! Pure and independently testable: no cluster access, just
//! name-prefix classification with a stable sort.

use crate::k8s::types::DeploymentStatus;

pub const OSD_PREFIX: &str = "rook-ceph-osd";
pub const MON_PREFIX: &str = "rook-ceph-mon";
pub const EXPORTER_PREFIX: &str = "rook-ceph-exporter";
pub const CRASHCOLLECTOR_PREFIX: &str = "rook-ceph-crashcollector";

/// Down-phase safety-order class: OSDs first (least disruptive to
/// quiesce with `noout` set), then monitors, then exporter, then
/// crashcollector, everything else last.
fn down_class(name: &str) -> u8 {
    if name.starts_with(OSD_PREFIX) {
        0
    } else if name.starts_with(MON_PREFIX) {
        1
    } else if name.starts_with(EXPORTER_PREFIX) {
        2
    } else if name.starts_with(CRASHCOLLECTOR_PREFIX) {
        3
    } else {
        4
    }
}

/// Orders deployments for the down phase: `sort_by_key` is stable, so
/// relative order within a class is preserved.
pub fn order_deployments_for_down(mut deployments: Vec<DeploymentStatus>) -> Vec<DeploymentStatus> {
    deployments.sort_by_key(|d| down_class(&d.id.name));
    deployments
}

/// Up-phase ordering for the deployments *remaining* after monitors
/// have already been scaled up and quorum established: OSDs first
/// (need quorum, already have it by this point), then exporter, then
/// crashcollector, then everything else.
fn up_remaining_class(name: &str) -> u8 {
    if name.starts_with(OSD_PREFIX) {
        0
    } else if name.starts_with(EXPORTER_PREFIX) {
        1
    } else if name.starts_with(CRASHCOLLECTOR_PREFIX) {
        2
    } else {
        3
    }
}

/// Orders the non-monitor deployments for the up phase's second stage.
/// Callers must filter out monitor deployments before calling this;
/// they are scaled up and quorum-waited separately.
pub fn order_deployments_for_up_remaining(
    mut deployments: Vec<DeploymentStatus>,
) -> Vec<DeploymentStatus> {
    deployments.sort_by_key(|d| up_remaining_class(&d.id.name));
    deployments
}

pub fn is_monitor_deployment(name: &str) -> bool {
    name.starts_with(MON_PREFIX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::k8s::types::DeploymentId;

    fn mk(ns: &str, name: &str) -> DeploymentStatus {
        DeploymentStatus {
            id: DeploymentId::new(ns, name),
            desired_replicas: 1,
            ready_replicas: 1,
            available: true,
        }
    }

    #[test]
    fn down_order_places_osd_before_mon_before_exporter_before_crashcollector_before_other() {
        let input = vec![
            mk("rook-ceph", "some-other-thing"),
            mk("rook-ceph", "rook-ceph-crashcollector-worker-1"),
            mk("rook-ceph", "rook-ceph-exporter-worker-1"),
            mk("rook-ceph", "rook-ceph-mon-a"),
            mk("rook-ceph", "rook-ceph-osd-0"),
            mk("rook-ceph", "rook-ceph-osd-1"),
        ];
        let ordered = order_deployments_for_down(input);
        let names: Vec<&str> = ordered.iter().map(|d| d.id.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "rook-ceph-osd-0",
                "rook-ceph-osd-1",
                "rook-ceph-mon-a",
                "rook-ceph-exporter-worker-1",
                "rook-ceph-crashcollector-worker-1",
                "some-other-thing",
            ]
        );
    }

    #[test]
    fn down_order_preserves_relative_order_within_class() {
        let input = vec![mk("ns", "rook-ceph-osd-2"), mk("ns", "rook-ceph-osd-1")];
        let ordered = order_deployments_for_down(input);
        let names: Vec<&str> = ordered.iter().map(|d| d.id.name.as_str()).collect();
        assert_eq!(names, vec!["rook-ceph-osd-2", "rook-ceph-osd-1"]);
    }

    #[test]
    fn up_remaining_order_excludes_mon_ordering_concern() {
        let input = vec![
            mk("ns", "some-other-thing"),
            mk("ns", "rook-ceph-crashcollector-a"),
            mk("ns", "rook-ceph-exporter-a"),
            mk("ns", "rook-ceph-osd-0"),
        ];
        let ordered = order_deployments_for_up_remaining(input);
        let names: Vec<&str> = ordered.iter().map(|d| d.id.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "rook-ceph-osd-0",
                "rook-ceph-exporter-a",
                "rook-ceph-crashcollector-a",
                "some-other-thing",
            ]
        );
    }

    #[test]
    fn monitor_prefix_detection() {
        assert!(is_monitor_deployment("rook-ceph-mon-a"));
        assert!(!is_monitor_deployment("rook-ceph-osd-0"));
    }
}
