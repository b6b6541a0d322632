//! Invokes Ceph commands via an in-cluster tools pod and decodes their
//! JSON output into the typed views in `ceph::types`. Stateless: the
//! caller supplies the cluster namespace on every call.

use std::sync::Arc;

use crate::ceph::types::{
    CephFlags, CephStatusJson, ClusterStatus, DfJson, MonitorQuorum, OsdTree, OsdTreeJson,
    QuorumStatusJson, StorageUsage,
};
use crate::error::{Error, Result};
use crate::k8s::ClusterApi;

const TOOLS_POD_LABEL: &str = "app=rook-ceph-tools";

pub struct CephAdapter {
    cluster: Arc<dyn ClusterApi>,
}

impl CephAdapter {
    pub fn new(cluster: Arc<dyn ClusterApi>) -> Self {
        Self { cluster }
    }

    /// Finds a ready `rook-ceph-tools` pod in `namespace`. Absence is an
    /// actionable error naming the namespace.
    async fn find_tools_pod(&self, namespace: &str) -> Result<String> {
        let pods = self
            .cluster
            .list_pods_by_label(namespace, TOOLS_POD_LABEL)
            .await?;
        pods.into_iter()
            .find(|p| p.phase.as_deref() == Some("Running") && p.ready)
            .map(|p| p.name)
            .ok_or_else(|| {
                Error::NotFound(format!(
                    "no ready rook-ceph-tools pod found in namespace '{}'; is Rook-Ceph deployed there?",
                    namespace
                ))
            })
    }

    async fn run(&self, namespace: &str, args: &[&str]) -> Result<String> {
        let pod = self.find_tools_pod(namespace).await?;
        let command: Vec<String> = args.iter().map(|s| s.to_string()).collect();
        self.cluster
            .exec_in_pod(namespace, &pod, None, &command)
            .await
    }

    fn decode<T: serde::de::DeserializeOwned>(command: &str, raw: &str) -> Result<T> {
        serde_json::from_str(raw).map_err(|source| Error::Decode {
            command: command.to_string(),
            source,
        })
    }

    pub async fn get_ceph_status(&self, namespace: &str) -> Result<ClusterStatus> {
        let raw = self.run(namespace, &["ceph", "status", "--format", "json"]).await?;
        let decoded: CephStatusJson = Self::decode("ceph status --format json", &raw)?;
        Ok(decoded.into())
    }

    pub async fn get_osd_tree(&self, namespace: &str) -> Result<OsdTree> {
        let raw = self
            .run(namespace, &["ceph", "osd", "tree", "--format", "json"])
            .await?;
        let decoded: OsdTreeJson = Self::decode("ceph osd tree --format json", &raw)?;
        Ok(decoded.into())
    }

    pub async fn get_ceph_flags(&self, namespace: &str) -> Result<CephFlags> {
        let raw = self
            .run(namespace, &["ceph", "osd", "dump", "--format", "json"])
            .await?;
        let value: serde_json::Value =
            Self::decode::<serde_json::Value>("ceph osd dump --format json", &raw)?;
        let flags_field = value
            .get("flags")
            .and_then(|v| v.as_str())
            .unwrap_or("");
        Ok(CephFlags::parse(flags_field))
    }

    pub async fn get_monitor_status(&self, namespace: &str) -> Result<MonitorQuorum> {
        let raw = self
            .run(namespace, &["ceph", "quorum_status", "--format", "json"])
            .await?;
        let decoded: QuorumStatusJson = Self::decode("ceph quorum_status --format json", &raw)?;
        Ok(decoded.into())
    }

    pub async fn get_storage_usage(&self, namespace: &str) -> Result<StorageUsage> {
        let raw = self.run(namespace, &["ceph", "df", "--format", "json"]).await?;
        let decoded: DfJson = Self::decode("ceph df --format json", &raw)?;
        Ok(decoded.into())
    }

    /// Idempotent: the underlying `ceph osd set noout` command is itself
    /// idempotent.
    pub async fn set_no_out(&self, namespace: &str) -> Result<()> {
        self.run(namespace, &["ceph", "osd", "set", "noout"]).await?;
        Ok(())
    }

    pub async fn unset_no_out(&self, namespace: &str) -> Result<()> {
        self.run(namespace, &["ceph", "osd", "unset", "noout"]).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::FakeCluster;

    #[tokio::test]
    async fn tools_pod_not_found_is_actionable() {
        let fake = Arc::new(FakeCluster::new());
        let adapter = CephAdapter::new(fake);
        let err = adapter.get_ceph_status("rook-ceph").await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
        assert!(err.to_string().contains("rook-ceph"));
    }

    #[tokio::test]
    async fn set_no_out_runs_expected_command() {
        let fake = Arc::new(FakeCluster::new());
        fake.seed_ready_tools_pod("rook-ceph", "rook-ceph-tools-abc");
        let adapter = CephAdapter::new(fake.clone());
        adapter.set_no_out("rook-ceph").await.unwrap();
        let commands = fake.executed_commands();
        assert_eq!(
            commands.last().map(|c| c.join(" ")),
            Some("ceph osd set noout".to_string())
        );
    }
}
