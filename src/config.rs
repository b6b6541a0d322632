//! The configuration record the CLI layer populates and hands to the
//! orchestrator / observation subsystem. Parsing a config *file* into
//! this record (YAML discovery, precedence resolution) is out of scope;
//! this module owns only the record type, its defaults, and basic
//! validation; the CLI layer populates it via clap and hands it over
//! fully formed.

use serde::{Deserialize, Serialize};

fn is_dns_1123_label(s: &str) -> bool {
    if s.is_empty() || s.len() > 63 {
        return false;
    }
    let bytes = s.as_bytes();
    let alnum = |b: u8| b.is_ascii_lowercase() || b.is_ascii_digit();
    if !alnum(bytes[0]) || !alnum(bytes[bytes.len() - 1]) {
        return false;
    }
    bytes.iter().all(|&b| alnum(b) || b == b'-')
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Timeouts {
    pub api_call_seconds: u64,
    pub wait_deployment_seconds: u64,
    pub ceph_command_seconds: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            api_call_seconds: 30,
            wait_deployment_seconds: 600,
            ceph_command_seconds: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UiRefresh {
    pub progress_refresh_ms: u64,
    pub nodes_ms: u64,
    pub deployments_ms: u64,
    pub pods_ms: u64,
    pub osds_ms: u64,
    pub header_ms: u64,
}

impl Default for UiRefresh {
    fn default() -> Self {
        Self {
            progress_refresh_ms: 500,
            nodes_ms: 5_000,
            deployments_ms: 5_000,
            pods_ms: 5_000,
            osds_ms: 10_000,
            header_ms: 10_000,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
    pub file: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Text,
            file: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaintenanceConfig {
    pub operator_namespace: String,
    pub cluster_namespace: String,
    pub kubeconfig_path: Option<String>,
    pub kube_context: Option<String>,
    pub timeouts: Timeouts,
    pub ui: UiRefresh,
    pub logging: LoggingConfig,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            operator_namespace: "rook-ceph".to_string(),
            cluster_namespace: "rook-ceph".to_string(),
            kubeconfig_path: None,
            kube_context: None,
            timeouts: Timeouts::default(),
            ui: UiRefresh::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Warnings are surfaced (e.g. a sub-100ms UI refresh) without failing
/// validation; only malformed namespaces and zero timeouts are errors.
pub struct Validated {
    pub warnings: Vec<String>,
}

impl MaintenanceConfig {
    pub fn validate(&self) -> Result<Validated, String> {
        if !is_dns_1123_label(&self.operator_namespace) {
            return Err(format!(
                "operator-namespace '{}' is not a valid DNS-1123 label",
                self.operator_namespace
            ));
        }
        if !is_dns_1123_label(&self.cluster_namespace) {
            return Err(format!(
                "cluster-namespace '{}' is not a valid DNS-1123 label",
                self.cluster_namespace
            ));
        }
        if self.timeouts.api_call_seconds < 1
            || self.timeouts.wait_deployment_seconds < 1
            || self.timeouts.ceph_command_seconds < 1
        {
            return Err("timeouts must be >= 1 second".to_string());
        }

        let mut warnings = Vec::new();
        for (name, ms) in [
            ("progress-refresh-ms", self.ui.progress_refresh_ms),
            ("ls-refresh-nodes-ms", self.ui.nodes_ms),
            ("ls-refresh-deployments-ms", self.ui.deployments_ms),
            ("ls-refresh-pods-ms", self.ui.pods_ms),
            ("ls-refresh-osds-ms", self.ui.osds_ms),
            ("ls-refresh-header-ms", self.ui.header_ms),
        ] {
            if ms < 100 {
                warnings.push(format!(
                    "ui.{} = {}ms is below the recommended 100ms floor",
                    name, ms
                ));
            }
        }
        Ok(Validated { warnings })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let cfg = MaintenanceConfig::default();
        let v = cfg.validate().expect("default config should validate");
        assert!(v.warnings.is_empty());
    }

    #[test]
    fn rejects_bad_namespace() {
        let mut cfg = MaintenanceConfig::default();
        cfg.cluster_namespace = "Not_Valid".to_string();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn warns_on_sub_100ms_refresh() {
        let mut cfg = MaintenanceConfig::default();
        cfg.ui.header_ms = 50;
        let v = cfg.validate().unwrap();
        assert_eq!(v.warnings.len(), 1);
    }

    #[test]
    fn rejects_zero_timeout() {
        let mut cfg = MaintenanceConfig::default();
        cfg.timeouts.ceph_command_seconds = 0;
        assert!(cfg.validate().is_err());
    }
}
