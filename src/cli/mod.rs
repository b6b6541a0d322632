//! Command-wiring glue for the `cephmaint` binary. This module only
//! parses arguments into a `cephmaint::config::MaintenanceConfig` and a
//! subcommand; all behaviour lives in the library.

use clap::{Parser, Subcommand};
use cephmaint::config::{LogFormat, LoggingConfig, MaintenanceConfig, Timeouts, UiRefresh};

#[derive(Parser, Debug)]
#[command(name = "cephmaint", about = "Orchestrates safe Rook-Ceph node maintenance", version)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Parser, Debug)]
pub struct GlobalArgs {
    /// Namespace the Rook-Ceph operator deployment lives in.
    #[arg(long, default_value = "rook-ceph", global = true)]
    pub operator_namespace: String,

    /// Namespace the Ceph cluster (tools pod, OSDs, mons) lives in.
    #[arg(long, default_value = "rook-ceph", global = true)]
    pub cluster_namespace: String,

    /// Path to a kubeconfig file; defaults to the standard resolution order.
    #[arg(long, global = true)]
    pub kubeconfig: Option<String>,

    /// kubeconfig context to use.
    #[arg(long, global = true)]
    pub context: Option<String>,

    #[arg(long, default_value_t = 30, global = true)]
    pub api_call_timeout_seconds: u64,

    #[arg(long, default_value_t = 600, global = true)]
    pub wait_deployment_timeout_seconds: u64,

    #[arg(long, default_value_t = 60, global = true)]
    pub ceph_command_timeout_seconds: u64,

    #[arg(long, default_value = "info", global = true)]
    pub log_level: String,

    #[arg(long, value_enum, default_value = "text", global = true)]
    pub log_format: LogFormatArg,

    #[arg(long, global = true)]
    pub log_file: Option<String>,
}

#[derive(clap::ValueEnum, Clone, Debug)]
pub enum LogFormatArg {
    Text,
    Json,
}

impl GlobalArgs {
    pub fn into_config(self) -> MaintenanceConfig {
        MaintenanceConfig {
            operator_namespace: self.operator_namespace,
            cluster_namespace: self.cluster_namespace,
            kubeconfig_path: self.kubeconfig,
            kube_context: self.context,
            timeouts: Timeouts {
                api_call_seconds: self.api_call_timeout_seconds,
                wait_deployment_seconds: self.wait_deployment_timeout_seconds,
                ceph_command_seconds: self.ceph_command_timeout_seconds,
            },
            ui: UiRefresh::default(),
            logging: LoggingConfig {
                level: self.log_level,
                format: match self.log_format {
                    LogFormatArg::Text => LogFormat::Text,
                    LogFormatArg::Json => LogFormat::Json,
                },
                file: self.log_file,
            },
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Quiesce a node's Rook-Ceph workloads (cordon, noout, scale down).
    Down { node: String },
    /// Restore a node's Rook-Ceph workloads (uncordon, scale up, unset noout).
    Up { node: String },
    /// Start the observation subsystem and print snapshots as they arrive.
    Watch {
        #[arg(long, value_enum, default_value = "json")]
        output: WatchOutput,
    },
}

#[derive(clap::ValueEnum, Clone, Debug)]
pub enum WatchOutput {
    Json,
    Yaml,
}
