//! The two maintenance state machines: down phase quiesces a node's
//! Rook-Ceph workloads without provoking rebalancing; up phase restores
//! them in monitor-quorum-gated order.

pub mod deployment_order;
pub mod down;
pub mod preflight;
pub mod up;

use std::time::Duration;

use crate::config::MaintenanceConfig;
use crate::k8s::types::DeploymentId;

pub use down::execute_down_phase;
pub use up::execute_up_phase;

/// Stage labels; `Display` yields the literal kebab-case token emitted
/// in progress events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    PreFlight,
    Cordon,
    Uncordon,
    NoOut,
    UnsetNoOut,
    Operator,
    Discover,
    ScaleDown,
    ScaleUp,
    Quorum,
    Complete,
    Skip,
    Error,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Stage::PreFlight => "pre-flight",
            Stage::Cordon => "cordon",
            Stage::Uncordon => "uncordon",
            Stage::NoOut => "noout",
            Stage::UnsetNoOut => "unset-noout",
            Stage::Operator => "operator",
            Stage::Discover => "discover",
            Stage::ScaleDown => "scale-down",
            Stage::ScaleUp => "scale-up",
            Stage::Quorum => "quorum",
            Stage::Complete => "complete",
            Stage::Skip => "skip",
            Stage::Error => "error",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub stage: Stage,
    pub description: String,
    pub deployment_id: Option<DeploymentId>,
}

impl ProgressEvent {
    pub fn new(stage: Stage, description: impl Into<String>) -> Self {
        Self {
            stage,
            description: description.into(),
            deployment_id: None,
        }
    }

    pub fn for_deployment(stage: Stage, description: impl Into<String>, id: DeploymentId) -> Self {
        Self {
            stage,
            description: description.into(),
            deployment_id: Some(id),
        }
    }
}

/// Callback invoked synchronously at each stage transition. Kept
/// non-blocking by contract: the orchestrator does not own UI state and
/// never awaits inside the callback itself.
pub type ProgressCallback<'a> = &'a (dyn Fn(&ProgressEvent) + Send + Sync);

#[derive(Debug, Clone, Copy)]
pub struct WaitOptions {
    pub poll_interval: Duration,
    pub timeout: Duration,
    pub api_timeout: Duration,
}

impl WaitOptions {
    pub fn from_config(config: &MaintenanceConfig) -> Self {
        Self {
            poll_interval: Duration::from_millis(config.ui.progress_refresh_ms.max(100)),
            timeout: Duration::from_secs(config.timeouts.wait_deployment_seconds),
            api_timeout: Duration::from_secs(config.timeouts.api_call_seconds),
        }
    }
}

/// Options threaded through `ExecuteDownPhase`/`ExecuteUpPhase`.
pub struct PhaseOptions<'a> {
    pub progress: ProgressCallback<'a>,
    pub wait: WaitOptions,
}
