//! Orchestrates safe single-node maintenance of a Rook-Ceph-backed
//! Kubernetes cluster: a down phase that quiesces a node's Ceph
//! workloads without provoking rebalancing, an up phase that restores
//! them in quorum-gated order, and a concurrent observation subsystem
//! that surfaces live cluster state while either phase runs.

pub mod ceph;
pub mod config;
pub mod error;
pub mod format;
pub mod k8s;
pub mod observation;
pub mod orchestrator;
pub mod retry;
pub mod wait;

/// Hand-built `ClusterApi` fixture for tests. Kept as an ordinary public
/// module (not `#[cfg(test)]`-gated) so both this crate's unit tests and
/// external `tests/*.rs` integration tests can build scenarios against
/// it without needing a live apiserver.
pub mod testutil;

pub use error::{Error, Result};
