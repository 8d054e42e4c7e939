//! Cluster access for the suite bootstrap
//!
//! The gates only see the cluster through [`ClusterApi`], so they can run
//! against a real API server or a mock:
//! - Namespace listing and deletion
//! - Node, pod, daemonset and event listing
//! - The diagnostic canary pod lifecycle

mod client;
mod status;

use std::sync::Arc;

#[cfg(test)]
pub use client::MockClusterApi;
pub use client::{ClusterApi, KubeCluster};
pub use status::{
    is_node_schedulable, is_node_untainted, is_pod_running_ready, pod_phase, DaemonSetGap,
};

/// Shared handle the gates hold on the cluster
pub type SharedCluster = Arc<dyn ClusterApi>;

#[cfg(test)]
pub(crate) use status::fixtures;
