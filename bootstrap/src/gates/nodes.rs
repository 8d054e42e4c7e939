//! Wait for every node to accept workloads
//!
//! In large clusters nodes can register before their routes exist, which
//! leaves them unschedulable for a while. Tests must not start until all of
//! them have converged, so there is no tolerance here.

use std::time::Duration;

use tracing::{info, instrument};

use crate::cluster::{is_node_schedulable, is_node_untainted, SharedCluster};
use crate::error::BootstrapResult;
use crate::wait::poll_immediate;

pub struct NodeReadinessGate {
    cluster: SharedCluster,
    interval: Duration,
}

impl NodeReadinessGate {
    pub fn new(cluster: SharedCluster, interval: Duration) -> Self {
        Self { cluster, interval }
    }

    #[instrument(skip(self))]
    pub async fn wait_schedulable(&self, timeout: Duration) -> BootstrapResult<()> {
        info!("Waiting up to {:?} for all nodes to be schedulable", timeout);
        poll_immediate("all nodes schedulable", self.interval, timeout, move || {
            self.all_schedulable()
        })
        .await
    }

    async fn all_schedulable(&self) -> BootstrapResult<bool> {
        let nodes = self.cluster.list_nodes().await?;
        if nodes.is_empty() {
            info!("No nodes registered yet");
            return Ok(false);
        }

        let unschedulable: Vec<&str> = nodes
            .iter()
            .filter(|n| !is_node_schedulable(n))
            .filter_map(|n| n.metadata.name.as_deref())
            .collect();

        if unschedulable.is_empty() {
            return Ok(true);
        }

        info!(
            total = nodes.len(),
            unschedulable = unschedulable.len(),
            nodes = ?unschedulable,
            "Nodes not yet schedulable"
        );
        Ok(false)
    }

    /// Nodes that are schedulable and carry no repelling taint
    pub async fn ready_schedulable_count(&self) -> BootstrapResult<usize> {
        let nodes = self.cluster.list_nodes().await?;
        Ok(nodes
            .iter()
            .filter(|n| is_node_schedulable(n) && is_node_untainted(n))
            .count())
    }
}
