//! Pluggable node failure policies

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use tracing::info;

use crate::cluster::SharedCluster;
use crate::error::BootstrapResult;

/// How a chosen node is made to fail
#[cfg_attr(test, automock)]
#[async_trait]
pub trait FailurePolicy: Send + Sync {
    async fn fail_node(&self, node: &str) -> BootstrapResult<()>;
}

/// Removes the Node object so the cluster has to cope with its loss
pub struct NodeDeletionPolicy {
    cluster: SharedCluster,
}

impl NodeDeletionPolicy {
    pub fn new(cluster: SharedCluster) -> Self {
        Self { cluster }
    }
}

#[async_trait]
impl FailurePolicy for NodeDeletionPolicy {
    async fn fail_node(&self, node: &str) -> BootstrapResult<()> {
        info!(node, "Chaos: deleting node");
        self.cluster.delete_node(node).await
    }
}
