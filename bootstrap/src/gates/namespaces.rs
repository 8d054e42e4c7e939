//! Clean-start namespace deletion
//!
//! Removes namespaces left behind by earlier runs so the new run starts from
//! an isolated cluster, then waits for the API server to confirm removal.

use std::collections::HashSet;
use std::time::Duration;

use futures::future::join_all;
use k8s_openapi::api::core::v1::Namespace;
use tracing::{info, instrument, warn};

use crate::cluster::SharedCluster;
use crate::error::{BootstrapError, BootstrapResult};
use crate::wait::poll_immediate;

/// Namespaces created by the system; never deleted
pub const PROTECTED_NAMESPACES: [&str; 4] =
    ["kube-system", "default", "kube-public", "kube-node-lease"];

fn is_terminating(ns: &Namespace) -> bool {
    ns.status.as_ref().and_then(|s| s.phase.as_deref()) == Some("Terminating")
}

/// Names from `namespaces` that are not protected
fn deletion_candidates(namespaces: &[Namespace], protected: &[&str]) -> Vec<String> {
    let protected: HashSet<&str> = protected.iter().copied().collect();
    namespaces
        .iter()
        .filter_map(|ns| ns.metadata.name.as_deref())
        .filter(|name| !protected.contains(name))
        .map(str::to_string)
        .collect()
}

pub struct NamespaceReconciler {
    cluster: SharedCluster,
    interval: Duration,
    timeout: Duration,
}

impl NamespaceReconciler {
    pub fn new(cluster: SharedCluster, interval: Duration, timeout: Duration) -> Self {
        Self {
            cluster,
            interval,
            timeout,
        }
    }

    /// Delete every namespace outside `protected` and wait until they are gone.
    ///
    /// Delete calls are best effort; only namespaces that survive the
    /// timeout fail the call. Returns the names that were removed.
    #[instrument(skip_all)]
    pub async fn clean_start(&self, protected: &[&str]) -> BootstrapResult<Vec<String>> {
        let namespaces = self.cluster.list_namespaces().await?;
        let candidates = deletion_candidates(&namespaces, protected);

        // Already terminating namespaces only need to be awaited
        let terminating: HashSet<&str> = namespaces
            .iter()
            .filter(|ns| is_terminating(ns))
            .filter_map(|ns| ns.metadata.name.as_deref())
            .collect();

        let deletes = candidates
            .iter()
            .filter(|name| !terminating.contains(name.as_str()))
            .map(|name| async move { (name, self.cluster.delete_namespace(name).await) });

        for (name, result) in join_all(deletes).await {
            match result {
                Ok(()) => {}
                Err(e) if e.is_not_found() => {}
                Err(e) => warn!(namespace = %name, error = %e, "Failed to delete namespace"),
            }
        }

        info!(namespaces = ?candidates, "Waiting for deletion of namespaces");
        self.wait_deleted(&candidates).await?;

        Ok(candidates)
    }

    /// Block until none of `names` is listed any more
    pub async fn wait_deleted(&self, names: &[String]) -> BootstrapResult<()> {
        if names.is_empty() {
            return Ok(());
        }

        let result = poll_immediate(
            "namespace deletion",
            self.interval,
            self.timeout,
            move || async move { self.survivors(names).await.map(|left| left.is_empty()) },
        )
        .await;

        match result {
            Err(BootstrapError::Timeout { .. }) => {
                let remaining = self
                    .survivors(names)
                    .await
                    .unwrap_or_else(|_| names.to_vec());
                Err(BootstrapError::NamespacesRemain(remaining))
            }
            other => other,
        }
    }

    async fn survivors(&self, names: &[String]) -> BootstrapResult<Vec<String>> {
        let present: HashSet<String> = self
            .cluster
            .list_namespaces()
            .await?
            .into_iter()
            .filter_map(|ns| ns.metadata.name)
            .collect();

        Ok(names
            .iter()
            .filter(|name| present.contains(*name))
            .cloned()
            .collect())
    }
}
