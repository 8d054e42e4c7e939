//! Wait for system daemonsets to roll out
//!
//! Unlike the pod gate this one is advisory: a daemonset that never
//! converges is reported as a warning and the suite carries on.

use std::time::Duration;

use tokio::time::Instant;
use tracing::{info, instrument, warn};

use crate::cluster::{DaemonSetGap, SharedCluster};
use crate::error::BootstrapResult;
use crate::wait::poll_immediate;

/// Outcome of the daemonset wait; never an error
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DaemonSetReadiness {
    Ready,
    Degraded { reason: String },
}

impl DaemonSetReadiness {
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready)
    }
}

/// Names of the daemonsets whose shortfall exceeds the tolerance
pub fn lagging_daemonsets(gaps: &[DaemonSetGap], allowed_not_ready: u32) -> Vec<String> {
    gaps.iter()
        .filter(|g| g.exceeds(allowed_not_ready))
        .map(|g| g.name.clone())
        .collect()
}

pub struct DaemonSetReadinessGate {
    cluster: SharedCluster,
    interval: Duration,
}

impl DaemonSetReadinessGate {
    pub fn new(cluster: SharedCluster, interval: Duration) -> Self {
        Self { cluster, interval }
    }

    #[instrument(skip(self))]
    pub async fn wait_ready(
        &self,
        namespace: &str,
        allowed_not_ready: u32,
        timeout: Duration,
    ) -> DaemonSetReadiness {
        info!(
            "Waiting up to {:?} for all daemonsets in namespace '{}' to start",
            timeout, namespace
        );
        let start = Instant::now();

        let result = poll_immediate("daemonsets ready", self.interval, timeout, move || {
            self.check(namespace, allowed_not_ready, start)
        })
        .await;

        match result {
            Ok(()) => DaemonSetReadiness::Ready,
            Err(e) => {
                warn!(error = %e, "WARNING: Waiting for all daemonsets to be ready failed");
                DaemonSetReadiness::Degraded {
                    reason: e.to_string(),
                }
            }
        }
    }

    async fn check(
        &self,
        namespace: &str,
        allowed_not_ready: u32,
        start: Instant,
    ) -> BootstrapResult<bool> {
        let gaps: Vec<DaemonSetGap> = self
            .cluster
            .list_daemonsets(namespace)
            .await?
            .iter()
            .map(DaemonSetGap::of)
            .collect();

        for g in &gaps {
            info!(
                "{} / {} pods ready in namespace '{}' in daemonset '{}' ({} seconds elapsed)",
                g.ready,
                g.desired,
                namespace,
                g.name,
                start.elapsed().as_secs()
            );
        }

        let lagging = lagging_daemonsets(&gaps, allowed_not_ready);
        if !lagging.is_empty() {
            info!(daemonsets = ?lagging, "There are not ready daemonsets");
            return Ok(false);
        }
        Ok(true)
    }
}
