//! Wait for system pods to be running and ready
//!
//! Infrastructure pods that are still pulling or starting can block test
//! pods, so the suite waits for them. Some clusters always have a few pods
//! that never start; `allowed_not_ready` tolerates those.

use std::sync::Arc;
use std::time::Duration;

use k8s_openapi::api::core::v1::Pod;
use tracing::{error, info, instrument};

use crate::cluster::{is_pod_running_ready, pod_phase, SharedCluster};
use crate::diagnostics::Diagnostics;
use crate::error::{BootstrapError, BootstrapResult};
use crate::wait::poll_immediate;

/// Readiness tally of one pod listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PodReadiness {
    /// Pods that count toward readiness (completed pods are skipped)
    pub relevant: usize,
    pub ready: usize,
    pub not_ready: Vec<String>,
}

impl PodReadiness {
    pub fn evaluate(pods: &[Pod]) -> Self {
        let mut relevant = 0;
        let mut ready = 0;
        let mut not_ready = Vec::new();

        for pod in pods {
            // A completed pod will never become ready
            if pod_phase(pod) == "Succeeded" {
                continue;
            }
            relevant += 1;
            if is_pod_running_ready(pod) {
                ready += 1;
            } else {
                not_ready.push(pod.metadata.name.clone().unwrap_or_default());
            }
        }

        Self {
            relevant,
            ready,
            not_ready,
        }
    }

    pub fn not_ready_count(&self) -> usize {
        self.relevant - self.ready
    }

    pub fn passes(&self, min_expected: u32, allowed_not_ready: u32) -> bool {
        self.not_ready_count() <= allowed_not_ready as usize && self.ready >= min_expected as usize
    }
}

pub struct PodReadinessGate {
    cluster: SharedCluster,
    interval: Duration,
    diagnostics: Arc<Diagnostics>,
}

impl PodReadinessGate {
    pub fn new(cluster: SharedCluster, interval: Duration, diagnostics: Arc<Diagnostics>) -> Self {
        Self {
            cluster,
            interval,
            diagnostics,
        }
    }

    /// Block until at most `allowed_not_ready` pods in `namespace` are not
    /// running+ready and at least `min_expected` are.
    ///
    /// On failure the namespace state is dumped and the canary pod is run
    /// before the error is returned.
    #[instrument(skip(self))]
    pub async fn wait_running_ready(
        &self,
        namespace: &str,
        min_expected: u32,
        allowed_not_ready: u32,
        timeout: Duration,
    ) -> BootstrapResult<()> {
        info!(
            "Waiting up to {:?} for all pods (need at least {}) in namespace '{}' to be running and ready",
            timeout, min_expected, namespace
        );

        let result = poll_immediate(
            "pods running and ready",
            self.interval,
            timeout,
            move || self.check(namespace, min_expected, allowed_not_ready),
        )
        .await;

        let Err(e) = result else {
            return Ok(());
        };

        error!(namespace, error = %e, "Pods never became running and ready");
        self.diagnostics.on_pod_gate_failure(namespace).await;
        match e {
            BootstrapError::Timeout { .. } => Err(BootstrapError::PodsNotReady(format!(
                "namespace '{}': {}",
                namespace, e
            ))),
            other => Err(other),
        }
    }

    async fn check(
        &self,
        namespace: &str,
        min_expected: u32,
        allowed_not_ready: u32,
    ) -> BootstrapResult<bool> {
        let pods = self.cluster.list_pods(namespace).await?;
        let readiness = PodReadiness::evaluate(&pods);

        info!(
            ready = readiness.ready,
            relevant = readiness.relevant,
            "{} / {} pods in namespace '{}' are running and ready",
            readiness.ready,
            readiness.relevant,
            namespace
        );
        if !readiness.not_ready.is_empty() {
            info!(pods = ?readiness.not_ready, "Pods not running and ready");
        }

        Ok(readiness.passes(min_expected, allowed_not_ready))
    }
}
