//! Post-mortem diagnostics for a failed pod readiness gate
//!
//! Everything here is best effort: failures are logged and swallowed so the
//! gate's own error is what the caller sees.

use std::time::Duration;

use k8s_openapi::api::core::v1::{Event, Pod};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::cluster::{is_node_schedulable, is_pod_running_ready, pod_phase, SharedCluster};
use crate::error::{BootstrapError, BootstrapResult};
use crate::wait::poll_immediate;

/// Manifest of the pod that probes the API server from inside the cluster
const CANARY_MANIFEST: &str = include_str!("../manifests/clusterapi-tester.yaml");

/// Namespace the canary runs in
pub const CANARY_NAMESPACE: &str = "default";

/// Lines kept from each failed container's log
const FAILED_CONTAINER_LOG_LINES: usize = 50;

/// Build the canary pod with a name unique to this run
pub fn canary_pod(run_id: Uuid) -> BootstrapResult<Pod> {
    let mut pod: Pod = serde_yaml::from_str(CANARY_MANIFEST)?;
    let base = pod
        .metadata
        .name
        .clone()
        .unwrap_or_else(|| "clusterapi-tester".to_string());
    let short_id = &run_id.simple().to_string()[..8];
    pod.metadata.name = Some(format!("{}-{}", base, short_id));
    Ok(pod)
}

fn event_time(event: &Event) -> Option<chrono::DateTime<chrono::Utc>> {
    event
        .last_timestamp
        .as_ref()
        .map(|t| t.0)
        .or_else(|| event.event_time.as_ref().map(|t| t.0))
        .or_else(|| event.first_timestamp.as_ref().map(|t| t.0))
}

fn tail(logs: &str, lines: usize) -> String {
    let all: Vec<&str> = logs.lines().collect();
    all[all.len().saturating_sub(lines)..].join("\n")
}

pub struct Diagnostics {
    cluster: SharedCluster,
    run_id: Uuid,
    poll_interval: Duration,
    canary_timeout: Duration,
}

impl Diagnostics {
    pub fn new(
        cluster: SharedCluster,
        run_id: Uuid,
        poll_interval: Duration,
        canary_timeout: Duration,
    ) -> Self {
        Self {
            cluster,
            run_id,
            poll_interval,
            canary_timeout,
        }
    }

    /// Run every diagnostic for a namespace whose pods never became ready
    pub async fn on_pod_gate_failure(&self, namespace: &str) {
        self.dump_namespace(namespace).await;
        self.log_failed_containers(namespace).await;
        match self.run_canary().await {
            Ok(output) => info!("Output of clusterapi-tester:\n{}", output),
            Err(e) => info!(error = %e, "Canary pod did not produce output"),
        }
    }

    /// Log events, pod statuses and node statuses
    #[instrument(skip(self))]
    pub async fn dump_namespace(&self, namespace: &str) {
        match self.cluster.list_events(namespace).await {
            Ok(mut events) => {
                events.sort_by_key(event_time);
                info!(count = events.len(), "Collecting events from namespace {}", namespace);
                for e in &events {
                    info!(
                        at = ?event_time(e),
                        kind = %e.involved_object.kind.as_deref().unwrap_or(""),
                        object = %e.involved_object.name.as_deref().unwrap_or(""),
                        reason = %e.reason.as_deref().unwrap_or(""),
                        type_ = %e.type_.as_deref().unwrap_or(""),
                        "{}",
                        e.message.as_deref().unwrap_or("")
                    );
                }
            }
            Err(e) => warn!(error = %e, "Failed to list events"),
        }

        match self.cluster.list_pods(namespace).await {
            Ok(pods) => {
                for pod in &pods {
                    info!(
                        pod = %pod.metadata.name.as_deref().unwrap_or("unknown"),
                        node = %pod.spec.as_ref().and_then(|s| s.node_name.as_deref()).unwrap_or(""),
                        phase = %pod_phase(pod),
                        ready = is_pod_running_ready(pod),
                        "Pod status"
                    );
                }
            }
            Err(e) => warn!(error = %e, "Failed to list pods"),
        }

        match self.cluster.list_nodes().await {
            Ok(nodes) => {
                for node in &nodes {
                    let conditions: Vec<String> = node
                        .status
                        .as_ref()
                        .and_then(|s| s.conditions.as_ref())
                        .map(|cs| cs.iter().map(|c| format!("{}={}", c.type_, c.status)).collect())
                        .unwrap_or_default();
                    info!(
                        node = %node.metadata.name.as_deref().unwrap_or("unknown"),
                        schedulable = is_node_schedulable(node),
                        conditions = ?conditions,
                        "Node status"
                    );
                }
            }
            Err(e) => warn!(error = %e, "Failed to list nodes"),
        }
    }

    /// Log the tail of every container that is not ready
    #[instrument(skip(self))]
    pub async fn log_failed_containers(&self, namespace: &str) {
        let pods = match self.cluster.list_pods(namespace).await {
            Ok(pods) => pods,
            Err(e) => {
                warn!(error = %e, "Failed to list pods");
                return;
            }
        };

        for pod in pods.iter().filter(|p| !is_pod_running_ready(p)) {
            let name = pod.metadata.name.as_deref().unwrap_or("unknown");
            let statuses = pod
                .status
                .as_ref()
                .and_then(|s| s.container_statuses.as_ref())
                .cloned()
                .unwrap_or_default();

            for status in statuses.iter().filter(|c| !c.ready) {
                match self.cluster.pod_logs(namespace, name, &status.name).await {
                    Ok(logs) => info!(
                        pod = %name,
                        container = %status.name,
                        restarts = status.restart_count,
                        "Logs of failed container:\n{}",
                        tail(&logs, FAILED_CONTAINER_LOG_LINES)
                    ),
                    Err(e) => warn!(pod = %name, container = %status.name, error = %e, "Failed to fetch logs"),
                }
            }
        }
    }

    /// Start a pod that contacts the API server, wait for it to become ready,
    /// return its output and delete it.
    #[instrument(skip(self))]
    pub async fn run_canary(&self) -> BootstrapResult<String> {
        let pod = canary_pod(self.run_id)?;
        let name = pod.metadata.name.clone().unwrap_or_default();
        let container = pod
            .spec
            .as_ref()
            .and_then(|s| s.containers.first())
            .map(|c| c.name.clone())
            .ok_or_else(|| BootstrapError::config("canary manifest has no container"))?;

        self.cluster.create_pod(CANARY_NAMESPACE, &pod).await?;

        let outcome = self.await_canary(&name, &container).await;

        if let Err(e) = self.cluster.delete_pod(CANARY_NAMESPACE, &name).await {
            warn!(pod = %name, error = %e, "Failed to delete canary pod");
        }

        outcome
    }

    async fn await_canary(&self, name: &str, container: &str) -> BootstrapResult<String> {
        let cluster = &self.cluster;
        poll_immediate(
            "canary pod running and ready",
            self.poll_interval,
            self.canary_timeout,
            move || async move {
                cluster
                    .get_pod(CANARY_NAMESPACE, name)
                    .await
                    .map(|pod| is_pod_running_ready(&pod))
            },
        )
        .await?;

        self.cluster.pod_logs(CANARY_NAMESPACE, name, container).await
    }
}
