//! Readiness predicates over raw Kubernetes objects

use k8s_openapi::api::apps::v1::DaemonSet;
use k8s_openapi::api::core::v1::{Node, Pod};

fn node_condition<'a>(node: &'a Node, type_: &str) -> Option<&'a str> {
    node.status
        .as_ref()
        .and_then(|s| s.conditions.as_ref())
        .and_then(|conds| conds.iter().find(|c| c.type_ == type_))
        .map(|c| c.status.as_str())
}

/// A node accepts new workloads: not cordoned, `Ready=True`, and the network
/// is not reported unavailable.
pub fn is_node_schedulable(node: &Node) -> bool {
    let cordoned = node
        .spec
        .as_ref()
        .and_then(|s| s.unschedulable)
        .unwrap_or(false);
    let ready = node_condition(node, "Ready") == Some("True");
    let network_ready = matches!(node_condition(node, "NetworkUnavailable"), None | Some("False"));

    !cordoned && ready && network_ready
}

/// No taint that would repel ordinary pods
pub fn is_node_untainted(node: &Node) -> bool {
    node.spec
        .as_ref()
        .and_then(|s| s.taints.as_ref())
        .map(|taints| {
            taints
                .iter()
                .all(|t| t.effect != "NoSchedule" && t.effect != "NoExecute")
        })
        .unwrap_or(true)
}

pub fn pod_phase(pod: &Pod) -> &str {
    pod.status
        .as_ref()
        .and_then(|s| s.phase.as_deref())
        .unwrap_or("Unknown")
}

/// Phase `Running` and the `Ready` condition is `True`
pub fn is_pod_running_ready(pod: &Pod) -> bool {
    if pod_phase(pod) != "Running" {
        return false;
    }

    pod.status
        .as_ref()
        .and_then(|s| s.conditions.as_ref())
        .map(|conds| conds.iter().any(|c| c.type_ == "Ready" && c.status == "True"))
        .unwrap_or(false)
}

/// Desired-vs-ready shortfall of a single daemonset
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaemonSetGap {
    pub name: String,
    pub desired: i32,
    pub ready: i32,
}

impl DaemonSetGap {
    pub fn of(ds: &DaemonSet) -> Self {
        let (desired, ready) = ds
            .status
            .as_ref()
            .map(|s| (s.desired_number_scheduled, s.number_ready))
            .unwrap_or((0, 0));

        Self {
            name: ds.metadata.name.clone().unwrap_or_default(),
            desired,
            ready,
        }
    }

    pub fn gap(&self) -> i64 {
        i64::from(self.desired) - i64::from(self.ready)
    }

    pub fn exceeds(&self, allowed_not_ready: u32) -> bool {
        self.gap() > i64::from(allowed_not_ready)
    }
}
