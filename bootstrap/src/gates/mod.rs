//! Readiness gates run by the leader before any test starts
//!
//! Each gate blocks on a [`crate::wait::poll_immediate`] loop and is
//! cancelled only by its own timeout.

mod daemonsets;
mod ip_family;
mod namespaces;
mod nodes;
mod pods;

pub use daemonsets::{lagging_daemonsets, DaemonSetReadiness, DaemonSetReadinessGate};
pub use ip_family::{ClusterIpFamily, ClusterIpFamilyResolver};
pub use namespaces::{NamespaceReconciler, PROTECTED_NAMESPACES};
pub use nodes::NodeReadinessGate;
pub use pods::{PodReadiness, PodReadinessGate};
