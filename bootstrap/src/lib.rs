//! Cluster readiness bootstrap for parallel Kubernetes e2e suites
//!
//! One executor prepares the cluster (namespace cleanup, node, pod and
//! daemonset readiness, optional chaos), the rest wait for its result, and
//! every executor then resolves its own per-process context.

pub mod chaos;
pub mod cluster;
pub mod config;
pub mod coordinator;
pub mod diagnostics;
pub mod error;
pub mod gates;
pub mod setup;
pub mod wait;

use axum::{routing::get, Router};
use tower_http::trace::TraceLayer;

use crate::coordinator::server::{self, RendezvousState};
use crate::coordinator::STATE_PATH;

/// Create the rendezvous server router with the given state
pub fn create_router(state: RendezvousState) -> Router {
    Router::new()
        .route("/health", get(server::health_check))
        .route(
            STATE_PATH,
            get(server::get_state).post(server::publish_state),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
