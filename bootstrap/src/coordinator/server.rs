//! HTTP handlers for the rendezvous server

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::rendezvous::{InProcessRendezvous, Rendezvous};
use super::state::BeforeSuiteState;

/// Shared server state
#[derive(Clone, Default)]
pub struct RendezvousState {
    pub rendezvous: InProcessRendezvous,
}

impl RendezvousState {
    pub fn new() -> Self {
        Self::default()
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Error body returned on rejected requests
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
}

pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

pub async fn get_state(State(state): State<RendezvousState>) -> impl IntoResponse {
    match state.rendezvous.fetch().await {
        Ok(current) => (StatusCode::OK, Json(current)).into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse {
                code: "INTERNAL_ERROR".to_string(),
                message: e.to_string(),
            }),
        )
            .into_response(),
    }
}

pub async fn publish_state(
    State(state): State<RendezvousState>,
    Json(published): Json<BeforeSuiteState>,
) -> impl IntoResponse {
    if published.is_pending() {
        return (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                code: "BAD_REQUEST".to_string(),
                message: "cannot publish a pending state".to_string(),
            }),
        )
            .into_response();
    }

    match state.rendezvous.publish(published.clone()).await {
        Ok(()) => {
            info!(state = ?published, "Before-suite state published");
            (StatusCode::CREATED, Json(published)).into_response()
        }
        Err(e) => {
            warn!(error = %e, "Rejected second publish");
            (
                StatusCode::CONFLICT,
                Json(ErrorResponse {
                    code: "CONFLICT".to_string(),
                    message: e.to_string(),
                }),
            )
                .into_response()
        }
    }
}
