//! Health check endpoint

use std::sync::Arc;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;

use super::ApiState;

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub users: usize,
    pub pending_payments: usize,
    /// Paid tokens that granted no credits
    pub quarantined_payments: usize,
}

/// Liveness probe with ledger counters
async fn health(State(state): State<Arc<ApiState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        users: state.ledger.len(),
        pending_payments: state.contexts.pending_count(),
        quarantined_payments: state.contexts.quarantined_count(),
    })
}

/// Build health router
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new().route("/health", get(health)).with_state(state)
}
