//! Liveness endpoint

use axum::{extract::State, Json};
use serde::Serialize;

use crate::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    /// A CRM session is held and not yet due for refresh
    pub session_active: bool,
    /// Requests without credentials fall back to configured ones
    pub default_credentials: bool,
}

/// `GET /health`; never triggers a CRM login
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let sessions = state.sync.sessions();
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        session_active: sessions.is_active(),
        default_credentials: sessions.defaults().is_configured(),
    })
}
