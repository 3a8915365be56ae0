use axum::{extract::State, Json};
use chrono::Utc;
use shared::HealthResponse;

use crate::state::AppState;

pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        timestamp: Utc::now(),
        backend: state.store.backend_name().to_string(),
    })
}
