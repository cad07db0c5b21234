use crate::types::JobStatus;
use crate::AppState;
use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    provider: String,
    job_status: JobStatus,
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        provider: state.provider.name().to_string(),
        job_status: state.controller.get_progress().status,
    })
}

pub fn router() -> Router<AppState> {
    Router::new().route("/api/health", get(health))
}
